//! Pipe sizing and construction-cost estimation.
//!
//! Two strategies are exposed, both returning a [`SizingResult`]:
//!
//! - [`aggregate_sizing`] accumulates demand along repeated
//!   consumer-to-source shortest paths and sizes each pipe at the unit-speed
//!   reference diameter. Cost-accurate, but may be hydraulically infeasible
//!   in low-demand long-pipe regimes.
//! - [`speed_band_sizing`] walks the network leaves-first and picks the
//!   largest diameter that keeps flow speed above a minimum while the next
//!   tier would stay under the maximum. Guarantees a feasible speed envelope
//!   at some cost overshoot, and is the strategy paired with the hydraulic
//!   probe.
//!
//! The speed-band sizer also runs in a resizing mode where pipes that already
//! carry a diameter keep it and cost nothing; only newly added pipes are
//! priced. The resilience augmenter uses that mode.

use crate::precompute::{edge_key, path_edge_keys, EdgeKey, PrecomputedBundle};
use hashbrown::{HashMap, HashSet};
use petgraph::graph::NodeIndex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use wdp_core::catalog::{
    self, min_pipe_unit_cost, pipe_tier_at_least, tank_tier_for, valve_tier_at_least, PipeTier,
};
use wdp_core::units::CubicMetersPerDay;
use wdp_core::{Euros, Material, Network, Pipe, WdpError, WdpResult};

/// Sizing attributes assigned to one pipe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeSizing {
    /// Design flow magnitude (m³/day)
    pub flow: f64,
    /// Selected catalogue diameter (mm)
    pub diameter: f64,
    /// Isolation valve diameter (mm), when one was placed on this pipe
    pub valve: Option<f64>,
    /// False when the pipe kept a preset diameter in resizing mode
    pub new_pipe: bool,
}

/// Construction cost split by component.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostBreakdown {
    pub pipes: f64,
    pub valves: f64,
    pub tank: f64,
}

impl CostBreakdown {
    pub fn total(&self) -> Euros {
        Euros(self.pipes + self.valves + self.tank)
    }
}

/// Outcome of a sizing pass over a candidate topology.
#[derive(Debug, Clone)]
pub struct SizingResult {
    /// Per-edge sizing, keyed by canonical node-index pairs
    pub edges: HashMap<EdgeKey, EdgeSizing>,
    pub cost: CostBreakdown,
    /// Selected tank capacity (m³)
    pub tank_capacity: f64,
    /// Tank footprint radius (m), consumed by hydraulic probes
    pub tank_radius: f64,
    /// True when total demand exceeded the largest tank tier
    pub tank_exceeded: bool,
}

impl SizingResult {
    pub fn total_cost(&self) -> Euros {
        self.cost.total()
    }
}

/// Lightweight adjacency view over a candidate edge set.
///
/// Neighbor lists are sorted by (edge length, node index) so every traversal
/// below is deterministic.
pub(crate) struct Subnetwork {
    adj: HashMap<usize, Vec<NodeIndex>>,
    edges: Vec<EdgeKey>,
}

impl Subnetwork {
    pub(crate) fn from_edges<I>(bundle: &PrecomputedBundle, edges: I) -> Self
    where
        I: IntoIterator<Item = EdgeKey>,
    {
        let mut edge_list: Vec<EdgeKey> = edges.into_iter().collect();
        edge_list.sort_unstable();
        edge_list.dedup();

        let mut adj: HashMap<usize, Vec<NodeIndex>> = HashMap::new();
        for &(a, b) in &edge_list {
            adj.entry(a).or_default().push(NodeIndex::new(b));
            adj.entry(b).or_default().push(NodeIndex::new(a));
        }
        for (&node, neighbors) in adj.iter_mut() {
            neighbors.sort_by(|&x, &y| {
                let lx = bundle.edge_length(NodeIndex::new(node), x);
                let ly = bundle.edge_length(NodeIndex::new(node), y);
                lx.partial_cmp(&ly)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| x.index().cmp(&y.index()))
            });
        }

        Self {
            adj,
            edges: edge_list,
        }
    }

    fn neighbors(&self, node: NodeIndex) -> &[NodeIndex] {
        self.adj
            .get(&node.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn nodes_sorted(&self) -> Vec<usize> {
        let mut nodes: Vec<usize> = self.adj.keys().copied().collect();
        nodes.sort_unstable();
        nodes
    }

    /// Dijkstra within the subnetwork, skipping `removed` edges.
    pub(crate) fn shortest_path(
        &self,
        bundle: &PrecomputedBundle,
        from: NodeIndex,
        to: NodeIndex,
        removed: &HashSet<EdgeKey>,
    ) -> Option<Vec<NodeIndex>> {
        #[derive(PartialEq)]
        struct Entry {
            dist: f64,
            node: NodeIndex,
        }
        impl Eq for Entry {}
        impl Ord for Entry {
            fn cmp(&self, other: &Self) -> Ordering {
                other
                    .dist
                    .partial_cmp(&self.dist)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| other.node.index().cmp(&self.node.index()))
            }
        }
        impl PartialOrd for Entry {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        let mut dist: HashMap<usize, f64> = HashMap::new();
        let mut parent: HashMap<usize, NodeIndex> = HashMap::new();
        let mut heap = BinaryHeap::new();
        dist.insert(from.index(), 0.0);
        heap.push(Entry {
            dist: 0.0,
            node: from,
        });

        while let Some(Entry { dist: d, node }) = heap.pop() {
            if d > dist.get(&node.index()).copied().unwrap_or(f64::INFINITY) {
                continue;
            }
            if node == to {
                let mut path = vec![to];
                let mut cursor = to;
                while let Some(&prev) = parent.get(&cursor.index()) {
                    path.push(prev);
                    cursor = prev;
                }
                path.reverse();
                return Some(path);
            }
            for &next in self.neighbors(node) {
                if removed.contains(&edge_key(node, next)) {
                    continue;
                }
                let candidate = d + bundle.edge_length(node, next);
                if candidate < dist.get(&next.index()).copied().unwrap_or(f64::INFINITY) {
                    dist.insert(next.index(), candidate);
                    parent.insert(next.index(), node);
                    heap.push(Entry {
                        dist: candidate,
                        node: next,
                    });
                }
            }
        }
        None
    }
}

/// Strategy A: flow aggregation along repeated consumer-to-source paths.
///
/// For each consumer, shortest paths toward the source are accumulated and
/// their edges retired until no path remains; pipes untouched by any path are
/// interpolated from the strongest adjacent flow. The interpolation is
/// bounded: a full pass with no progress rejects the candidate with
/// `SizingInfeasible`.
pub fn aggregate_sizing(
    bundle: &PrecomputedBundle,
    edges: impl IntoIterator<Item = EdgeKey>,
    source: NodeIndex,
    consumers: &[NodeIndex],
    total_demand: CubicMetersPerDay,
) -> WdpResult<SizingResult> {
    let sub = Subnetwork::from_edges(bundle, edges);
    let mut flows: HashMap<EdgeKey, f64> = HashMap::new();

    let mut consumers_sorted = consumers.to_vec();
    consumers_sorted.sort_by_key(|n| n.index());

    for &consumer in &consumers_sorted {
        let demand = bundle.demand(consumer);
        if demand <= 0.0 || consumer == source {
            continue;
        }
        let mut removed: HashSet<EdgeKey> = HashSet::new();
        while let Some(path) = sub.shortest_path(bundle, consumer, source, &removed) {
            for key in path_edge_keys(&path) {
                *flows.entry(key).or_insert(0.0) += demand;
                removed.insert(key);
            }
        }
    }

    interpolate_missing_flows(&sub, &mut flows)?;

    let mut sizing = HashMap::with_capacity(sub.edges.len());
    let mut cost = CostBreakdown::default();
    for &key in &sub.edges {
        let flow = flows[&key];
        let tier = catalog::pipe_tier_for_flow(CubicMetersPerDay(flow)).ok_or_else(|| {
            WdpError::SizingInfeasible(format!(
                "flow {flow:.1} m3/day exceeds the largest catalogue diameter"
            ))
        })?;
        cost.pipes += tier.unit_cost * bundle.edge_length(NodeIndex::new(key.0), NodeIndex::new(key.1));
        sizing.insert(
            key,
            EdgeSizing {
                flow,
                diameter: tier.diameter,
                valve: None,
                new_pipe: true,
            },
        );
    }

    // One valve per junction of more than two pipes, sized to the thickest
    // incident bore. Cost only; valve placement on specific pipes is the
    // speed-band sizer's concern.
    for node in sub.nodes_sorted() {
        let neighbors = sub.neighbors(NodeIndex::new(node));
        if neighbors.len() > 2 {
            let max_diam = neighbors
                .iter()
                .map(|&nb| sizing[&edge_key(NodeIndex::new(node), nb)].diameter)
                .fold(0.0, f64::max);
            let valve = valve_tier_at_least(max_diam).ok_or_else(|| {
                WdpError::SizingInfeasible(format!(
                    "no valve tier covers diameter {max_diam:.0} mm"
                ))
            })?;
            cost.valves += valve.cost;
        }
    }

    let (tank, tank_exceeded) = tank_tier_for(total_demand);
    cost.tank = tank.cost;

    Ok(SizingResult {
        edges: sizing,
        cost,
        tank_capacity: tank.capacity,
        tank_radius: tank.radius,
        tank_exceeded,
    })
}

fn interpolate_missing_flows(
    sub: &Subnetwork,
    flows: &mut HashMap<EdgeKey, f64>,
) -> WdpResult<()> {
    // Bounded by |E| passes; each missing edge takes the strongest flow among
    // edges sharing one of its endpoints.
    for _ in 0..sub.edges.len().max(1) {
        let mut unset = 0usize;
        let mut assigned = 0usize;
        for &(a, b) in &sub.edges {
            if flows.contains_key(&(a, b)) {
                continue;
            }
            let mut best: Option<f64> = None;
            for &(end, other) in [(a, b), (b, a)].iter() {
                for &nb in sub.neighbors(NodeIndex::new(end)) {
                    if nb.index() == other {
                        continue;
                    }
                    if let Some(&f) = flows.get(&edge_key(NodeIndex::new(end), nb)) {
                        best = Some(best.map_or(f, |m: f64| m.max(f)));
                    }
                }
            }
            match best {
                Some(f) => {
                    flows.insert((a, b), f);
                    assigned += 1;
                }
                None => unset += 1,
            }
        }
        if unset == 0 {
            return Ok(());
        }
        if assigned == 0 {
            return Err(WdpError::SizingInfeasible(format!(
                "{unset} pipes never received a flow assignment"
            )));
        }
    }
    Err(WdpError::SizingInfeasible(
        "flow interpolation did not converge".into(),
    ))
}

/// Flow speed (m/s) through a pipe of nominal diameter `diameter_mm`.
pub fn flow_speed(flow: CubicMetersPerDay, diameter_mm: f64) -> f64 {
    let d = diameter_mm / 1000.0;
    4.0 * flow.value().abs() / CubicMetersPerDay::SECONDS_PER_DAY / (std::f64::consts::PI * d * d)
}

/// Largest catalogue diameter whose speed stays above `speed_min`, provided
/// the next smaller tier would stay under `speed_max`; the first tier whose
/// speed drops to `speed_min` otherwise. Running off the catalogue end means
/// no diameter can slow the flow into band.
fn speed_band_tier(
    flow: CubicMetersPerDay,
    speed_min: f64,
    speed_max: f64,
) -> WdpResult<&'static PipeTier> {
    let mut prev_speed = f64::INFINITY;
    for (i, tier) in catalog::PIPE_TIERS.iter().enumerate() {
        let speed = flow_speed(flow, tier.diameter);
        if speed <= speed_min {
            return Ok(if prev_speed <= speed_max && i > 0 {
                &catalog::PIPE_TIERS[i - 1]
            } else {
                tier
            });
        }
        prev_speed = speed;
    }
    Err(WdpError::HydraulicInfeasible(format!(
        "flow {:.1} m3/day stays above {speed_min} m/s in every catalogue tier",
        flow.value()
    )))
}

/// Strategy B: BFS-distance speed-constrained sizing.
///
/// Nodes are processed leaves-first (decreasing cumulative BFS distance from
/// the source). Each node splits its demand plus accumulated inflow evenly
/// across its closer-to-root neighbors; isolation valves are placed on
/// downstream pipes of nodes with more than one of them.
///
/// `presets` maps already-built pipes to their fixed diameter: those keep it,
/// cost nothing, and the tank is not billed again (resizing mode, used when
/// augmenting an existing network).
pub fn speed_band_sizing(
    bundle: &PrecomputedBundle,
    edges: impl IntoIterator<Item = EdgeKey>,
    source: NodeIndex,
    total_demand: CubicMetersPerDay,
    speed_min: f64,
    speed_max: f64,
    presets: Option<&HashMap<EdgeKey, f64>>,
) -> WdpResult<SizingResult> {
    let sub = Subnetwork::from_edges(bundle, edges);

    // BFS ordering by cumulative distance, farthest first. The sort is
    // stable, so equal distances keep their BFS discovery order.
    let mut order: Vec<(NodeIndex, f64)> = Vec::new();
    {
        let mut seen: HashSet<usize> = HashSet::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back((source, 0.0));
        while let Some((node, distance)) = queue.pop_front() {
            if !seen.insert(node.index()) {
                continue;
            }
            order.push((node, distance));
            for &nb in sub.neighbors(node) {
                if !seen.contains(&nb.index()) {
                    queue.push_back((nb, distance + bundle.edge_length(node, nb)));
                }
            }
        }
    }
    order.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let mut visited: HashSet<usize> = HashSet::new();
    let mut inflow: HashMap<usize, f64> = HashMap::new();
    let mut sizing: HashMap<EdgeKey, EdgeSizing> = HashMap::new();
    let mut cost = CostBreakdown::default();

    for &(node, _) in &order {
        visited.insert(node.index());
        let neighbors = sub.neighbors(node);
        let downstream: Vec<NodeIndex> = neighbors
            .iter()
            .copied()
            .filter(|nb| visited.contains(&nb.index()))
            .collect();
        let upstream_count = neighbors.len() - downstream.len();

        for &nb in neighbors {
            if !visited.contains(&nb.index()) {
                let flow =
                    (bundle.demand(node) + inflow.get(&node.index()).copied().unwrap_or(0.0))
                        / upstream_count as f64;
                *inflow.entry(nb.index()).or_insert(0.0) += flow;

                let key = edge_key(node, nb);
                match presets.and_then(|p| p.get(&key)) {
                    Some(&diameter) => {
                        sizing.insert(
                            key,
                            EdgeSizing {
                                flow,
                                diameter,
                                valve: None,
                                new_pipe: false,
                            },
                        );
                    }
                    None => {
                        let tier = speed_band_tier(CubicMetersPerDay(flow), speed_min, speed_max)?;
                        cost.pipes += tier.unit_cost * bundle.edge_length(node, nb);
                        sizing.insert(
                            key,
                            EdgeSizing {
                                flow,
                                diameter: tier.diameter,
                                valve: None,
                                new_pipe: true,
                            },
                        );
                    }
                }
            } else if downstream.len() > 1 {
                // More than one downstream branch: each gets an isolation
                // valve sized to its own pipe.
                let key = edge_key(node, nb);
                if let Some(edge) = sizing.get_mut(&key) {
                    if edge.valve.is_none() {
                        let valve = valve_tier_at_least(edge.diameter).ok_or_else(|| {
                            WdpError::HydraulicInfeasible(format!(
                                "no valve tier covers diameter {:.0} mm",
                                edge.diameter
                            ))
                        })?;
                        cost.valves += valve.cost;
                        edge.valve = Some(valve.diameter);
                    }
                }
            }
        }
    }

    let (tank, tank_exceeded) = tank_tier_for(total_demand);
    if presets.is_none() {
        cost.tank = tank.cost;
    }

    Ok(SizingResult {
        edges: sizing,
        cost,
        tank_capacity: tank.capacity,
        tank_radius: tank.radius,
        tank_exceeded,
    })
}

/// Lower bound on the cost of attaching a path of the given length: the
/// cheapest pipe tier over the whole run. Used to prune candidates that
/// cannot fit the remaining budget.
pub fn minimum_path_cost(length_m: f64) -> Euros {
    min_pipe_unit_cost() * length_m
}

/// Materialize a sized candidate into a network.
///
/// Junctions incident to the sized edges are cloned from the street graph;
/// pipes carry the assigned flow, diameter, optional valve, catalogue wall
/// thickness, zero age and PE100 material.
pub fn apply_sizing(street: &Network, sizing: &SizingResult) -> Network {
    let mut nodes: Vec<usize> = sizing
        .edges
        .keys()
        .flat_map(|&(a, b)| [a, b])
        .collect();
    nodes.sort_unstable();
    nodes.dedup();
    // Keep junction insertion in node-id order for deterministic indices.
    nodes.sort_by_key(|&n| street.graph[NodeIndex::new(n)].id);

    let mut network = Network::new();
    let mut index_map: HashMap<usize, NodeIndex> = HashMap::new();
    for &n in &nodes {
        let idx = network.add_junction(street.graph[NodeIndex::new(n)].clone());
        index_map.insert(n, idx);
    }

    let mut keys: Vec<&EdgeKey> = sizing.edges.keys().collect();
    keys.sort_unstable();
    for &&(a, b) in &keys {
        let edge = &sizing.edges[&(a, b)];
        let street_edge = street
            .pipe_between(NodeIndex::new(a), NodeIndex::new(b))
            .expect("sized edge exists in street graph");
        let template = &street.graph[street_edge];
        let diameter = wdp_core::Millimeters(edge.diameter);
        let pipe = Pipe {
            id: template.id,
            length: template.length,
            diameter,
            age_years: 0.0,
            material: Material::Pe100,
            wall_thickness: catalog::wall_thickness_for(diameter),
            flow: Some(CubicMetersPerDay(edge.flow)),
            valve: edge.valve.map(wdp_core::Millimeters),
        };
        network
            .graph
            .add_edge(index_map[&a], index_map[&b], pipe);
    }
    network
}

/// Smallest catalogue diameter able to carry `flow` at the reference speed.
/// Convenience re-export used by reports and tests.
pub fn reference_diameter(flow: CubicMetersPerDay) -> Option<f64> {
    catalog::pipe_tier_for_flow(flow).map(|t| t.diameter)
}

/// Diameter ceiling lookup against the pipe catalogue.
pub fn diameter_at_least(required_mm: f64) -> Option<f64> {
    pipe_tier_at_least(required_mm).map(|t| t.diameter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{line_street, star_street, triangle_street};
    use wdp_core::NodeId;

    fn all_edge_keys(network: &Network) -> Vec<EdgeKey> {
        network
            .graph
            .edge_indices()
            .map(|e| {
                let (a, b) = network.graph.edge_endpoints(e).unwrap();
                edge_key(a, b)
            })
            .collect()
    }

    #[test]
    fn test_aggregate_sizing_on_line() {
        let network = line_street(&[100.0, 100.0, 100.0], &[0.0, 10.0, 10.0, 10.0]);
        let bundle = PrecomputedBundle::compute(&network).unwrap();
        let source = network.node_index(NodeId::new(0)).unwrap();
        let consumers: Vec<NodeIndex> = [1, 2, 3]
            .iter()
            .map(|&i| network.node_index(NodeId::new(i)).unwrap())
            .collect();

        let result = aggregate_sizing(
            &bundle,
            all_edge_keys(&network),
            source,
            &consumers,
            CubicMetersPerDay(30.0),
        )
        .unwrap();

        // Demand accumulates toward the plant: 30 / 20 / 10 m3/day.
        let k01 = edge_key(source, consumers[0]);
        assert_eq!(result.edges[&k01].flow, 30.0);
        assert_eq!(result.edges[&edge_key(consumers[0], consumers[1])].flow, 20.0);
        assert_eq!(result.edges[&edge_key(consumers[1], consumers[2])].flow, 10.0);

        // Tiny flows land on the smallest tier at 71.91 EUR/m.
        assert!((result.cost.pipes - 300.0 * 71.91).abs() < 1e-6);
        assert_eq!(result.cost.valves, 0.0);
        assert_eq!(result.tank_capacity, 400.0);
        assert!(!result.tank_exceeded);
    }

    #[test]
    fn test_aggregate_sizing_cycle_second_paths() {
        let network = triangle_street(&[100.0, 100.0, 100.0], &[0.0, 5.0, 5.0]);
        let bundle = PrecomputedBundle::compute(&network).unwrap();
        let source = network.node_index(NodeId::new(0)).unwrap();
        let n1 = network.node_index(NodeId::new(1)).unwrap();
        let n2 = network.node_index(NodeId::new(2)).unwrap();

        let result = aggregate_sizing(
            &bundle,
            all_edge_keys(&network),
            source,
            &[n1, n2],
            CubicMetersPerDay(10.0),
        )
        .unwrap();

        // Each consumer routes once directly and once around the triangle,
        // so every edge carries both demands.
        for sizing in result.edges.values() {
            assert_eq!(sizing.flow, 10.0);
        }
    }

    #[test]
    fn test_aggregate_sizing_valve_at_junction() {
        let network = star_street(&[100.0, 100.0, 100.0], &[0.0, 10.0, 10.0, 10.0]);
        let bundle = PrecomputedBundle::compute(&network).unwrap();
        let source = network.node_index(NodeId::new(0)).unwrap();
        let consumers: Vec<NodeIndex> = [1, 2, 3]
            .iter()
            .map(|&i| network.node_index(NodeId::new(i)).unwrap())
            .collect();

        let result = aggregate_sizing(
            &bundle,
            all_edge_keys(&network),
            source,
            &consumers,
            CubicMetersPerDay(30.0),
        )
        .unwrap();

        // The hub has three incident pipes of 32 mm; one 40 mm valve.
        assert!((result.cost.valves - 89.29).abs() < 1e-9);
    }

    #[test]
    fn test_speed_band_tier_selection() {
        // 30 m3/day is slow even in the smallest bore: take the 32 mm tier.
        let tier = speed_band_tier(CubicMetersPerDay(30.0), 0.6, 1.0).unwrap();
        assert_eq!(tier.diameter, 32.0);

        // 400 m3/day: 90 mm runs at ~0.73 m/s, 110 mm drops under 0.6.
        let tier = speed_band_tier(CubicMetersPerDay(400.0), 0.6, 1.0).unwrap();
        assert_eq!(tier.diameter, 90.0);

        // Absurd flow stays too fast in every tier.
        assert!(matches!(
            speed_band_tier(CubicMetersPerDay(1.0e9), 0.6, 1.0),
            Err(WdpError::HydraulicInfeasible(_))
        ));
    }

    #[test]
    fn test_speed_band_sizing_star_valves() {
        let network = star_street(&[100.0, 100.0, 100.0], &[0.0, 10.0, 10.0, 10.0]);
        let bundle = PrecomputedBundle::compute(&network).unwrap();
        let source = network.node_index(NodeId::new(0)).unwrap();

        let result = speed_band_sizing(
            &bundle,
            all_edge_keys(&network),
            source,
            CubicMetersPerDay(30.0),
            0.6,
            1.0,
            None,
        )
        .unwrap();

        // The hub sees three downstream branches; each pipe carries a valve.
        let valves = result.edges.values().filter(|e| e.valve.is_some()).count();
        assert_eq!(valves, 3);
        assert!(result.cost.valves > 0.0);
        assert_eq!(result.tank_capacity, 400.0);
    }

    #[test]
    fn test_speed_band_resizing_keeps_presets() {
        let network = line_street(&[100.0, 100.0], &[0.0, 10.0, 10.0]);
        let bundle = PrecomputedBundle::compute(&network).unwrap();
        let source = network.node_index(NodeId::new(0)).unwrap();
        let n1 = network.node_index(NodeId::new(1)).unwrap();
        let n2 = network.node_index(NodeId::new(2)).unwrap();

        let mut presets = HashMap::new();
        presets.insert(edge_key(source, n1), 125.0);

        let result = speed_band_sizing(
            &bundle,
            all_edge_keys(&network),
            source,
            CubicMetersPerDay(20.0),
            0.6,
            1.0,
            Some(&presets),
        )
        .unwrap();

        let preset_edge = &result.edges[&edge_key(source, n1)];
        assert_eq!(preset_edge.diameter, 125.0);
        assert!(!preset_edge.new_pipe);

        let new_edge = &result.edges[&edge_key(n1, n2)];
        assert!(new_edge.new_pipe);
        // Resizing mode bills only the new pipe, no tank.
        assert!((result.cost.pipes - 100.0 * 71.91).abs() < 1e-6);
        assert_eq!(result.cost.tank, 0.0);
    }

    #[test]
    fn test_apply_sizing_materializes_pipes() {
        let network = line_street(&[100.0, 100.0, 100.0], &[0.0, 10.0, 10.0, 10.0]);
        let bundle = PrecomputedBundle::compute(&network).unwrap();
        let source = network.node_index(NodeId::new(0)).unwrap();
        let consumers: Vec<NodeIndex> = [1, 2, 3]
            .iter()
            .map(|&i| network.node_index(NodeId::new(i)).unwrap())
            .collect();

        let result = aggregate_sizing(
            &bundle,
            all_edge_keys(&network),
            source,
            &consumers,
            CubicMetersPerDay(30.0),
        )
        .unwrap();
        let sized = apply_sizing(&network, &result);

        assert_eq!(sized.graph.node_count(), 4);
        assert_eq!(sized.graph.edge_count(), 3);
        for pipe in sized.graph.edge_weights() {
            assert_eq!(pipe.material, Material::Pe100);
            assert_eq!(pipe.age_years, 0.0);
            assert_eq!(pipe.diameter.value(), 32.0);
            assert_eq!(pipe.wall_thickness.value(), 2.0);
            assert!(pipe.flow.is_some());
        }
    }

    #[test]
    fn test_reference_diameter_scenarios() {
        // 100 m3/day needs ~39 mm, ceiling 63; a 300 mm requirement ceils to 315.
        assert_eq!(reference_diameter(CubicMetersPerDay(100.0)), Some(63.0));
        assert_eq!(diameter_at_least(300.0), Some(315.0));
    }
}
