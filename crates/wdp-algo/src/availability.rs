//! Monte-Carlo availability of a sized network under random pipe failures.
//!
//! Edge condition attributes are normalized to {0, 0.33, 0.67, 1.0} buckets,
//! combined into a per-pipe failure probability (two weightings are
//! supported), and propagated through isolation-valve segments: a failing
//! pipe takes down every pipe reachable along the flow direction until a
//! valved pipe bounds the walk. Reachability from the source is then sampled
//! over many independent repetitions.
//!
//! Every repetition derives its own seeded RNG, so results are bit-identical
//! for a given seed no matter how many worker threads run the sampling.

use crate::probe::HydraulicReport;
use hashbrown::{HashMap, HashSet};
use petgraph::graph::{EdgeIndex, NodeIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;
use wdp_core::{Network, Pipe, WdpError, WdpResult};

#[cfg(feature = "desktop")]
use rayon::prelude::*;

/// Which per-pipe failure weighting to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityModel {
    /// First-generation weighting: a flat rate split into pipe-dependent and
    /// pipe-independent shares.
    Legacy,
    /// Length-aware weighting derived from an annual failures-per-km
    /// baseline.
    #[default]
    Current,
}

/// Configuration of one Monte-Carlo evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityConfig {
    pub repetitions: usize,
    pub seed: u64,
    #[serde(default)]
    pub model: AvailabilityModel,
    /// Legacy model: overall failure incidence in percent per year.
    /// Current model: baseline failures per km per year.
    pub failure_rate: f64,
}

/// Availability statistics over the check set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityReport {
    /// Mean node availability over the check set
    pub node_avg_availability: f64,
    /// Worst node availability over the check set
    pub node_worst_availability: f64,
    /// Fraction of repetitions where every check node was reachable
    pub network_availability: f64,
    /// Mean unsupplied demand (m³/day) over repetitions with an outage
    pub mean_unsupplied_water: f64,
    /// Mean time between network failures (days)
    pub mtbf_days: f64,
    /// Annual failure frequency (1/MTBF)
    pub afy: f64,
    /// Yearly average unsupplied water (m³)
    pub yauw: f64,
    pub repetitions: usize,
}

/// Normalized condition scores of one pipe, each in {0, 0.33, 0.67, 1.0}.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedPipe {
    pub age: f64,
    pub diameter: f64,
    pub length: f64,
    pub wall_thickness: f64,
    pub material: f64,
}

fn bucket(value: f64, thresholds: [f64; 3]) -> f64 {
    if value > thresholds[0] {
        1.0
    } else if value > thresholds[1] {
        0.67
    } else if value > thresholds[2] {
        0.33
    } else {
        0.0
    }
}

/// Bucket a pipe's condition attributes against the fixed thresholds.
/// Wall thickness is inverted: thicker walls score safer.
pub fn normalize_pipe(pipe: &Pipe) -> NormalizedPipe {
    NormalizedPipe {
        age: bucket(pipe.age_years, [100.0, 67.0, 33.0]),
        diameter: bucket(pipe.diameter.value(), [560.0, 250.0, 90.0]),
        length: bucket(pipe.length.value(), [200.0, 100.0, 50.0]),
        wall_thickness: 1.0 - bucket(pipe.wall_thickness.value(), [33.2, 14.8, 3.8]),
        material: pipe.material.reliability_class(),
    }
}

struct Weights {
    age: f64,
    diameter: f64,
    length: f64,
    wall_thickness: f64,
    material: f64,
}

const LEGACY_WEIGHTS: Weights = Weights {
    age: 0.266,
    diameter: 0.308,
    length: 0.167,
    wall_thickness: 0.068,
    material: 0.191,
};

const CURRENT_WEIGHTS: Weights = Weights {
    age: 0.105,
    diameter: 0.122,
    length: 0.066,
    wall_thickness: 0.027,
    material: 0.076,
};

/// Pipe-independent share of the legacy weighting (the pipe-dependent share
/// is its complement). Also the baseline sum added by the current weighting.
const NON_PIPE_SHARE: f64 = 0.604;
const PIPE_SHARE: f64 = 0.396;
/// Baseline terms of the current weighting: 0.413 + 0.191.
const CURRENT_BASELINE: f64 = 0.413 + 0.191;

fn weighted_sum(weights: &Weights, norm: &NormalizedPipe) -> f64 {
    weights.age * norm.age
        + weights.diameter * norm.diameter
        + weights.length * norm.length
        + weights.wall_thickness * norm.wall_thickness
        + weights.material * norm.material
}

/// Probability that the pipe fails within the evaluation window.
pub fn failure_probability(
    model: AvailabilityModel,
    norm: &NormalizedPipe,
    length_m: f64,
    failure_rate: f64,
) -> f64 {
    match model {
        AvailabilityModel::Legacy => {
            let relative = weighted_sum(&LEGACY_WEIGHTS, norm);
            (failure_rate / 100.0) * (NON_PIPE_SHARE + PIPE_SHARE * relative)
        }
        AvailabilityModel::Current => {
            let q = failure_rate / 365.0;
            let worst_unavailability = 1.0 - (1.0 - q).powf(length_m / 1000.0);
            worst_unavailability * (weighted_sum(&CURRENT_WEIGHTS, norm) + CURRENT_BASELINE)
        }
    }
}

/// Pipe-failure propagation map.
///
/// The network is oriented by the probe's flow signs (edges without a
/// reported flow keep their stored orientation). A failing pipe's segment
/// collects every pipe reachable backward from its tail and forward from its
/// head; valved pipes bound the walk and are not collected. A valved pipe is
/// its own segment, and without probe data every pipe is.
pub fn isolation_segments(
    network: &Network,
    hydraulics: Option<&HydraulicReport>,
) -> HashMap<EdgeIndex, Vec<EdgeIndex>> {
    let mut segments = HashMap::new();

    let Some(report) = hydraulics else {
        for edge in network.graph.edge_indices() {
            segments.insert(edge, vec![edge]);
        }
        return segments;
    };

    // Flow-oriented adjacency: out[n] edges leave n, inc[n] edges enter n.
    let n = network.graph.node_count();
    let mut out: Vec<Vec<(NodeIndex, EdgeIndex)>> = vec![Vec::new(); n];
    let mut inc: Vec<Vec<(NodeIndex, EdgeIndex)>> = vec![Vec::new(); n];
    for edge in network.graph.edge_indices() {
        let (a, b) = network.graph.edge_endpoints(edge).expect("edge endpoints");
        let flow = report
            .link_flow(network.graph[a].id, network.graph[b].id)
            .unwrap_or(0.0);
        let (tail, head) = if flow >= 0.0 { (a, b) } else { (b, a) };
        out[tail.index()].push((head, edge));
        inc[head.index()].push((tail, edge));
    }

    for edge in network.graph.edge_indices() {
        if network.graph[edge].has_valve() {
            segments.insert(edge, vec![edge]);
            continue;
        }
        let (a, b) = network.graph.edge_endpoints(edge).expect("edge endpoints");
        let flow = report
            .link_flow(network.graph[a].id, network.graph[b].id)
            .unwrap_or(0.0);
        let (tail, head) = if flow >= 0.0 { (a, b) } else { (b, a) };

        let mut segment: Vec<EdgeIndex> = vec![edge];
        let mut seen: HashSet<EdgeIndex> = HashSet::new();
        seen.insert(edge);

        // Upstream sweep from the tail, downstream sweep from the head.
        let mut stack: Vec<(NodeIndex, bool)> = vec![(tail, true), (head, false)];
        while let Some((node, upstream)) = stack.pop() {
            let adjacent = if upstream {
                &inc[node.index()]
            } else {
                &out[node.index()]
            };
            for &(next, e) in adjacent {
                if !seen.insert(e) {
                    continue;
                }
                if network.graph[e].has_valve() {
                    continue;
                }
                segment.push(e);
                stack.push((next, upstream));
            }
        }
        segment.sort_unstable();
        segments.insert(edge, segment);
    }
    segments
}

struct Tally {
    reached: Vec<u64>,
    all_reached: u64,
    unsupplied_total: f64,
    outage_reps: u64,
}

impl Tally {
    fn new(check_count: usize) -> Self {
        Self {
            reached: vec![0; check_count],
            all_reached: 0,
            unsupplied_total: 0.0,
            outage_reps: 0,
        }
    }

    fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.reached.iter_mut().zip(other.reached) {
            *a += b;
        }
        self.all_reached += other.all_reached;
        self.unsupplied_total += other.unsupplied_total;
        self.outage_reps += other.outage_reps;
        self
    }
}

/// Monte-Carlo evaluation with condition-weighted failure probabilities and
/// valve-segment propagation.
pub fn evaluate(
    network: &Network,
    source: NodeIndex,
    check_nodes: &[NodeIndex],
    config: &AvailabilityConfig,
    hydraulics: Option<&HydraulicReport>,
) -> WdpResult<AvailabilityReport> {
    if check_nodes.is_empty() {
        return Err(WdpError::InvalidInput(
            "availability needs at least one check node".into(),
        ));
    }
    if config.repetitions == 0 {
        return Err(WdpError::InvalidInput(
            "availability needs at least one repetition".into(),
        ));
    }

    let edges: Vec<EdgeIndex> = network.graph.edge_indices().collect();
    let probabilities: Vec<f64> = edges
        .iter()
        .map(|&e| {
            let pipe = &network.graph[e];
            failure_probability(
                config.model,
                &normalize_pipe(pipe),
                pipe.length.value(),
                config.failure_rate,
            )
        })
        .collect();
    debug!(
        edges = edges.len(),
        max_p = probabilities.iter().cloned().fold(0.0, f64::max),
        "sampling pipe failures"
    );
    let segments = isolation_segments(network, hydraulics);

    run_sampling(
        network,
        source,
        check_nodes,
        config,
        &edges,
        &probabilities,
        Some(&segments),
        false,
    )
}

/// Uniform-probability evaluation: one failure probability for every pipe,
/// no valve segments. Used for calibration against closed-form cases.
pub fn evaluate_uniform(
    network: &Network,
    source: NodeIndex,
    check_nodes: &[NodeIndex],
    p_fail: f64,
    repetitions: usize,
    seed: u64,
) -> WdpResult<AvailabilityReport> {
    if check_nodes.is_empty() || repetitions == 0 {
        return Err(WdpError::InvalidInput(
            "availability needs check nodes and repetitions".into(),
        ));
    }
    let edges: Vec<EdgeIndex> = network.graph.edge_indices().collect();
    let probabilities = vec![p_fail; edges.len()];
    let config = AvailabilityConfig {
        repetitions,
        seed,
        model: AvailabilityModel::Current,
        failure_rate: 0.0,
    };
    run_sampling(
        network,
        source,
        check_nodes,
        &config,
        &edges,
        &probabilities,
        None,
        true,
    )
}

#[allow(clippy::too_many_arguments)]
fn run_sampling(
    network: &Network,
    source: NodeIndex,
    check_nodes: &[NodeIndex],
    config: &AvailabilityConfig,
    edges: &[EdgeIndex],
    probabilities: &[f64],
    segments: Option<&HashMap<EdgeIndex, Vec<EdgeIndex>>>,
    unsupplied_over_all_reps: bool,
) -> WdpResult<AvailabilityReport> {
    let reps = config.repetitions;

    let one_rep = |rep: usize| -> Tally {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(rep as u64));
        let mut removed: HashSet<EdgeIndex> = HashSet::new();
        for (i, &edge) in edges.iter().enumerate() {
            let r: f64 = rng.gen();
            if r < probabilities[i] {
                match segments {
                    Some(map) => removed.extend(map[&edge].iter().copied()),
                    None => {
                        removed.insert(edge);
                    }
                }
            }
        }

        let reachable = reachable_nodes(network, source, &removed);
        let mut tally = Tally::new(check_nodes.len());
        let mut unsupplied = 0.0;
        let mut all = true;
        for (i, &node) in check_nodes.iter().enumerate() {
            if reachable.contains(&node) {
                tally.reached[i] = 1;
            } else {
                all = false;
                unsupplied += network.graph[node].demand.value();
            }
        }
        if all {
            tally.all_reached = 1;
        } else {
            tally.outage_reps = 1;
        }
        if unsupplied_over_all_reps || !all {
            tally.unsupplied_total += unsupplied;
        }
        tally
    };

    // Per-repetition tallies are collected in repetition order and folded
    // sequentially: float sums must not depend on the work-stealing tree.
    #[cfg(feature = "desktop")]
    let per_rep: Vec<Tally> = (0..reps).into_par_iter().map(one_rep).collect();
    #[cfg(not(feature = "desktop"))]
    let per_rep: Vec<Tally> = (0..reps).map(one_rep).collect();
    let tally = per_rep
        .into_iter()
        .fold(Tally::new(check_nodes.len()), Tally::merge);

    let r = reps as f64;
    let per_node: Vec<f64> = tally.reached.iter().map(|&c| c as f64 / r).collect();
    let node_avg = per_node.iter().sum::<f64>() / per_node.len() as f64;
    let node_worst = per_node.iter().cloned().fold(f64::INFINITY, f64::min);
    let network_availability = tally.all_reached as f64 / r;
    let mean_unsupplied = if unsupplied_over_all_reps {
        tally.unsupplied_total / r
    } else if tally.outage_reps > 0 {
        tally.unsupplied_total / tally.outage_reps as f64
    } else {
        0.0
    };

    let (mtbf_days, afy, yauw) = if network_availability >= 1.0 {
        (f64::INFINITY, 0.0, 0.0)
    } else {
        let mtbf = -network_availability * (1.0 / 365.0) / (network_availability - 1.0);
        if mtbf > 0.0 {
            let afy = 1.0 / mtbf;
            (mtbf, afy, afy * mean_unsupplied)
        } else {
            (0.0, f64::INFINITY, f64::INFINITY)
        }
    };

    Ok(AvailabilityReport {
        node_avg_availability: node_avg,
        node_worst_availability: node_worst,
        network_availability,
        mean_unsupplied_water: mean_unsupplied,
        mtbf_days,
        afy,
        yauw,
        repetitions: reps,
    })
}

fn reachable_nodes(
    network: &Network,
    source: NodeIndex,
    removed: &HashSet<EdgeIndex>,
) -> HashSet<NodeIndex> {
    use petgraph::visit::EdgeRef;
    let mut visited = HashSet::new();
    let mut stack = vec![source];
    visited.insert(source);
    while let Some(node) = stack.pop() {
        for edge in network.graph.edges(node) {
            if removed.contains(&edge.id()) {
                continue;
            }
            if visited.insert(edge.target()) {
                stack.push(edge.target());
            }
        }
    }
    visited
}
