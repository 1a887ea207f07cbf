//! All-pairs shortest-path precomputation shared by every planning stage.
//!
//! The growth loop compares candidate attachments against every already-added
//! node, so it performs `O(|V|²)` path lookups per planning run. Computing
//! per-source Dijkstra trees once up front trades memory (quadratic in `|V|`)
//! for those lookups becoming O(1) distance reads and O(path) walks.
//!
//! Paths are canonicalized so that the path from `u` to `v` is always the
//! reverse of the path from `v` to `u`, even when several shortest paths tie.

use hashbrown::HashMap;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use wdp_core::{graph_utils, Network, WdpError, WdpResult};

#[cfg(feature = "desktop")]
use rayon::prelude::*;

/// Canonical undirected edge key: node indices ordered low-to-high.
pub type EdgeKey = (usize, usize);

/// Canonicalize an undirected edge between two node indices.
#[inline]
pub fn edge_key(a: NodeIndex, b: NodeIndex) -> EdgeKey {
    let (a, b) = (a.index(), b.index());
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Consecutive node pairs of a path as canonical edge keys.
pub fn path_edge_keys(path: &[NodeIndex]) -> Vec<EdgeKey> {
    path.windows(2).map(|w| edge_key(w[0], w[1])).collect()
}

/// One Dijkstra tree rooted at a source node.
struct SourceRow {
    dist: Vec<f64>,
    parent: Vec<Option<NodeIndex>>,
    /// Demand summed over the tree path from the source, both endpoints
    /// included.
    path_demand: Vec<f64>,
}

/// Immutable precomputed lookups: per-pair shortest paths and lengths,
/// downstream-demand sums, edge lengths (both orderings), the demand map and
/// the demand-node set.
pub struct PrecomputedBundle {
    node_count: usize,
    demand: Vec<f64>,
    demand_nodes: Vec<NodeIndex>,
    total_demand: f64,
    rows: Vec<SourceRow>,
    edge_lengths: HashMap<(usize, usize), f64>,
}

#[derive(PartialEq)]
struct HeapEntry {
    dist: f64,
    node: NodeIndex,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on distance, ties resolved by node index so exploration
        // order is stable across runs.
        other
            .dist
            .partial_cmp(&self.dist)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.node.index().cmp(&self.node.index()))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PrecomputedBundle {
    /// Derive the bundle from a street graph.
    ///
    /// Fails with `InvalidInput` when the graph is disconnected or carries a
    /// negative demand.
    pub fn compute(network: &Network) -> WdpResult<Self> {
        if !graph_utils::is_connected(network) {
            return Err(WdpError::InvalidInput(
                "street graph must be connected".into(),
            ));
        }
        let node_count = network.graph.node_count();
        let mut demand = vec![0.0; node_count];
        for idx in network.graph.node_indices() {
            let d = network.graph[idx].demand.value();
            if d < 0.0 {
                return Err(WdpError::InvalidInput(format!(
                    "node {} has negative demand {d}",
                    network.graph[idx].id
                )));
            }
            demand[idx.index()] = d;
        }
        let demand_nodes = network.demand_nodes();
        let total_demand = demand.iter().sum();

        let mut edge_lengths = HashMap::with_capacity(network.graph.edge_count() * 2);
        for edge in network.graph.edge_references() {
            let len = edge.weight().length.value();
            edge_lengths.insert((edge.source().index(), edge.target().index()), len);
            edge_lengths.insert((edge.target().index(), edge.source().index()), len);
        }

        let sources: Vec<NodeIndex> = network.graph.node_indices().collect();
        #[cfg(feature = "desktop")]
        let rows: Vec<SourceRow> = sources
            .par_iter()
            .map(|&s| source_row(network, s, &demand))
            .collect();
        #[cfg(not(feature = "desktop"))]
        let rows: Vec<SourceRow> = sources
            .iter()
            .map(|&s| source_row(network, s, &demand))
            .collect();

        Ok(Self {
            node_count,
            demand,
            demand_nodes,
            total_demand,
            rows,
            edge_lengths,
        })
    }

    /// Number of nodes covered by the bundle.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Demand of a single node.
    #[inline]
    pub fn demand(&self, v: NodeIndex) -> f64 {
        self.demand[v.index()]
    }

    /// Nodes with positive demand, ascending by node id.
    pub fn demand_nodes(&self) -> &[NodeIndex] {
        &self.demand_nodes
    }

    /// Total demand over the whole street graph.
    pub fn total_demand(&self) -> f64 {
        self.total_demand
    }

    /// Shortest-path length between two nodes. Symmetric by construction.
    #[inline]
    pub fn path_length(&self, u: NodeIndex, v: NodeIndex) -> f64 {
        let (a, b) = order(u, v);
        self.rows[a.index()].dist[b.index()]
    }

    /// Shortest path between two nodes, endpoints included.
    ///
    /// The reverse direction returns the same node sequence reversed, so the
    /// path tables stay mutually consistent under tie-breaking.
    pub fn path(&self, u: NodeIndex, v: NodeIndex) -> Vec<NodeIndex> {
        if u == v {
            return vec![u];
        }
        let (a, b) = order(u, v);
        let row = &self.rows[a.index()];
        let mut path = Vec::new();
        let mut cursor = b;
        path.push(cursor);
        while let Some(prev) = row.parent[cursor.index()] {
            path.push(prev);
            cursor = prev;
        }
        // The walk runs b -> a; flip when the caller asked for a -> b.
        if u == a {
            path.reverse();
        }
        path
    }

    /// Demand summed over the shortest path from `u` to `v`, excluding `u`.
    #[inline]
    pub fn downstream_demand(&self, u: NodeIndex, v: NodeIndex) -> f64 {
        if u == v {
            return 0.0;
        }
        let (a, b) = order(u, v);
        self.rows[a.index()].path_demand[b.index()] - self.demand[u.index()]
    }

    /// Length of a single street edge, either ordering.
    #[inline]
    pub fn edge_length(&self, a: NodeIndex, b: NodeIndex) -> f64 {
        self.edge_lengths
            .get(&(a.index(), b.index()))
            .copied()
            .unwrap_or(f64::INFINITY)
    }
}

#[inline]
fn order(u: NodeIndex, v: NodeIndex) -> (NodeIndex, NodeIndex) {
    if u.index() <= v.index() {
        (u, v)
    } else {
        (v, u)
    }
}

fn source_row(network: &Network, source: NodeIndex, demand: &[f64]) -> SourceRow {
    let n = network.graph.node_count();
    let mut dist = vec![f64::INFINITY; n];
    let mut parent: Vec<Option<NodeIndex>> = vec![None; n];
    let mut settled = vec![false; n];
    let mut heap = BinaryHeap::new();

    dist[source.index()] = 0.0;
    heap.push(HeapEntry {
        dist: 0.0,
        node: source,
    });

    while let Some(HeapEntry { dist: d, node }) = heap.pop() {
        if settled[node.index()] {
            continue;
        }
        settled[node.index()] = true;
        for edge in network.graph.edges(node) {
            let next = edge.target();
            let candidate = d + edge.weight().length.value();
            if candidate < dist[next.index()] {
                dist[next.index()] = candidate;
                parent[next.index()] = Some(node);
                heap.push(HeapEntry {
                    dist: candidate,
                    node: next,
                });
            }
        }
    }

    // Accumulate path demand in distance order so parents are always ready.
    let mut by_dist: Vec<usize> = (0..n).collect();
    by_dist.sort_by(|&a, &b| {
        dist[a]
            .partial_cmp(&dist[b])
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.cmp(&b))
    });
    let mut path_demand = vec![0.0; n];
    for idx in by_dist {
        path_demand[idx] = match parent[idx] {
            Some(p) => path_demand[p.index()] + demand[idx],
            None => demand[idx],
        };
    }

    SourceRow {
        dist,
        parent,
        path_demand,
    }
}
