//! Mutable bookkeeping for the network under construction.
//!
//! The growth loop and the augmenter both mutate a [`CandidateNetwork`]:
//! tentative edge additions that either commit or roll back. Mutations are
//! balanced by contract; [`CandidateNetwork::insert_edge`] reports whether
//! the edge was new so the caller can restrict its rollback to exactly the
//! edges it added.

use crate::precompute::EdgeKey;
use hashbrown::HashSet;
use petgraph::graph::NodeIndex;
use wdp_core::Euros;

/// The subnetwork being grown: added nodes, added demand nodes, the edge set
/// (canonical keys, O(1) lookup), and the remaining monetary budget.
#[derive(Debug, Clone)]
pub struct CandidateNetwork {
    source: NodeIndex,
    nodes: HashSet<usize>,
    demand_nodes: HashSet<usize>,
    edges: HashSet<EdgeKey>,
    remaining_budget: Euros,
}

impl CandidateNetwork {
    /// Start from the bare source with the full budget.
    pub fn new(source: NodeIndex, budget: Euros) -> Self {
        let mut nodes = HashSet::new();
        nodes.insert(source.index());
        Self {
            source,
            nodes,
            demand_nodes: HashSet::new(),
            edges: HashSet::new(),
            remaining_budget: budget,
        }
    }

    pub fn source(&self) -> NodeIndex {
        self.source
    }

    pub fn remaining_budget(&self) -> Euros {
        self.remaining_budget
    }

    pub fn set_remaining_budget(&mut self, remaining: Euros) {
        self.remaining_budget = remaining;
    }

    pub fn contains_node(&self, node: NodeIndex) -> bool {
        self.nodes.contains(&node.index())
    }

    pub fn add_node(&mut self, node: NodeIndex) {
        self.nodes.insert(node.index());
    }

    pub fn add_demand_node(&mut self, node: NodeIndex) {
        self.nodes.insert(node.index());
        self.demand_nodes.insert(node.index());
    }

    pub fn contains_edge(&self, key: EdgeKey) -> bool {
        self.edges.contains(&key)
    }

    /// Insert an edge; true when it was not present before.
    pub fn insert_edge(&mut self, key: EdgeKey) -> bool {
        self.edges.insert(key)
    }

    pub fn remove_edge(&mut self, key: EdgeKey) {
        self.edges.remove(&key);
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edge keys in sorted order, for deterministic iteration.
    pub fn edges_sorted(&self) -> Vec<EdgeKey> {
        let mut edges: Vec<EdgeKey> = self.edges.iter().copied().collect();
        edges.sort_unstable();
        edges
    }

    /// Added node indices in sorted order.
    pub fn nodes_sorted(&self) -> Vec<NodeIndex> {
        let mut nodes: Vec<usize> = self.nodes.iter().copied().collect();
        nodes.sort_unstable();
        nodes.into_iter().map(NodeIndex::new).collect()
    }

    /// Added demand-node indices in sorted order.
    pub fn demand_nodes_sorted(&self) -> Vec<NodeIndex> {
        let mut nodes: Vec<usize> = self.demand_nodes.iter().copied().collect();
        nodes.sort_unstable();
        nodes.into_iter().map(NodeIndex::new).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_with_source_only() {
        let cand = CandidateNetwork::new(NodeIndex::new(3), Euros(1000.0));
        assert!(cand.contains_node(NodeIndex::new(3)));
        assert!(!cand.contains_node(NodeIndex::new(0)));
        assert_eq!(cand.edge_count(), 0);
        assert_eq!(cand.remaining_budget().value(), 1000.0);
    }

    #[test]
    fn test_tentative_insert_and_rollback_restores_state() {
        let mut cand = CandidateNetwork::new(NodeIndex::new(0), Euros(1000.0));
        assert!(cand.insert_edge((0, 1)));
        let before = cand.edges_sorted();

        // Tentative addition: (0,1) is a duplicate, (1,2) is new.
        let mut added = Vec::new();
        for key in [(0, 1), (1, 2)] {
            if cand.insert_edge(key) {
                added.push(key);
            }
        }
        assert_eq!(added, vec![(1, 2)]);

        // Rejected: roll back exactly what was added.
        for key in added {
            cand.remove_edge(key);
        }
        assert_eq!(cand.edges_sorted(), before);
    }

    #[test]
    fn test_demand_nodes_tracked_separately() {
        let mut cand = CandidateNetwork::new(NodeIndex::new(0), Euros(1.0));
        cand.add_node(NodeIndex::new(1));
        cand.add_demand_node(NodeIndex::new(2));
        assert_eq!(cand.nodes_sorted().len(), 3);
        assert_eq!(cand.demand_nodes_sorted(), vec![NodeIndex::new(2)]);
    }
}
