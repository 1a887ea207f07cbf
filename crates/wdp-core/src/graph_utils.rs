use crate::Network;
use anyhow::{anyhow, Result};
use petgraph::algo::connected_components;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashSet, VecDeque};

/// Summary statistics (density/degree/connected components).
#[derive(Debug)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub connected_components: usize,
    pub min_degree: usize,
    pub avg_degree: f64,
    pub max_degree: usize,
    pub density: f64,
}

/// Calculates graph-level statistics such as density, degree distribution,
/// and component counts.
pub fn graph_stats(network: &Network) -> Result<GraphStats> {
    let node_count = network.graph.node_count();
    let edge_count = network.graph.edge_count();
    let mut degrees = Vec::with_capacity(node_count);
    for node in network.graph.node_indices() {
        degrees.push(network.graph.neighbors(node).count());
    }
    let min_degree = *degrees.iter().min().unwrap_or(&0);
    let max_degree = *degrees.iter().max().unwrap_or(&0);
    let avg_degree = if node_count == 0 {
        0.0
    } else {
        degrees.iter().copied().sum::<usize>() as f64 / node_count as f64
    };
    let density = if node_count < 2 {
        0.0
    } else {
        2.0 * edge_count as f64 / (node_count as f64 * (node_count as f64 - 1.0))
    };
    let connected_components = connected_components(&network.graph);
    Ok(GraphStats {
        node_count,
        edge_count,
        connected_components,
        min_degree,
        avg_degree,
        max_degree,
        density,
    })
}

/// True when the network forms a single connected component (empty graphs
/// count as connected).
pub fn is_connected(network: &Network) -> bool {
    network.graph.node_count() <= 1 || connected_components(&network.graph) == 1
}

/// Breadth-first reachability from `start`, optionally skipping a set of
/// edges. The skip set is the transient-predicate replacement for
/// delete-then-restore graph surgery.
pub fn reachable_from(
    network: &Network,
    start: NodeIndex,
    skip_edges: &HashSet<EdgeIndex>,
) -> HashSet<NodeIndex> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    visited.insert(start);
    queue.push_back(start);
    while let Some(node) = queue.pop_front() {
        for edge in network.graph.edges(node) {
            if skip_edges.contains(&edge.id()) {
                continue;
            }
            let neighbor = edge.target();
            if visited.insert(neighbor) {
                queue.push_back(neighbor);
            }
        }
    }
    visited
}

/// Dijkstra over pipe lengths, skipping a set of edges.
///
/// Returns the node sequence and its length, or `None` when `to` is
/// unreachable in the filtered view. Ties are broken toward lower node
/// indices so repeated runs take the same path.
pub fn shortest_path_avoiding(
    network: &Network,
    from: NodeIndex,
    to: NodeIndex,
    skip_edges: &HashSet<EdgeIndex>,
) -> Option<(Vec<NodeIndex>, f64)> {
    use std::cmp::Ordering;
    use std::collections::BinaryHeap;

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

    let n = network.graph.node_count();
    let mut dist = vec![f64::INFINITY; n];
    let mut parent: Vec<Option<NodeIndex>> = vec![None; n];
    let mut heap = BinaryHeap::new();
    dist[from.index()] = 0.0;
    heap.push(Entry {
        dist: 0.0,
        node: from,
    });

    while let Some(Entry { dist: d, node }) = heap.pop() {
        if d > dist[node.index()] {
            continue;
        }
        if node == to {
            let mut path = vec![to];
            let mut cursor = to;
            while let Some(prev) = parent[cursor.index()] {
                path.push(prev);
                cursor = prev;
            }
            path.reverse();
            return Some((path, d));
        }
        for edge in network.graph.edges(node) {
            if skip_edges.contains(&edge.id()) {
                continue;
            }
            let next = edge.target();
            let candidate = d + edge.weight().length.value();
            if candidate < dist[next.index()] {
                dist[next.index()] = candidate;
                parent[next.index()] = Some(node);
                heap.push(Entry {
                    dist: candidate,
                    node: next,
                });
            }
        }
    }
    None
}

/// Edges whose removal disconnects the network (bridges).
///
/// Checked per edge with a reachability sweep that skips the edge, so the
/// graph itself is never mutated.
pub fn critical_edges(network: &Network) -> HashSet<EdgeIndex> {
    let mut critical = HashSet::new();
    let node_count = network.graph.node_count();
    if node_count == 0 {
        return critical;
    }
    let mut skip = HashSet::with_capacity(1);
    for edge in network.graph.edge_indices() {
        let (a, _) = network.graph.edge_endpoints(edge).expect("edge endpoints");
        skip.insert(edge);
        if reachable_from(network, a, &skip).len() < node_count {
            critical.insert(edge);
        }
        skip.clear();
    }
    critical
}

/// Extract the largest connected component as a fresh network.
///
/// Junction and pipe weights are cloned; node and pipe ids are preserved, so
/// the id lookup of the returned network stays valid.
pub fn largest_component(network: &Network) -> Network {
    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut best: Vec<NodeIndex> = Vec::new();
    for start in network.graph.node_indices() {
        if visited.contains(&start) {
            continue;
        }
        let members = reachable_from(network, start, &HashSet::new());
        visited.extend(members.iter().copied());
        if members.len() > best.len() {
            best = members.into_iter().collect();
        }
    }

    let keep: HashSet<NodeIndex> = best.iter().copied().collect();
    let mut component = Network::new();
    let mut index_map = std::collections::HashMap::new();
    let mut ordered = best;
    ordered.sort_by_key(|&idx| network.graph[idx].id);
    for idx in ordered {
        let new_idx = component.add_junction(network.graph[idx].clone());
        index_map.insert(idx, new_idx);
    }
    for edge in network.graph.edge_references() {
        if keep.contains(&edge.source()) && keep.contains(&edge.target()) {
            component.graph.add_edge(
                index_map[&edge.source()],
                index_map[&edge.target()],
                edge.weight().clone(),
            );
        }
    }
    component
}

/// Export the topology to a DOT string (Graphviz) so external tools can
/// visualize the layout.
pub fn export_graph(network: &Network, format: &str) -> Result<String> {
    match format.to_ascii_lowercase().as_str() {
        "graphviz" | "dot" => Ok(render_dot(network)),
        other => Err(anyhow!("unsupported graph export format '{other}'")),
    }
}

fn render_dot(network: &Network) -> String {
    let mut buffer = String::new();
    buffer.push_str("graph wdp_network {\n");
    for node in network.graph.node_indices() {
        buffer.push_str(&format!(
            "  n{} [label=\"{}\"];\n",
            node.index(),
            network.graph[node].id
        ));
    }
    for edge in network.graph.edge_references() {
        let source = edge.source().index();
        let target = edge.target().index();
        buffer.push_str(&format!("  n{source} -- n{target};\n"));
    }
    buffer.push('}');
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Meters;
    use crate::{Junction, NodeId, Pipe, PipeId};

    fn path_network(n: u64) -> Network {
        let mut network = Network::new();
        let mut prev = None;
        for i in 0..n {
            let idx = network.add_junction(Junction {
                id: NodeId::new(i),
                ..Junction::default()
            });
            if let Some(p) = prev {
                network
                    .graph
                    .add_edge(p, idx, Pipe::new(PipeId::new(i as usize - 1), Meters(100.0)));
            }
            prev = Some(idx);
        }
        network
    }

    #[test]
    fn test_stats_on_path() {
        let network = path_network(4);
        let stats = graph_stats(&network).unwrap();
        assert_eq!(stats.node_count, 4);
        assert_eq!(stats.edge_count, 3);
        assert_eq!(stats.connected_components, 1);
        assert_eq!(stats.min_degree, 1);
        assert_eq!(stats.max_degree, 2);
    }

    #[test]
    fn test_every_path_edge_is_critical() {
        let network = path_network(4);
        assert_eq!(critical_edges(&network).len(), 3);
    }

    #[test]
    fn test_cycle_has_no_critical_edges() {
        let mut network = path_network(3);
        let a = network.node_index(NodeId::new(0)).unwrap();
        let c = network.node_index(NodeId::new(2)).unwrap();
        network
            .graph
            .add_edge(a, c, Pipe::new(PipeId::new(9), Meters(100.0)));
        assert!(critical_edges(&network).is_empty());
    }

    #[test]
    fn test_largest_component_extraction() {
        let mut network = path_network(4);
        // Two stray nodes forming a smaller component.
        let x = network.add_junction(Junction {
            id: NodeId::new(10),
            ..Junction::default()
        });
        let y = network.add_junction(Junction {
            id: NodeId::new(11),
            ..Junction::default()
        });
        network
            .graph
            .add_edge(x, y, Pipe::new(PipeId::new(20), Meters(50.0)));

        let component = largest_component(&network);
        assert_eq!(component.graph.node_count(), 4);
        assert_eq!(component.graph.edge_count(), 3);
        assert!(component.node_index(NodeId::new(10)).is_none());
        assert!(component.node_index(NodeId::new(3)).is_some());
    }

    #[test]
    fn test_reachable_with_skip() {
        let network = path_network(3);
        let start = network.node_index(NodeId::new(0)).unwrap();
        let mid_edge = network.graph.edge_indices().next().unwrap();
        let mut skip = HashSet::new();
        skip.insert(mid_edge);
        let reached = reachable_from(&network, start, &skip);
        assert_eq!(reached.len(), 1);
    }

    #[test]
    fn test_shortest_path_avoiding() {
        // Triangle with a long detour edge.
        let mut network = path_network(3);
        let a = network.node_index(NodeId::new(0)).unwrap();
        let c = network.node_index(NodeId::new(2)).unwrap();
        network
            .graph
            .add_edge(a, c, Pipe::new(PipeId::new(9), Meters(500.0)));

        let (path, len) = shortest_path_avoiding(&network, a, c, &HashSet::new()).unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(len, 200.0);

        // Skip the first hop of the short route: the detour wins.
        let first_hop = network.pipe_between(a, network.node_index(NodeId::new(1)).unwrap());
        let skip: HashSet<EdgeIndex> = first_hop.into_iter().collect();
        let (path, len) = shortest_path_avoiding(&network, a, c, &skip).unwrap();
        assert_eq!(path, vec![a, c]);
        assert_eq!(len, 500.0);

        // Skipping both routes leaves the target unreachable.
        let mut skip_all = skip.clone();
        skip_all.insert(network.pipe_between(a, c).unwrap());
        assert!(shortest_path_avoiding(&network, a, c, &skip_all).is_none());
    }

    #[test]
    fn test_dot_export() {
        let network = path_network(2);
        let dot = export_graph(&network, "dot").unwrap();
        assert!(dot.starts_with("graph wdp_network"));
        assert!(dot.contains("n0 -- n1"));
        assert!(export_graph(&network, "svg").is_err());
    }
}
