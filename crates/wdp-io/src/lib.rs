//! # wdp-io: Street-Graph and Report Serialization
//!
//! Implements the JSON interchange contract: annotated street graphs come in
//! as `{"nodes": [...], "edges": [...]}` documents, planned networks and
//! report bundles go out the same way. Import collects diagnostics instead of
//! failing on the first recoverable oddity; structural errors (dangling edge
//! references, duplicate ids) abort.
//!
//! ```ignore
//! let (street, diagnostics) = wdp_io::import_street_graph("girona.json")?;
//! if diagnostics.has_errors() {
//!     eprintln!("{diagnostics}");
//! }
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use wdp_core::units::{CubicMetersPerDay, Meters, Millimeters};
use wdp_core::{
    Diagnostics, Junction, Material, Network, NodeId, Pipe, PipeId, WdpError, WdpResult,
};

/// One node record of the street-graph schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u64,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    /// Terrain elevation (m)
    #[serde(default)]
    pub elevation: f64,
    /// Reclaimed-water demand (m³/day)
    #[serde(default)]
    pub consumption: f64,
    /// Cadastral reference tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refcat: Option<String>,
}

/// One edge record of the street-graph schema. Condition attributes are only
/// needed for availability studies on existing networks; absent values mean
/// a fresh PE100 pipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub from: u64,
    pub to: u64,
    /// Segment length (m)
    pub length: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diameter: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<Material>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_thickness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valve: Option<f64>,
}

/// A street graph or planned network as serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphFile {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

/// Parse a street graph from its JSON text.
///
/// Returns the network plus the diagnostics collected while importing and
/// validating it. Callers decide how strict to be about warnings.
pub fn parse_street_graph(json: &str) -> WdpResult<(Network, Diagnostics)> {
    let file: GraphFile =
        serde_json::from_str(json).map_err(|e| WdpError::Parse(e.to_string()))?;
    build_network(&file)
}

/// Load a street graph from a JSON file.
pub fn import_street_graph(path: impl AsRef<Path>) -> WdpResult<(Network, Diagnostics)> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading street graph {}", path.display()))
        .map_err(WdpError::from)?;
    parse_street_graph(&json)
}

fn build_network(file: &GraphFile) -> WdpResult<(Network, Diagnostics)> {
    let mut diagnostics = Diagnostics::new();
    let mut network = Network::new();

    for record in &file.nodes {
        let id = NodeId::new(record.id);
        if network.node_index(id).is_some() {
            return Err(WdpError::Parse(format!("duplicate node id {}", record.id)));
        }
        network.add_junction(Junction {
            id,
            x: record.x,
            y: record.y,
            elevation: Meters(record.elevation),
            demand: CubicMetersPerDay(record.consumption),
            refcat: record.refcat.clone(),
        });
    }

    for (i, record) in file.edges.iter().enumerate() {
        let from = network.node_index(NodeId::new(record.from)).ok_or_else(|| {
            WdpError::Parse(format!(
                "edge {} references missing node {}",
                i, record.from
            ))
        })?;
        let to = network.node_index(NodeId::new(record.to)).ok_or_else(|| {
            WdpError::Parse(format!("edge {} references missing node {}", i, record.to))
        })?;
        if from == to {
            diagnostics.add_warning_with_entity(
                "structure",
                "self-loop dropped",
                &format!("pipe {}-{}", record.from, record.to),
            );
            continue;
        }
        if network.pipe_between(from, to).is_some() {
            diagnostics.add_warning_with_entity(
                "structure",
                "parallel edge dropped",
                &format!("pipe {}-{}", record.from, record.to),
            );
            continue;
        }
        let mut pipe = Pipe::new(PipeId::new(i), Meters(record.length)).with_condition(
            Millimeters(record.diameter.unwrap_or(0.0)),
            record.age.unwrap_or(0.0),
            record.material.unwrap_or(Material::Pe100),
            Millimeters(record.wall_thickness.unwrap_or(0.0)),
        );
        pipe.flow = record.flow.map(CubicMetersPerDay);
        pipe.valve = record.valve.map(Millimeters);
        network.graph.add_edge(from, to, pipe);
    }

    network.validate_into(&mut diagnostics);
    Ok((network, diagnostics))
}

/// Serialize a network back into the interchange schema.
pub fn network_to_graph_file(network: &Network) -> GraphFile {
    let nodes = network
        .graph
        .node_indices()
        .map(|idx| {
            let junction = &network.graph[idx];
            NodeRecord {
                id: junction.id.value(),
                x: junction.x,
                y: junction.y,
                elevation: junction.elevation.value(),
                consumption: junction.demand.value(),
                refcat: junction.refcat.clone(),
            }
        })
        .collect();

    let edges = network
        .graph
        .edge_indices()
        .map(|edge| {
            let (a, b) = network.graph.edge_endpoints(edge).expect("edge endpoints");
            let pipe = &network.graph[edge];
            EdgeRecord {
                from: network.graph[a].id.value(),
                to: network.graph[b].id.value(),
                length: pipe.length.value(),
                diameter: (pipe.diameter.value() > 0.0).then(|| pipe.diameter.value()),
                age: Some(pipe.age_years),
                material: Some(pipe.material),
                wall_thickness: (pipe.wall_thickness.value() > 0.0)
                    .then(|| pipe.wall_thickness.value()),
                flow: pipe.flow.map(|f| f.value()),
                valve: pipe.valve.map(|v| v.value()),
            }
        })
        .collect();

    GraphFile { nodes, edges }
}

/// Write a network to a JSON file in the interchange schema.
pub fn export_network(network: &Network, path: impl AsRef<Path>) -> WdpResult<()> {
    let path = path.as_ref();
    let file = network_to_graph_file(network);
    let json =
        serde_json::to_string_pretty(&file).map_err(|e| WdpError::Parse(e.to_string()))?;
    std::fs::write(path, json)
        .with_context(|| format!("writing network {}", path.display()))
        .map_err(WdpError::from)?;
    Ok(())
}

/// Write any serializable report bundle as pretty JSON.
pub fn write_report<T: Serialize>(report: &T, path: impl AsRef<Path>) -> WdpResult<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(report).map_err(|e| WdpError::Parse(e.to_string()))?;
    std::fs::write(path, json)
        .with_context(|| format!("writing report {}", path.display()))
        .map_err(WdpError::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE_GRAPH: &str = r#"{
        "nodes": [
            {"id": 0, "x": 2.82, "y": 41.97, "elevation": 120.0, "consumption": 0.0},
            {"id": 1, "x": 2.82, "y": 41.98, "elevation": 118.0, "consumption": 10.0},
            {"id": 2, "x": 2.82, "y": 41.99, "elevation": 116.0, "consumption": 10.0}
        ],
        "edges": [
            {"from": 0, "to": 1, "length": 100.0},
            {"from": 1, "to": 2, "length": 100.0, "diameter": 63.0, "age": 12.0,
             "material": "HDPE", "wall_thickness": 3.8}
        ]
    }"#;

    #[test]
    fn test_parse_line_graph() {
        let (network, diagnostics) = parse_street_graph(LINE_GRAPH).unwrap();
        assert!(!diagnostics.has_errors(), "{diagnostics}");
        assert_eq!(network.graph.node_count(), 3);
        assert_eq!(network.graph.edge_count(), 2);
        assert_eq!(network.stats().num_demand_nodes, 2);

        let n1 = network.node_index(NodeId::new(1)).unwrap();
        let n2 = network.node_index(NodeId::new(2)).unwrap();
        let pipe = &network.graph[network.pipe_between(n1, n2).unwrap()];
        assert_eq!(pipe.material, Material::Hdpe);
        assert_eq!(pipe.diameter.value(), 63.0);

        // Condition attributes default to a fresh PE100 pipe.
        let n0 = network.node_index(NodeId::new(0)).unwrap();
        let fresh = &network.graph[network.pipe_between(n0, n1).unwrap()];
        assert_eq!(fresh.material, Material::Pe100);
        assert_eq!(fresh.age_years, 0.0);
    }

    #[test]
    fn test_dangling_edge_rejected() {
        let json = r#"{
            "nodes": [{"id": 0}],
            "edges": [{"from": 0, "to": 7, "length": 10.0}]
        }"#;
        assert!(matches!(
            parse_street_graph(json),
            Err(WdpError::Parse(_))
        ));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let json = r#"{
            "nodes": [{"id": 3}, {"id": 3}],
            "edges": []
        }"#;
        assert!(matches!(
            parse_street_graph(json),
            Err(WdpError::Parse(_))
        ));
    }

    #[test]
    fn test_self_loop_and_parallel_edges_warn() {
        let json = r#"{
            "nodes": [{"id": 0}, {"id": 1, "consumption": 5.0}],
            "edges": [
                {"from": 0, "to": 0, "length": 5.0},
                {"from": 0, "to": 1, "length": 10.0},
                {"from": 1, "to": 0, "length": 11.0}
            ]
        }"#;
        let (network, diagnostics) = parse_street_graph(json).unwrap();
        assert_eq!(network.graph.edge_count(), 1);
        assert_eq!(diagnostics.warning_count(), 2);
    }

    #[test]
    fn test_validation_surfaces_disconnection() {
        let json = r#"{
            "nodes": [{"id": 0}, {"id": 1}, {"id": 2, "consumption": 4.0}],
            "edges": [{"from": 0, "to": 1, "length": 10.0}]
        }"#;
        let (_, diagnostics) = parse_street_graph(json).unwrap();
        assert!(diagnostics.has_errors());
        assert!(diagnostics.errors().any(|i| i.message.contains("disconnected")));
    }

    #[test]
    fn test_roundtrip_through_files() {
        let (network, _) = parse_street_graph(LINE_GRAPH).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.json");
        export_network(&network, &path).unwrap();

        let (back, diagnostics) = import_street_graph(&path).unwrap();
        assert!(!diagnostics.has_errors());
        assert_eq!(back.graph.node_count(), network.graph.node_count());
        assert_eq!(back.graph.edge_count(), network.graph.edge_count());
        assert_eq!(
            back.total_demand().value(),
            network.total_demand().value()
        );
    }

    #[test]
    fn test_write_report_json() {
        #[derive(Serialize)]
        struct Dummy {
            percent_served: f64,
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_report(
            &Dummy {
                percent_served: 87.5,
            },
            &path,
        )
        .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("percent_served"));
        assert!(text.contains("87.5"));
    }
}
