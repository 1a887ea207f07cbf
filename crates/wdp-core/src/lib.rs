//! # wdp-core: Water Distribution Planning Core
//!
//! Provides the fundamental data structures and graph-based network model for
//! reclaimed-water distribution planning.
//!
//! ## Design Philosophy
//!
//! Street graphs and planned networks are modeled as **undirected graphs**
//! where:
//! - **Nodes**: street junctions carrying elevation and reclaimed-water demand
//! - **Edges**: pipes (or pipe-ready street segments) carrying length and
//!   condition attributes
//!
//! This graph-based approach enables:
//! - Fast topological queries (connectivity, component extraction, bridges)
//! - Shortest-path precomputation shared by every planning stage
//! - Type-safe element access with newtype IDs
//!
//! ## Quick Start
//!
//! ```rust
//! use wdp_core::*;
//! use wdp_core::units::{CubicMetersPerDay, Meters};
//!
//! let mut network = Network::new();
//!
//! let plant = network.add_junction(Junction {
//!     id: NodeId::new(0),
//!     elevation: Meters(120.0),
//!     ..Junction::default()
//! });
//! let consumer = network.add_junction(Junction {
//!     id: NodeId::new(1),
//!     demand: CubicMetersPerDay(10.0),
//!     ..Junction::default()
//! });
//!
//! network.graph.add_edge(plant, consumer, Pipe::new(PipeId::new(0), Meters(100.0)));
//!
//! assert_eq!(network.stats().num_demand_nodes, 1);
//! ```
//!
//! ## Core Data Structures
//!
//! - [`Network`] - The main network container (petgraph undirected graph)
//! - [`Junction`] - Street/network node with coordinates, elevation, demand
//! - [`Pipe`] - Edge weight with length, condition attributes, and sizing
//!   results (diameter, flow, valve) once planned
//! - Type-safe IDs: [`NodeId`], [`PipeId`]
//!
//! ## Modules
//!
//! - [`catalog`] - Pipe/valve/tank construction catalogues
//! - [`diagnostics`] - Validation and diagnostic reporting
//! - [`graph_utils`] - Topological analysis (components, bridges, stats)
//! - [`units`] - Unit-safe newtypes for hydraulic and monetary quantities
//!
//! ## Integration with wdp-io
//!
//! The wdp-io crate imports street graphs from the JSON interchange schema
//! and constructs [`Network`] values from them.

use petgraph::{prelude::*, Undirected};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod catalog;
pub mod diagnostics;
pub mod error;
pub mod graph_utils;
pub mod units;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{WdpError, WdpResult};
pub use graph_utils::*;
pub use petgraph::graph::{EdgeIndex, NodeIndex};
pub use units::{CubicMeters, CubicMetersPerDay, Euros, Meters, MetersPerSecond, Millimeters};

// Newtype wrappers for IDs for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipeId(usize);

impl NodeId {
    #[inline]
    pub fn new(value: u64) -> Self {
        NodeId(value)
    }
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PipeId {
    #[inline]
    pub fn new(value: usize) -> Self {
        PipeId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

/// Pipe material classes understood by the availability model.
///
/// The serialized names match the street-graph interchange schema. Planned
/// pipes are always emitted as [`Material::PE100`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Material {
    #[serde(rename = "HDPE")]
    Hdpe,
    #[serde(rename = "MDPE_black")]
    MdpeBlack,
    #[serde(rename = "MDPE_blue")]
    MdpeBlue,
    #[serde(rename = "GI")]
    Gi,
    #[serde(rename = "LDPE_black")]
    LdpeBlack,
    #[serde(rename = "AC")]
    Ac,
    #[serde(rename = "UPVC")]
    Upvc,
    #[serde(rename = "DI")]
    Di,
    #[default]
    #[serde(rename = "PE100")]
    Pe100,
}

impl Material {
    /// Failure-propensity class of the material, one of {1.0, 0.67, 0.33, 0.0}.
    ///
    /// Higher values mark materials with worse field failure records. PE100,
    /// the material of all newly planned pipes, scores 0.0.
    pub fn reliability_class(&self) -> f64 {
        match self {
            Material::Hdpe => 1.0,
            Material::MdpeBlack => 0.67,
            Material::MdpeBlue | Material::Gi | Material::LdpeBlack | Material::Ac => 0.33,
            Material::Upvc | Material::Di | Material::Pe100 => 0.0,
        }
    }
}

/// A street junction / network node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Junction {
    pub id: NodeId,
    /// Longitude or projected x coordinate (decimal degrees)
    pub x: f64,
    /// Latitude or projected y coordinate (decimal degrees)
    pub y: f64,
    /// Terrain elevation
    pub elevation: Meters,
    /// Reclaimed-water demand; zero for non-consumers
    pub demand: CubicMetersPerDay,
    /// Cadastral reference tag, when the demand was geocoded from records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refcat: Option<String>,
}

impl Default for Junction {
    fn default() -> Self {
        Self {
            id: NodeId(0),
            x: 0.0,
            y: 0.0,
            elevation: Meters(0.0),
            demand: CubicMetersPerDay(0.0),
            refcat: None,
        }
    }
}

impl Junction {
    /// True when the junction demands reclaimed water.
    #[inline]
    pub fn is_consumer(&self) -> bool {
        self.demand.value() > 0.0
    }
}

/// A pipe or pipe-ready street segment.
///
/// On an input street graph only `length` (and, for availability studies, the
/// condition attributes) are meaningful. The planner fills `diameter`,
/// `flow`, `valve`, and `wall_thickness` when a candidate network is sized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipe {
    pub id: PipeId,
    /// Segment length
    pub length: Meters,
    /// Nominal diameter (mm); zero until sized
    pub diameter: Millimeters,
    /// Age in years; planned pipes start at zero
    pub age_years: f64,
    pub material: Material,
    /// Wall thickness (mm)
    pub wall_thickness: Millimeters,
    /// Design flow assigned by the sizer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<CubicMetersPerDay>,
    /// Isolation valve diameter (mm) when the sizer placed one on this pipe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valve: Option<Millimeters>,
}

impl Default for Pipe {
    fn default() -> Self {
        Self {
            id: PipeId(0),
            length: Meters(0.0),
            diameter: Millimeters(0.0),
            age_years: 0.0,
            material: Material::Pe100,
            wall_thickness: Millimeters(0.0),
            flow: None,
            valve: None,
        }
    }
}

impl Pipe {
    /// Create an unsized pipe with the given length.
    pub fn new(id: PipeId, length: Meters) -> Self {
        Self {
            id,
            length,
            ..Self::default()
        }
    }

    /// Attach condition attributes used by the availability model.
    pub fn with_condition(
        mut self,
        diameter: Millimeters,
        age_years: f64,
        material: Material,
        wall_thickness: Millimeters,
    ) -> Self {
        self.diameter = diameter;
        self.age_years = age_years;
        self.material = material;
        self.wall_thickness = wall_thickness;
        self
    }

    /// True when the sizer placed an isolation valve on this pipe.
    #[inline]
    pub fn has_valve(&self) -> bool {
        self.valve.is_some()
    }
}

/// The core network graph.
///
/// Nodes should be added through [`Network::add_junction`] so the
/// id-to-index lookup stays consistent; edges may be added directly on
/// `graph`.
#[derive(Debug, Default, Clone)]
pub struct Network {
    pub graph: Graph<Junction, Pipe, Undirected>,
    node_lookup: HashMap<NodeId, NodeIndex>,
}

impl Network {
    pub fn new() -> Self {
        Self {
            graph: Graph::new_undirected(),
            node_lookup: HashMap::new(),
        }
    }

    /// Add a junction and register its id in the lookup table.
    pub fn add_junction(&mut self, junction: Junction) -> NodeIndex {
        let id = junction.id;
        let idx = self.graph.add_node(junction);
        self.node_lookup.insert(id, idx);
        idx
    }

    /// Resolve an external node id to its graph index.
    pub fn node_index(&self, id: NodeId) -> Option<NodeIndex> {
        self.node_lookup.get(&id).copied()
    }

    /// The junction weight at `idx`.
    pub fn junction(&self, idx: NodeIndex) -> &Junction {
        &self.graph[idx]
    }

    /// Indices of all junctions with positive demand, in ascending node-id
    /// order for deterministic iteration.
    pub fn demand_nodes(&self) -> Vec<NodeIndex> {
        let mut nodes: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&idx| self.graph[idx].is_consumer())
            .collect();
        nodes.sort_by_key(|&idx| self.graph[idx].id);
        nodes
    }

    /// Total reclaimed-water demand over all junctions.
    pub fn total_demand(&self) -> CubicMetersPerDay {
        self.graph.node_weights().map(|j| j.demand).sum()
    }

    /// Total pipe length over all edges.
    pub fn total_pipe_length(&self) -> Meters {
        self.graph.edge_weights().map(|p| p.length).sum()
    }

    /// Edge between two node indices, if any.
    pub fn pipe_between(&self, a: NodeIndex, b: NodeIndex) -> Option<EdgeIndex> {
        self.graph.find_edge(a, b)
    }

    /// Compute basic statistics about the network
    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats {
            num_nodes: self.graph.node_count(),
            num_pipes: self.graph.edge_count(),
            ..NetworkStats::default()
        };

        for junction in self.graph.node_weights() {
            if junction.is_consumer() {
                stats.num_demand_nodes += 1;
            }
            stats.total_demand_m3_day += junction.demand.value();
        }
        for pipe in self.graph.edge_weights() {
            stats.total_pipe_length_m += pipe.length.value();
        }
        stats
    }

    /// Validate network data for common issues that break the planner.
    ///
    /// Populates the provided `Diagnostics` with any warnings/errors found.
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        let stats = self.stats();

        if stats.num_nodes == 0 {
            diag.add_error("structure", "Street graph has no nodes");
            return; // Can't check further
        }

        if stats.num_pipes == 0 && stats.num_nodes > 1 {
            diag.add_error("structure", "Street graph has multiple nodes but no edges");
        }

        if stats.num_demand_nodes == 0 {
            diag.add_warning("demand", "Street graph has no consumption nodes");
        }

        for idx in self.graph.node_indices() {
            let junction = &self.graph[idx];
            if junction.demand.value() < 0.0 {
                diag.add_error_with_entity(
                    "demand",
                    "Negative reclaimed-water demand",
                    &format!("node {}", junction.id),
                );
            }
        }

        for edge in self.graph.edge_indices() {
            let pipe = &self.graph[edge];
            if pipe.length.value() <= 0.0 {
                let (a, b) = self.graph.edge_endpoints(edge).expect("edge endpoints");
                diag.add_error_with_entity(
                    "structure",
                    "Pipe length must be positive",
                    &format!("pipe {}-{}", self.graph[a].id, self.graph[b].id),
                );
            }
        }

        if stats.num_nodes > 1 && !graph_utils::is_connected(self) {
            diag.add_error("structure", "Street graph is disconnected");
        }
    }
}

/// Statistics about a network's size and demand
#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkStats {
    pub num_nodes: usize,
    pub num_pipes: usize,
    pub num_demand_nodes: usize,
    pub total_demand_m3_day: f64,
    pub total_pipe_length_m: f64,
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} nodes, {} pipes ({:.0} m), {} consumers ({:.1} m3/day)",
            self.num_nodes,
            self.num_pipes,
            self.total_pipe_length_m,
            self.num_demand_nodes,
            self.total_demand_m3_day
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_node_network() -> Network {
        let mut network = Network::new();
        let a = network.add_junction(Junction {
            id: NodeId::new(0),
            elevation: Meters(120.0),
            ..Junction::default()
        });
        let b = network.add_junction(Junction {
            id: NodeId::new(1),
            demand: CubicMetersPerDay(10.0),
            ..Junction::default()
        });
        network
            .graph
            .add_edge(a, b, Pipe::new(PipeId::new(0), Meters(100.0)));
        network
    }

    #[test]
    fn test_network_creation_and_lookup() {
        let network = two_node_network();
        assert_eq!(network.graph.node_count(), 2);
        assert_eq!(network.graph.edge_count(), 1);

        let idx = network.node_index(NodeId::new(1)).unwrap();
        assert!(network.junction(idx).is_consumer());
        assert!(network.node_index(NodeId::new(7)).is_none());
    }

    #[test]
    fn test_stats() {
        let network = two_node_network();
        let stats = network.stats();
        assert_eq!(stats.num_nodes, 2);
        assert_eq!(stats.num_pipes, 1);
        assert_eq!(stats.num_demand_nodes, 1);
        assert!((stats.total_demand_m3_day - 10.0).abs() < 1e-9);
        assert!((stats.total_pipe_length_m - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_validation_empty() {
        let network = Network::new();
        let mut diag = Diagnostics::new();
        network.validate_into(&mut diag);
        assert!(diag.has_errors());
        assert!(diag.errors().any(|i| i.message.contains("no nodes")));
    }

    #[test]
    fn test_validation_negative_demand() {
        let mut network = two_node_network();
        network.add_junction(Junction {
            id: NodeId::new(2),
            demand: CubicMetersPerDay(-1.0),
            ..Junction::default()
        });
        let mut diag = Diagnostics::new();
        network.validate_into(&mut diag);
        assert!(diag.errors().any(|i| i.message.contains("Negative")));
    }

    #[test]
    fn test_validation_disconnected() {
        let mut network = two_node_network();
        network.add_junction(Junction {
            id: NodeId::new(2),
            ..Junction::default()
        });
        let mut diag = Diagnostics::new();
        network.validate_into(&mut diag);
        assert!(diag.errors().any(|i| i.message.contains("disconnected")));
    }

    #[test]
    fn test_demand_nodes_sorted_by_id() {
        let mut network = Network::new();
        let c = network.add_junction(Junction {
            id: NodeId::new(9),
            demand: CubicMetersPerDay(1.0),
            ..Junction::default()
        });
        let a = network.add_junction(Junction {
            id: NodeId::new(3),
            demand: CubicMetersPerDay(1.0),
            ..Junction::default()
        });
        let nodes = network.demand_nodes();
        assert_eq!(nodes, vec![a, c]);
    }

    #[test]
    fn test_material_classes() {
        assert_eq!(Material::Hdpe.reliability_class(), 1.0);
        assert_eq!(Material::MdpeBlack.reliability_class(), 0.67);
        assert_eq!(Material::Gi.reliability_class(), 0.33);
        assert_eq!(Material::Pe100.reliability_class(), 0.0);
    }

    #[test]
    fn test_material_serde_names() {
        let json = serde_json::to_string(&Material::MdpeBlack).unwrap();
        assert_eq!(json, "\"MDPE_black\"");
        let back: Material = serde_json::from_str("\"LDPE_black\"").unwrap();
        assert_eq!(back, Material::LdpeBlack);
    }
}
