//! Small street-graph fixtures shared by unit and integration tests.

use wdp_core::units::{CubicMetersPerDay, Meters, Millimeters};
use wdp_core::{Junction, Material, Network, NodeId, Pipe, PipeId};

/// A path graph `0 - 1 - ... - n` with the given edge lengths and per-node
/// demands (`demands.len() == lengths.len() + 1`).
pub fn line_street(lengths: &[f64], demands: &[f64]) -> Network {
    assert_eq!(demands.len(), lengths.len() + 1);
    let mut network = Network::new();
    let mut prev = None;
    for (i, &demand) in demands.iter().enumerate() {
        let idx = network.add_junction(Junction {
            id: NodeId::new(i as u64),
            demand: CubicMetersPerDay(demand),
            ..Junction::default()
        });
        if let Some(p) = prev {
            network
                .graph
                .add_edge(p, idx, Pipe::new(PipeId::new(i - 1), Meters(lengths[i - 1])));
        }
        prev = Some(idx);
    }
    network
}

/// A triangle `0 - 1 - 2 - 0`; `lengths` are the edges `(0,1)`, `(1,2)`,
/// `(0,2)` in that order.
pub fn triangle_street(lengths: &[f64; 3], demands: &[f64; 3]) -> Network {
    let mut network = Network::new();
    let nodes: Vec<_> = demands
        .iter()
        .enumerate()
        .map(|(i, &demand)| {
            network.add_junction(Junction {
                id: NodeId::new(i as u64),
                demand: CubicMetersPerDay(demand),
                ..Junction::default()
            })
        })
        .collect();
    network
        .graph
        .add_edge(nodes[0], nodes[1], Pipe::new(PipeId::new(0), Meters(lengths[0])));
    network
        .graph
        .add_edge(nodes[1], nodes[2], Pipe::new(PipeId::new(1), Meters(lengths[1])));
    network
        .graph
        .add_edge(nodes[0], nodes[2], Pipe::new(PipeId::new(2), Meters(lengths[2])));
    network
}

/// A star with node 0 at the hub and one leaf per entry of `lengths`;
/// `demands[0]` is the hub's.
pub fn star_street(lengths: &[f64], demands: &[f64]) -> Network {
    assert_eq!(demands.len(), lengths.len() + 1);
    let mut network = Network::new();
    let hub = network.add_junction(Junction {
        id: NodeId::new(0),
        demand: CubicMetersPerDay(demands[0]),
        ..Junction::default()
    });
    for (i, &length) in lengths.iter().enumerate() {
        let leaf = network.add_junction(Junction {
            id: NodeId::new(i as u64 + 1),
            demand: CubicMetersPerDay(demands[i + 1]),
            ..Junction::default()
        });
        network
            .graph
            .add_edge(hub, leaf, Pipe::new(PipeId::new(i), Meters(length)));
    }
    network
}

/// A fully sized four-node line `0 - 1 - 2 - 3`: 100 m PE100 pipes, 63 mm
/// bore, demands 10 m³/day on every non-source node.
pub fn sized_line_network() -> Network {
    let mut network = line_street(&[100.0, 100.0, 100.0], &[0.0, 10.0, 10.0, 10.0]);
    for edge in network.graph.edge_indices() {
        let pipe = &mut network.graph[edge];
        pipe.diameter = Millimeters(63.0);
        pipe.wall_thickness = Millimeters(3.8);
        pipe.material = Material::Pe100;
        pipe.age_years = 0.0;
        pipe.flow = Some(CubicMetersPerDay(10.0));
    }
    network
}
