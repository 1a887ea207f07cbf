//! External hydraulic probe interface.
//!
//! The planner does not solve hydraulics. It hands a sized network to an
//! opaque collaborator (an EPANET-class solver behind this trait) and
//! consumes per-node pressure/supplied-demand, per-link flow/velocity, and a
//! pass/fail verdict. A failed or unreachable probe rejects the current
//! candidate only; the growth loop continues.

use serde::Serialize;
use std::collections::HashMap;
use wdp_core::catalog::TankTier;
use wdp_core::{Network, NodeId, NodeIndex, WdpResult};

/// Verdict limits the probe applies to a sized network.
pub struct ProbeLimits;

impl ProbeLimits {
    /// Minimum service pressure (m of head)
    pub const MIN_PRESSURE_M: f64 = 15.0;
    /// Maximum service pressure (m of head)
    pub const MAX_PRESSURE_M: f64 = 60.0;
    /// Maximum pipe velocity (m/s)
    pub const MAX_VELOCITY_MS: f64 = 1.2;
}

/// Steady-state results for one junction.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct NodeHydraulics {
    /// Demand actually supplied (m³/day)
    pub supplied: f64,
    /// Hydraulic head (m)
    pub head: f64,
    /// Pressure (m)
    pub pressure: f64,
}

/// Steady-state results for one pipe.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LinkHydraulics {
    pub from: NodeId,
    pub to: NodeId,
    /// Signed flow (m³/day); positive runs from `from` to `to`
    pub flow: f64,
    /// Velocity magnitude (m/s)
    pub velocity: f64,
    /// Head loss per 1000 m
    pub headloss: f64,
}

/// Full probe output for one sized network.
#[derive(Debug, Clone, Serialize)]
pub struct HydraulicReport {
    pub nodes: HashMap<NodeId, NodeHydraulics>,
    pub links: Vec<LinkHydraulics>,
    /// True iff no node had reduced demand, pressures stayed within
    /// [`ProbeLimits::MIN_PRESSURE_M`, `ProbeLimits::MAX_PRESSURE_M`] and no
    /// velocity exceeded [`ProbeLimits::MAX_VELOCITY_MS`].
    pub success: bool,
    pub min_pressure: f64,
    pub max_pressure: f64,
    pub max_velocity: f64,
    /// Number of junctions whose demand was reduced
    pub nodes_with_reduced_demand: usize,
}

impl HydraulicReport {
    /// Signed flow on the link between two junction ids, if the probe
    /// reported one. Sign is relative to the `(from, to)` query order.
    pub fn link_flow(&self, from: NodeId, to: NodeId) -> Option<f64> {
        self.links.iter().find_map(|l| {
            if l.from == from && l.to == to {
                Some(l.flow)
            } else if l.from == to && l.to == from {
                Some(-l.flow)
            } else {
                None
            }
        })
    }
}

/// An external steady-state hydraulic solver.
///
/// Implementations receive a sized network (every pipe carries a diameter and
/// a design flow), the selected tank tier at the source, and the source node.
pub trait HydraulicProbe {
    fn evaluate(
        &self,
        network: &Network,
        tank: &TankTier,
        source: NodeIndex,
    ) -> WdpResult<HydraulicReport>;
}

/// Probe returning a fixed verdict with flows copied from the sizer.
///
/// Stands in where no external solver is wired up: tests, and builds where
/// the speed-band envelope alone is trusted. Reported flows follow the
/// sizer's assignments, pressures sit mid-band, so segment derivation and
/// report plumbing stay exercised.
pub struct StaticVerdictProbe {
    success: bool,
}

impl StaticVerdictProbe {
    /// A probe that accepts every sized network.
    pub fn accepting() -> Self {
        Self { success: true }
    }

    /// A probe that rejects every sized network.
    pub fn rejecting() -> Self {
        Self { success: false }
    }
}

impl HydraulicProbe for StaticVerdictProbe {
    fn evaluate(
        &self,
        network: &Network,
        _tank: &TankTier,
        _source: NodeIndex,
    ) -> WdpResult<HydraulicReport> {
        let mid_pressure =
            (ProbeLimits::MIN_PRESSURE_M + ProbeLimits::MAX_PRESSURE_M) / 2.0;
        let mut nodes = HashMap::new();
        for idx in network.graph.node_indices() {
            let junction = &network.graph[idx];
            nodes.insert(
                junction.id,
                NodeHydraulics {
                    supplied: if self.success {
                        junction.demand.value()
                    } else {
                        0.0
                    },
                    head: junction.elevation.value() + mid_pressure,
                    pressure: mid_pressure,
                },
            );
        }

        let mut links = Vec::with_capacity(network.graph.edge_count());
        let mut max_velocity: f64 = 0.0;
        for edge in network.graph.edge_indices() {
            let (a, b) = network.graph.edge_endpoints(edge).expect("edge endpoints");
            let pipe = &network.graph[edge];
            let flow = pipe.flow.map(|f| f.value()).unwrap_or(0.0);
            let velocity = if pipe.diameter.value() > 0.0 {
                crate::sizing::flow_speed(
                    wdp_core::units::CubicMetersPerDay(flow),
                    pipe.diameter.value(),
                )
            } else {
                0.0
            };
            max_velocity = max_velocity.max(velocity);
            links.push(LinkHydraulics {
                from: network.graph[a].id,
                to: network.graph[b].id,
                flow,
                velocity,
                headloss: 0.0,
            });
        }

        Ok(HydraulicReport {
            nodes,
            links,
            success: self.success,
            min_pressure: mid_pressure,
            max_pressure: mid_pressure,
            max_velocity,
            nodes_with_reduced_demand: 0,
        })
    }
}
