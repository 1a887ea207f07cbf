//! Greedy budgeted network growth.
//!
//! One parameterized loop covers the four planning variants: plain
//! cost-driven growth, growth under an external hydraulic check, and both
//! again with two-edge-connected resilience. Each iteration attaches the
//! most profitable remaining consumer through its best shortest path,
//! admitting the candidate only while the whole sized network stays within
//! budget.
//!
//! Candidate ordering is deterministic: profit descending, ties broken on
//! terminal node id. Tentative edge additions are rolled back exactly on
//! rejection, and a cooperative cancellation token is honored at the top of
//! every iteration.

use crate::candidate::CandidateNetwork;
use crate::precompute::{path_edge_keys, EdgeKey, PrecomputedBundle};
use crate::probe::{HydraulicProbe, HydraulicReport};
use crate::sizing::{
    aggregate_sizing, apply_sizing, minimum_path_cost, speed_band_sizing, SizingResult,
};
use hashbrown::HashSet;
use petgraph::graph::{EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use wdp_core::catalog::tank_tier_for;
use wdp_core::units::CubicMetersPerDay;
use wdp_core::{graph_utils, Euros, Network, NodeId, WdpError, WdpResult};

/// Resilience target of a planning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resilience {
    /// Tree-like growth, no secondary paths
    #[default]
    None,
    /// Attach an edge-disjoint secondary path per admitted candidate
    K2,
}

/// Target flow-speed band for the hydraulic sizer, with its relaxation floor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpeedBand {
    pub min: f64,
    pub max: f64,
    /// Lowest `min` the relaxation loop may reach
    pub floor: f64,
    /// Decrement applied to `min` after each failed probe round
    pub step: f64,
}

impl Default for SpeedBand {
    fn default() -> Self {
        Self {
            min: 0.6,
            max: 1.0,
            floor: 0.4,
            step: 0.05,
        }
    }
}

fn default_failure_rate() -> f64 {
    0.4
}

/// Configuration of one growth run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Total construction budget (€)
    pub budget: f64,
    /// Treatment-plant node id
    pub source: NodeId,
    #[serde(default)]
    pub resilience: Resilience,
    #[serde(default)]
    pub hydraulic_check: bool,
    #[serde(default)]
    pub speed_band: SpeedBand,
    /// Pipe failure incidence (failures per km per year)
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,
}

impl BuilderConfig {
    fn variant(budget: f64, source: NodeId, resilience: Resilience, hydraulic: bool) -> Self {
        Self {
            budget,
            source,
            resilience,
            hydraulic_check: hydraulic,
            speed_band: SpeedBand::default(),
            failure_rate: default_failure_rate(),
        }
    }

    /// Plain cost-driven growth.
    pub fn lb(budget: f64, source: NodeId) -> Self {
        Self::variant(budget, source, Resilience::None, false)
    }

    /// Cost-driven growth under the external hydraulic check.
    pub fn lb_hydro(budget: f64, source: NodeId) -> Self {
        Self::variant(budget, source, Resilience::None, true)
    }

    /// Growth with edge-disjoint secondary paths.
    pub fn lbr(budget: f64, source: NodeId) -> Self {
        Self::variant(budget, source, Resilience::K2, false)
    }

    /// Secondary paths plus the external hydraulic check.
    pub fn lbr_hydro(budget: f64, source: NodeId) -> Self {
        Self::variant(budget, source, Resilience::K2, true)
    }
}

/// Why a growth run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    AllDemandServed,
    BudgetExhausted,
    NoFeasibleCandidate,
    Cancelled,
    InvalidInput,
}

/// Cooperative cancellation flag, checked at the top of each outer iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::Relaxed)
    }
}

/// Result fields of a growth run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub added_nodes: Vec<NodeId>,
    pub consumption_nodes: Vec<NodeId>,
    /// Demand served by the network (m³/day)
    pub total_consumption: f64,
    /// Share of city-wide demand served, percent rounded to one decimal
    pub percent_served: f64,
    pub pipe_length_meters: f64,
    pub tank_capacity_m3: f64,
    pub tank_capacity_exceeded: bool,
    /// Pipe-failure incidence of the built network (percent per year)
    pub failure_rate: f64,
    pub runtime_seconds: f64,
    pub cost_eur: f64,
    pub remaining_budget_eur: f64,
    pub stop_reason: StopReason,
    pub partial: bool,
}

/// A finished growth run: the sized network plus its report.
#[derive(Debug)]
pub struct BuildOutcome {
    /// Largest connected component of the grown subgraph, pipes sized
    pub network: Network,
    /// Street-space bookkeeping, consumed by the resilience augmenter
    pub candidate: CandidateNetwork,
    pub sizing: Option<SizingResult>,
    pub hydraulics: Option<HydraulicReport>,
    pub report: BuildReport,
}

struct Candidate {
    terminal: NodeIndex,
    anchor: NodeIndex,
    profit: f64,
    length: f64,
}

enum Admission {
    Committed { cost: Euros },
    RejectedCost,
    RejectedInfeasible,
}

/// The budgeted growth loop.
pub struct NetworkBuilder<'a> {
    street: &'a Network,
    bundle: &'a PrecomputedBundle,
    config: BuilderConfig,
    probe: Option<&'a dyn HydraulicProbe>,
}

impl<'a> NetworkBuilder<'a> {
    pub fn new(street: &'a Network, bundle: &'a PrecomputedBundle, config: BuilderConfig) -> Self {
        Self {
            street,
            bundle,
            config,
            probe: None,
        }
    }

    /// Wire up the external hydraulic solver used when `hydraulic_check` is
    /// on.
    pub fn with_probe(mut self, probe: &'a dyn HydraulicProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn run(&self, cancel: &CancelToken) -> WdpResult<BuildOutcome> {
        let started = Instant::now();

        let source = self.street.node_index(self.config.source).ok_or_else(|| {
            WdpError::InvalidInput(format!("source node {} not in graph", self.config.source))
        })?;
        if self.config.budget <= 0.0 {
            return Err(WdpError::InvalidInput(format!(
                "budget must be positive, got {}",
                self.config.budget
            )));
        }
        let budget = Euros(self.config.budget);

        // Bridges of the street graph: deleting one to search a secondary
        // path would spuriously disconnect the residual, so they are never
        // part of the temporary deletion set.
        let critical: HashSet<EdgeKey> = if self.config.resilience == Resilience::K2 {
            graph_utils::critical_edges(self.street)
                .into_iter()
                .map(|e| {
                    let (a, b) = self.street.graph.edge_endpoints(e).expect("edge endpoints");
                    crate::precompute::edge_key(a, b)
                })
                .collect()
        } else {
            HashSet::new()
        };

        let mut remaining: Vec<NodeIndex> = self
            .bundle
            .demand_nodes()
            .iter()
            .copied()
            .filter(|&n| n != source)
            .collect();
        let mut cand = CandidateNetwork::new(source, budget);
        let mut last_sizing: Option<SizingResult> = None;
        let mut last_hydraulics: Option<HydraulicReport> = None;
        let mut partial = false;

        let stop_reason = loop {
            if cancel.is_cancelled() {
                partial = true;
                break StopReason::Cancelled;
            }
            if remaining.is_empty() {
                break StopReason::AllDemandServed;
            }

            let mut added_sorted = cand.nodes_sorted();
            added_sorted.sort_by_key(|&n| self.street.graph[n].id);

            let mut candidates = Vec::new();
            let mut pruned_on_budget = false;
            for &v in &remaining {
                let mut best: Option<(f64, NodeIndex)> = None;
                for &u in &added_sorted {
                    let d = self.bundle.path_length(u, v);
                    if best.map_or(true, |(len, _)| d < len) {
                        best = Some((d, u));
                    }
                }
                let Some((length, anchor)) = best else {
                    continue;
                };
                if !length.is_finite() {
                    continue;
                }
                if minimum_path_cost(length).value() >= cand.remaining_budget().value() {
                    pruned_on_budget = true;
                    continue;
                }
                let downstream = self.bundle.downstream_demand(anchor, v);
                let divisor = match self.config.resilience {
                    Resilience::None => length,
                    // The secondary path roughly doubles the pipe run.
                    Resilience::K2 => 2.0 * length,
                };
                candidates.push(Candidate {
                    terminal: v,
                    anchor,
                    profit: downstream / divisor,
                    length,
                });
            }
            candidates.sort_by(|a, b| {
                b.profit
                    .partial_cmp(&a.profit)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| {
                        self.street.graph[a.terminal]
                            .id
                            .cmp(&self.street.graph[b.terminal].id)
                    })
            });

            if candidates.is_empty() {
                break if pruned_on_budget {
                    StopReason::BudgetExhausted
                } else {
                    StopReason::NoFeasibleCandidate
                };
            }

            let total_candidates = candidates.len();
            let mut admitted = false;
            let mut rejected_on_cost = false;
            for (i, candidate) in candidates.iter().enumerate() {
                match self.try_admit(
                    candidate,
                    source,
                    budget,
                    &critical,
                    &mut cand,
                    &mut remaining,
                    &mut last_sizing,
                    &mut last_hydraulics,
                )? {
                    Admission::Committed { cost } => {
                        debug!(
                            candidate = i + 1,
                            of = total_candidates,
                            terminal = %self.street.graph[candidate.terminal].id,
                            length_m = candidate.length,
                            cost_eur = cost.value(),
                            remaining_eur = cand.remaining_budget().value(),
                            "candidate committed"
                        );
                        admitted = true;
                        break;
                    }
                    Admission::RejectedCost => rejected_on_cost = true,
                    Admission::RejectedInfeasible => {}
                }
            }

            if !admitted {
                debug!("no admissible candidate left");
                break if rejected_on_cost || pruned_on_budget {
                    StopReason::BudgetExhausted
                } else {
                    StopReason::NoFeasibleCandidate
                };
            }
        };

        Ok(self.finalize(
            source,
            budget,
            cand,
            last_sizing,
            last_hydraulics,
            stop_reason,
            partial,
            started,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn try_admit(
        &self,
        candidate: &Candidate,
        source: NodeIndex,
        budget: Euros,
        critical: &HashSet<EdgeKey>,
        cand: &mut CandidateNetwork,
        remaining: &mut Vec<NodeIndex>,
        last_sizing: &mut Option<SizingResult>,
        last_hydraulics: &mut Option<HydraulicReport>,
    ) -> WdpResult<Admission> {
        let path = self.bundle.path(candidate.anchor, candidate.terminal);

        let mut new_edges: Vec<EdgeKey> = Vec::new();
        for key in path_edge_keys(&path) {
            if cand.insert_edge(key) {
                new_edges.push(key);
            }
        }

        // Secondary edge-disjoint path, searched in the residual street
        // graph with the primary's non-bridge edges excluded.
        let mut second_path: Vec<NodeIndex> = Vec::new();
        if self.config.resilience == Resilience::K2 {
            let banned: std::collections::HashSet<EdgeIndex> = path_edge_keys(&path)
                .into_iter()
                .filter(|key| !critical.contains(key))
                .filter_map(|(a, b)| {
                    self.street
                        .pipe_between(NodeIndex::new(a), NodeIndex::new(b))
                })
                .collect();
            match graph_utils::shortest_path_avoiding(
                self.street,
                candidate.anchor,
                candidate.terminal,
                &banned,
            ) {
                Some((alt, _)) => {
                    for key in path_edge_keys(&alt) {
                        if cand.insert_edge(key) {
                            new_edges.push(key);
                        }
                    }
                    second_path = alt;
                }
                None => {
                    debug!(
                        terminal = %self.street.graph[candidate.terminal].id,
                        "no edge-disjoint secondary path, attaching singly"
                    );
                }
            }
        }

        // Consumers of the tentative network: everything served so far plus
        // demand nodes on both new paths. The tank is sized to their sum.
        let mut consumer_set: HashSet<usize> = cand
            .demand_nodes_sorted()
            .iter()
            .map(|n| n.index())
            .collect();
        for &n in path.iter().chain(second_path.iter()) {
            if n != source && self.bundle.demand(n) > 0.0 {
                consumer_set.insert(n.index());
            }
        }
        let mut consumers: Vec<NodeIndex> =
            consumer_set.iter().map(|&n| NodeIndex::new(n)).collect();
        consumers.sort_by_key(|n| n.index());
        let total_demand: f64 = consumers.iter().map(|&n| self.bundle.demand(n)).sum();

        let sized = if self.config.hydraulic_check {
            self.size_with_probe(cand.edges_sorted(), source, CubicMetersPerDay(total_demand))
        } else {
            aggregate_sizing(
                self.bundle,
                cand.edges_sorted(),
                source,
                &consumers,
                CubicMetersPerDay(total_demand),
            )
            .map(|s| (s, None))
        };

        match sized {
            Err(err) => {
                for key in new_edges {
                    cand.remove_edge(key);
                }
                debug!(
                    terminal = %self.street.graph[candidate.terminal].id,
                    error = %err,
                    "candidate rejected as infeasible"
                );
                Ok(Admission::RejectedInfeasible)
            }
            Ok((sizing, hydraulics)) => {
                let cost = sizing.total_cost();
                if cost.value() <= budget.value() {
                    for &n in path.iter().chain(second_path.iter()) {
                        if self.bundle.demand(n) > 0.0 && n != source {
                            cand.add_demand_node(n);
                        } else {
                            cand.add_node(n);
                        }
                    }
                    remaining.retain(|v| !path.contains(v) && !second_path.contains(v));
                    cand.set_remaining_budget(Euros(budget.value() - cost.value()));
                    *last_sizing = Some(sizing);
                    *last_hydraulics = hydraulics;
                    Ok(Admission::Committed { cost })
                } else {
                    for key in new_edges {
                        cand.remove_edge(key);
                    }
                    debug!(
                        terminal = %self.street.graph[candidate.terminal].id,
                        cost_eur = cost.value(),
                        budget_eur = budget.value(),
                        "candidate rejected on cost"
                    );
                    Ok(Admission::RejectedCost)
                }
            }
        }
    }

    /// Speed-band sizing with the relaxation loop: `speed_min` walks down
    /// from the band minimum to its floor until the probe accepts.
    fn size_with_probe(
        &self,
        edges: Vec<EdgeKey>,
        source: NodeIndex,
        total_demand: CubicMetersPerDay,
    ) -> WdpResult<(SizingResult, Option<HydraulicReport>)> {
        relaxed_speed_sizing(
            self.street,
            self.bundle,
            &edges,
            source,
            total_demand,
            self.config.speed_band,
            None,
            self.probe,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn finalize(
        &self,
        source: NodeIndex,
        budget: Euros,
        cand: CandidateNetwork,
        sizing: Option<SizingResult>,
        hydraulics: Option<HydraulicReport>,
        stop_reason: StopReason,
        partial: bool,
        started: Instant,
    ) -> BuildOutcome {
        let network = match &sizing {
            Some(sizing) => {
                let full = apply_sizing(self.street, sizing);
                graph_utils::largest_component(&full)
            }
            None => {
                // Nothing admitted: the network is the bare plant.
                let mut network = Network::new();
                network.add_junction(self.street.graph[source].clone());
                network
            }
        };

        let total_consumption: f64 = cand
            .nodes_sorted()
            .iter()
            .map(|&n| self.bundle.demand(n))
            .sum();
        let percent_served = if self.bundle.total_demand() > 0.0 {
            (total_consumption / self.bundle.total_demand() * 1000.0).round() / 10.0
        } else {
            100.0
        };

        let pipe_length = network.total_pipe_length();
        let edge_count = network.graph.edge_count();
        let failure_rate = if edge_count > 0 {
            100.0 * (self.config.failure_rate / 12.0) * pipe_length.to_kilometers()
                / edge_count as f64
        } else {
            0.0
        };

        let report = BuildReport {
            added_nodes: cand
                .nodes_sorted()
                .iter()
                .map(|&n| self.street.graph[n].id)
                .collect(),
            consumption_nodes: cand
                .demand_nodes_sorted()
                .iter()
                .map(|&n| self.street.graph[n].id)
                .collect(),
            total_consumption,
            percent_served,
            pipe_length_meters: pipe_length.value(),
            tank_capacity_m3: sizing.as_ref().map(|s| s.tank_capacity).unwrap_or(0.0),
            tank_capacity_exceeded: sizing.as_ref().map(|s| s.tank_exceeded).unwrap_or(false),
            failure_rate,
            runtime_seconds: started.elapsed().as_secs_f64(),
            cost_eur: budget.value() - cand.remaining_budget().value(),
            remaining_budget_eur: cand.remaining_budget().value(),
            stop_reason,
            partial,
        };

        BuildOutcome {
            network,
            candidate: cand,
            sizing,
            hydraulics,
            report,
        }
    }
}

/// Speed-band sizing with verdict-driven relaxation, shared by the builder
/// and the resilience augmenter.
///
/// `speed_min` walks down from the band minimum to its floor; each sizing is
/// materialized and handed to the probe (when one is wired) until the verdict
/// passes. Probe errors and failed verdicts reject the current sizing only.
#[allow(clippy::too_many_arguments)]
pub(crate) fn relaxed_speed_sizing(
    street: &Network,
    bundle: &PrecomputedBundle,
    edges: &[EdgeKey],
    source: NodeIndex,
    total_demand: CubicMetersPerDay,
    band: SpeedBand,
    presets: Option<&hashbrown::HashMap<EdgeKey, f64>>,
    probe: Option<&dyn HydraulicProbe>,
) -> WdpResult<(SizingResult, Option<HydraulicReport>)> {
    let mut speed_min = band.min;
    let mut last_err: Option<WdpError> = None;

    while speed_min >= band.floor - 1e-9 {
        match speed_band_sizing(
            bundle,
            edges.iter().copied(),
            source,
            total_demand,
            speed_min,
            band.max,
            presets,
        ) {
            Ok(sizing) => match probe {
                None => return Ok((sizing, None)),
                Some(probe) => {
                    let network = apply_sizing(street, &sizing);
                    let (tank, _) = tank_tier_for(total_demand);
                    match probe.evaluate(&network, tank, source) {
                        Ok(report) if report.success => {
                            return Ok((sizing, Some(report)));
                        }
                        Ok(report) => {
                            debug!(
                                speed_min,
                                min_pressure = report.min_pressure,
                                max_velocity = report.max_velocity,
                                "probe rejected sizing, relaxing speed band"
                            );
                            last_err = Some(WdpError::ProbeFailure(format!(
                                "verdict failed at speed_min {speed_min:.2}"
                            )));
                        }
                        Err(err) => {
                            warn!(error = %err, "hydraulic probe unavailable");
                            last_err = Some(WdpError::ProbeFailure(err.to_string()));
                        }
                    }
                }
            },
            Err(err) => last_err = Some(err),
        }
        speed_min -= band.step;
    }

    Err(last_err.unwrap_or_else(|| {
        WdpError::HydraulicInfeasible("speed band exhausted without a feasible sizing".into())
    }))
}
