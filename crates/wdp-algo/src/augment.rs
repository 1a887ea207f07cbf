//! Post-hoc resilience augmentation of a built network.
//!
//! Takes a feasible network and, under its own budget, keeps attaching
//! edge-disjoint secondary paths for the served demand nodes until no
//! candidate admits. Existing pipes keep their diameters; only new pipes and
//! the network-wide valve refresh are billed.

use crate::builder::{relaxed_speed_sizing, CancelToken, SpeedBand, StopReason};
use crate::candidate::CandidateNetwork;
use crate::precompute::{path_edge_keys, EdgeKey, PrecomputedBundle};
use crate::probe::{HydraulicProbe, HydraulicReport};
use crate::sizing::{apply_sizing, minimum_path_cost, SizingResult, Subnetwork};
use hashbrown::{HashMap, HashSet};
use petgraph::graph::{EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Instant;
use tracing::debug;
use wdp_core::units::CubicMetersPerDay;
use wdp_core::{graph_utils, Euros, Network, NodeId, WdpError, WdpResult};

fn default_failure_rate() -> f64 {
    0.4
}

/// Configuration of one augmentation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentConfig {
    /// Augmentation budget (€), separate from the construction budget
    pub budget: f64,
    #[serde(default)]
    pub speed_band: SpeedBand,
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,
}

/// Result fields of an augmentation run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AugmentReport {
    /// Newly added pipes, as junction-id pairs
    pub new_pipes: Vec<(NodeId, NodeId)>,
    pub pipe_length_meters: f64,
    pub failure_rate: f64,
    pub tank_capacity_m3: f64,
    pub runtime_seconds: f64,
    pub cost_eur: f64,
    pub remaining_budget_eur: f64,
    pub stop_reason: StopReason,
}

/// A finished augmentation run.
#[derive(Debug)]
pub struct AugmentOutcome {
    pub network: Network,
    pub candidate: CandidateNetwork,
    pub sizing: Option<SizingResult>,
    pub hydraulics: Option<HydraulicReport>,
    pub report: AugmentReport,
}

struct AltCandidate {
    terminal: NodeIndex,
    primary: Vec<NodeIndex>,
    alt: Vec<NodeIndex>,
    profit: f64,
}

/// Adds edge-disjoint secondary paths to an existing network.
pub struct ResilienceAugmenter<'a> {
    street: &'a Network,
    bundle: &'a PrecomputedBundle,
    config: AugmentConfig,
    probe: Option<&'a dyn HydraulicProbe>,
}

impl<'a> ResilienceAugmenter<'a> {
    pub fn new(street: &'a Network, bundle: &'a PrecomputedBundle, config: AugmentConfig) -> Self {
        Self {
            street,
            bundle,
            config,
            probe: None,
        }
    }

    pub fn with_probe(mut self, probe: &'a dyn HydraulicProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Augment the network described by `base` (edge set bookkeeping) and
    /// `base_sizing` (the diameters its pipes keep).
    pub fn run(
        &self,
        base: &CandidateNetwork,
        base_sizing: &SizingResult,
        cancel: &CancelToken,
    ) -> WdpResult<AugmentOutcome> {
        let started = Instant::now();
        if self.config.budget <= 0.0 {
            return Err(WdpError::InvalidInput(format!(
                "augmentation budget must be positive, got {}",
                self.config.budget
            )));
        }
        let budget = Euros(self.config.budget);
        let source = base.source();

        // Pipes of the incoming network keep their diameters for good.
        let presets: HashMap<EdgeKey, f64> = base_sizing
            .edges
            .iter()
            .map(|(&key, edge)| (key, edge.diameter))
            .collect();

        let critical: HashSet<EdgeKey> = graph_utils::critical_edges(self.street)
            .into_iter()
            .map(|e| {
                let (a, b) = self.street.graph.edge_endpoints(e).expect("edge endpoints");
                crate::precompute::edge_key(a, b)
            })
            .collect();

        let mut cand = base.clone();
        let mut remaining: Vec<NodeIndex> = cand.demand_nodes_sorted();
        let mut remaining_budget = budget;
        let mut last_sizing: Option<SizingResult> = None;
        let mut last_hydraulics: Option<HydraulicReport> = None;
        let mut new_pipes: Vec<EdgeKey> = Vec::new();

        let stop_reason = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if remaining.is_empty() {
                break StopReason::AllDemandServed;
            }

            let sub = Subnetwork::from_edges(self.bundle, cand.edges_sorted());
            let no_removals = HashSet::new();

            let mut candidates: Vec<AltCandidate> = Vec::new();
            let mut pruned_on_budget = false;
            for &v in &remaining {
                let Some(primary) = sub.shortest_path(self.bundle, source, v, &no_removals) else {
                    continue;
                };
                // Only non-bridge primary edges leave the residual; removing
                // a bridge would make the secondary search fail for the
                // wrong reason.
                let banned: std::collections::HashSet<EdgeIndex> = path_edge_keys(&primary)
                    .into_iter()
                    .filter(|key| !critical.contains(key))
                    .filter_map(|(a, b)| {
                        self.street
                            .pipe_between(NodeIndex::new(a), NodeIndex::new(b))
                    })
                    .collect();
                let Some((alt, alt_length)) =
                    graph_utils::shortest_path_avoiding(self.street, source, v, &banned)
                else {
                    continue;
                };
                if alt_length <= 0.0 {
                    continue;
                }
                if minimum_path_cost(alt_length).value() >= remaining_budget.value() {
                    pruned_on_budget = true;
                    continue;
                }
                let alt_demand: f64 = alt
                    .iter()
                    .skip(1)
                    .map(|&n| self.bundle.demand(n))
                    .sum();
                candidates.push(AltCandidate {
                    terminal: v,
                    primary,
                    alt,
                    profit: alt_demand / alt_length,
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

            let mut admitted = false;
            let mut rejected_on_cost = false;
            for candidate in &candidates {
                let mut new_edges: Vec<EdgeKey> = Vec::new();
                for key in path_edge_keys(&candidate.alt) {
                    if cand.insert_edge(key) {
                        new_edges.push(key);
                    }
                }
                if new_edges.is_empty() {
                    // The alternate already exists; the node is covered.
                    remaining.retain(|v| *v != candidate.terminal);
                    continue;
                }

                let mut consumer_demand: f64 = cand
                    .demand_nodes_sorted()
                    .iter()
                    .map(|&n| self.bundle.demand(n))
                    .sum();
                for &n in &candidate.alt {
                    if n != source && self.bundle.demand(n) > 0.0 && !cand.contains_node(n) {
                        consumer_demand += self.bundle.demand(n);
                    }
                }

                let sized = relaxed_speed_sizing(
                    self.street,
                    self.bundle,
                    &cand.edges_sorted(),
                    source,
                    CubicMetersPerDay(consumer_demand),
                    self.config.speed_band,
                    Some(&presets),
                    self.probe,
                );

                match sized {
                    Err(err) => {
                        for key in new_edges {
                            cand.remove_edge(key);
                        }
                        debug!(
                            terminal = %self.street.graph[candidate.terminal].id,
                            error = %err,
                            "secondary path rejected as infeasible"
                        );
                    }
                    Ok((sizing, hydraulics)) => {
                        let cost = sizing.total_cost();
                        if cost.value() <= remaining_budget.value() {
                            for &n in &candidate.alt {
                                if self.bundle.demand(n) > 0.0 && n != source {
                                    cand.add_demand_node(n);
                                } else {
                                    cand.add_node(n);
                                }
                            }
                            remaining.retain(|v| {
                                !candidate.primary.contains(v) && !candidate.alt.contains(v)
                            });
                            remaining_budget = Euros(budget.value() - cost.value());
                            new_pipes.extend(new_edges.iter().copied());
                            debug!(
                                terminal = %self.street.graph[candidate.terminal].id,
                                cost_eur = cost.value(),
                                remaining_eur = remaining_budget.value(),
                                "secondary path committed"
                            );
                            last_sizing = Some(sizing);
                            last_hydraulics = hydraulics;
                            admitted = true;
                            break;
                        } else {
                            for key in new_edges {
                                cand.remove_edge(key);
                            }
                            rejected_on_cost = true;
                        }
                    }
                }
            }

            if !admitted && remaining.is_empty() {
                break StopReason::AllDemandServed;
            }
            if !admitted {
                break if rejected_on_cost || pruned_on_budget {
                    StopReason::BudgetExhausted
                } else {
                    StopReason::NoFeasibleCandidate
                };
            }
        };

        let (network, sizing) = match last_sizing {
            Some(sizing) => {
                let full = apply_sizing(self.street, &sizing);
                (graph_utils::largest_component(&full), Some(sizing))
            }
            None => {
                let full = apply_sizing(self.street, base_sizing);
                (graph_utils::largest_component(&full), None)
            }
        };

        let pipe_length = network.total_pipe_length();
        let edge_count = network.graph.edge_count();
        let failure_rate = if edge_count > 0 {
            100.0 * (self.config.failure_rate / 12.0) * pipe_length.to_kilometers()
                / edge_count as f64
        } else {
            0.0
        };

        let mut new_pipe_ids: Vec<(NodeId, NodeId)> = new_pipes
            .iter()
            .map(|&(a, b)| {
                (
                    self.street.graph[NodeIndex::new(a)].id,
                    self.street.graph[NodeIndex::new(b)].id,
                )
            })
            .collect();
        new_pipe_ids.sort_unstable();

        let report = AugmentReport {
            new_pipes: new_pipe_ids,
            pipe_length_meters: pipe_length.value(),
            failure_rate,
            tank_capacity_m3: sizing
                .as_ref()
                .map(|s| s.tank_capacity)
                .unwrap_or(base_sizing.tank_capacity),
            runtime_seconds: started.elapsed().as_secs_f64(),
            cost_eur: budget.value() - remaining_budget.value(),
            remaining_budget_eur: remaining_budget.value(),
            stop_reason,
        };

        Ok(AugmentOutcome {
            network,
            candidate: cand,
            sizing,
            hydraulics: last_hydraulics,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuilderConfig, NetworkBuilder};
    use crate::test_utils::triangle_street;

    #[test]
    fn test_augmenting_a_tree_closes_the_loop() {
        // Build without resilience on a triangle: the tree 0-1, 1-2 wins.
        let street = triangle_street(&[100.0, 90.0, 100.0], &[0.0, 5.0, 5.0]);
        let bundle = PrecomputedBundle::compute(&street).unwrap();
        let config = BuilderConfig::lb(300_000.0, NodeId::new(0));
        let built = NetworkBuilder::new(&street, &bundle, config)
            .run(&CancelToken::new())
            .unwrap();
        assert_eq!(built.network.graph.edge_count(), 2);

        let augmenter = ResilienceAugmenter::new(
            &street,
            &bundle,
            AugmentConfig {
                budget: 50_000.0,
                speed_band: SpeedBand::default(),
                failure_rate: 0.4,
            },
        );
        let outcome = augmenter
            .run(
                &built.candidate,
                built.sizing.as_ref().unwrap(),
                &CancelToken::new(),
            )
            .unwrap();

        // The third street edge comes in as a secondary path.
        assert_eq!(outcome.network.graph.edge_count(), 3);
        assert_eq!(outcome.report.new_pipes.len(), 1);
        assert!(outcome.report.cost_eur > 0.0);
        assert!(outcome.report.cost_eur <= 50_000.0);
    }

    #[test]
    fn test_augmenter_rejects_non_positive_budget() {
        let street = triangle_street(&[100.0, 100.0, 100.0], &[0.0, 5.0, 5.0]);
        let bundle = PrecomputedBundle::compute(&street).unwrap();
        let built = NetworkBuilder::new(&street, &bundle, BuilderConfig::lb(300_000.0, NodeId::new(0)))
            .run(&CancelToken::new())
            .unwrap();

        let augmenter = ResilienceAugmenter::new(
            &street,
            &bundle,
            AugmentConfig {
                budget: 0.0,
                speed_band: SpeedBand::default(),
                failure_rate: 0.4,
            },
        );
        assert!(matches!(
            augmenter.run(
                &built.candidate,
                built.sizing.as_ref().unwrap(),
                &CancelToken::new()
            ),
            Err(WdpError::InvalidInput(_))
        ));
    }
}
