//! End-to-end planning runs.
//!
//! Sequences the pipeline: validate input, precompute the shortest-path
//! bundle, grow the network with the configured builder variant, optionally
//! augment it with secondary paths, then quantify availability on the final
//! sized network. All stages are synchronous; the bundle is computed once and
//! shared by reference.

use crate::augment::{AugmentConfig, AugmentReport, ResilienceAugmenter};
use crate::availability::{self, AvailabilityConfig, AvailabilityModel, AvailabilityReport};
use crate::builder::{
    BuildOutcome, BuildReport, BuilderConfig, CancelToken, NetworkBuilder, Resilience, SpeedBand,
};
use crate::precompute::PrecomputedBundle;
use crate::probe::{HydraulicProbe, HydraulicReport};
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use wdp_core::{Network, NodeId, WdpError, WdpResult};

fn default_failure_rate() -> f64 {
    0.4
}

fn default_reps() -> usize {
    10_000
}

fn default_seed() -> u64 {
    42
}

/// Configuration of a full planning run. Serde-friendly so external callers
/// can pass it as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanConfig {
    /// Construction budget (€)
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
    /// Separate budget for the post-hoc resilience augmenter; absent skips it
    #[serde(default)]
    pub augment_budget: Option<f64>,
    #[serde(default = "default_reps")]
    pub monte_carlo_reps: usize,
    #[serde(default = "default_seed")]
    pub rng_seed: u64,
    #[serde(default)]
    pub availability_model: AvailabilityModel,
}

impl PlanConfig {
    pub fn new(budget: f64, source: NodeId) -> Self {
        Self {
            budget,
            source,
            resilience: Resilience::None,
            hydraulic_check: false,
            speed_band: SpeedBand::default(),
            failure_rate: default_failure_rate(),
            augment_budget: None,
            monte_carlo_reps: default_reps(),
            rng_seed: default_seed(),
            availability_model: AvailabilityModel::default(),
        }
    }

    fn builder_config(&self) -> BuilderConfig {
        BuilderConfig {
            budget: self.budget,
            source: self.source,
            resilience: self.resilience,
            hydraulic_check: self.hydraulic_check,
            speed_band: self.speed_band,
            failure_rate: self.failure_rate,
        }
    }
}

/// The full report bundle of a planning run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReport {
    pub build: BuildReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub augment: Option<AugmentReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<AvailabilityReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hydraulics: Option<HydraulicReport>,
}

/// A finished planning run: the final sized network and its report bundle.
#[derive(Debug)]
pub struct PlanOutcome {
    pub network: Network,
    pub report: PlanReport,
}

/// Orchestrates precompute, growth, augmentation and availability.
pub struct Planner<'a> {
    config: PlanConfig,
    probe: Option<&'a dyn HydraulicProbe>,
}

impl<'a> Planner<'a> {
    pub fn new(config: PlanConfig) -> Self {
        Self {
            config,
            probe: None,
        }
    }

    /// Wire up the external hydraulic solver consulted when
    /// `hydraulic_check` is on (and by the augmenter).
    pub fn with_probe(mut self, probe: &'a dyn HydraulicProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn run(&self, street: &Network, cancel: &CancelToken) -> WdpResult<PlanOutcome> {
        let bundle = PrecomputedBundle::compute(street)?;
        info!(
            nodes = bundle.node_count(),
            consumers = bundle.demand_nodes().len(),
            total_demand = bundle.total_demand(),
            "precomputed shortest-path bundle"
        );

        let mut builder = NetworkBuilder::new(street, &bundle, self.config.builder_config());
        if let Some(probe) = self.probe {
            builder = builder.with_probe(probe);
        }
        let BuildOutcome {
            mut network,
            candidate,
            sizing,
            mut hydraulics,
            report: build_report,
        } = builder.run(cancel)?;
        info!(
            served = build_report.consumption_nodes.len(),
            percent = build_report.percent_served,
            cost_eur = build_report.cost_eur,
            stop = ?build_report.stop_reason,
            "growth finished"
        );

        let augment_report = match (self.config.augment_budget, &sizing) {
            (Some(budget), Some(base_sizing)) => {
                let mut augmenter = ResilienceAugmenter::new(
                    street,
                    &bundle,
                    AugmentConfig {
                        budget,
                        speed_band: self.config.speed_band,
                        failure_rate: self.config.failure_rate,
                    },
                );
                if let Some(probe) = self.probe {
                    augmenter = augmenter.with_probe(probe);
                }
                let outcome = augmenter.run(&candidate, base_sizing, cancel)?;
                info!(
                    new_pipes = outcome.report.new_pipes.len(),
                    cost_eur = outcome.report.cost_eur,
                    "augmentation finished"
                );
                network = outcome.network;
                if outcome.hydraulics.is_some() {
                    hydraulics = outcome.hydraulics;
                }
                Some(outcome.report)
            }
            (Some(_), None) => {
                warn!("skipping augmentation: the growth phase built no pipes");
                None
            }
            (None, _) => None,
        };

        // Availability runs against the final network, checking the served
        // consumers that survive in it.
        let check_nodes: Vec<NodeIndex> = network
            .demand_nodes()
            .into_iter()
            .filter(|&n| network.graph[n].id != self.config.source)
            .collect();
        let availability_report = if check_nodes.is_empty() {
            warn!("skipping availability: no served demand nodes");
            None
        } else {
            let source_idx = network.node_index(self.config.source).ok_or_else(|| {
                WdpError::InvalidInput("source fell outside the built network".into())
            })?;
            let failure_rate = match self.config.availability_model {
                // The legacy weighting consumes the built network's failure
                // incidence percentage; the final network's when augmented.
                AvailabilityModel::Legacy => augment_report
                    .as_ref()
                    .map(|r| r.failure_rate)
                    .unwrap_or(build_report.failure_rate),
                // The current weighting consumes the per-km baseline.
                AvailabilityModel::Current => self.config.failure_rate,
            };
            let config = AvailabilityConfig {
                repetitions: self.config.monte_carlo_reps,
                seed: self.config.rng_seed,
                model: self.config.availability_model,
                failure_rate,
            };
            Some(availability::evaluate(
                &network,
                source_idx,
                &check_nodes,
                &config,
                hydraulics.as_ref(),
            )?)
        };

        Ok(PlanOutcome {
            network,
            report: PlanReport {
                build: build_report,
                augment: augment_report,
                availability: availability_report,
                hydraulics,
            },
        })
    }
}
