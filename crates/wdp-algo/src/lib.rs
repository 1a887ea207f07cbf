//! # wdp-algo: Planning Algorithms for Reclaimed-Water Networks
//!
//! This crate provides the planning pipeline that turns an annotated street
//! graph into a budget-constrained reclaimed-water distribution design:
//! greedy budgeted growth, pipe/valve/tank sizing, resilience augmentation,
//! and Monte-Carlo availability analysis.
//!
//! ## Growth variants
//!
//! One parameterized [`NetworkBuilder`] covers the four planning variants:
//!
//! | Variant | Resilience | Hydraulic check |
//! |---------|------------|-----------------|
//! | `BuilderConfig::lb` | no | no |
//! | `BuilderConfig::lb_hydro` | no | yes |
//! | `BuilderConfig::lbr` | k = 2 secondary paths | no |
//! | `BuilderConfig::lbr_hydro` | k = 2 secondary paths | yes |
//!
//! ## Pipeline
//!
//! - [`PrecomputedBundle`]: all-pairs shortest paths, downstream-demand sums
//! - [`sizing`]: the two cost estimators (flow aggregation and the
//!   speed-band sizer) over the construction catalogues
//! - [`HydraulicProbe`]: the seam to an external EPANET-class solver
//! - [`NetworkBuilder`]: the budgeted admission loop
//! - [`ResilienceAugmenter`]: post-hoc edge-disjoint secondary paths
//! - [`availability`]: correlated pipe-failure sampling over isolation
//!   segments
//! - [`Planner`]: the end-to-end orchestrator
//!
//! ## Example
//!
//! ```ignore
//! use wdp_algo::{CancelToken, PlanConfig, Planner};
//! use wdp_core::NodeId;
//!
//! let street = wdp_io::import_street_graph("girona.json")?;
//! let config = PlanConfig::new(2_000_000.0, NodeId::new(1810));
//! let outcome = Planner::new(config).run(&street, &CancelToken::new())?;
//! println!("served {:.1}%", outcome.report.build.percent_served);
//! ```

pub mod augment;
pub mod availability;
pub mod builder;
pub mod candidate;
pub mod planner;
pub mod precompute;
pub mod probe;
pub mod sizing;
pub mod test_utils;

pub use augment::{AugmentConfig, AugmentOutcome, AugmentReport, ResilienceAugmenter};
pub use availability::{
    failure_probability, isolation_segments, normalize_pipe, AvailabilityConfig,
    AvailabilityModel, AvailabilityReport,
};
pub use builder::{
    BuildOutcome, BuildReport, BuilderConfig, CancelToken, NetworkBuilder, Resilience, SpeedBand,
    StopReason,
};
pub use candidate::CandidateNetwork;
pub use planner::{PlanConfig, PlanOutcome, PlanReport, Planner};
pub use precompute::{edge_key, path_edge_keys, EdgeKey, PrecomputedBundle};
pub use probe::{
    HydraulicProbe, HydraulicReport, LinkHydraulics, NodeHydraulics, ProbeLimits,
    StaticVerdictProbe,
};
pub use sizing::{
    aggregate_sizing, apply_sizing, speed_band_sizing, CostBreakdown, EdgeSizing, SizingResult,
};
