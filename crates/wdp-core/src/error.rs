//! Unified error types for the WDP ecosystem
//!
//! This module provides a common error type [`WdpError`] that can represent
//! errors from any part of the planner. Domain-specific failures (sizing,
//! hydraulic probing) have dedicated variants so callers can distinguish a
//! rejected candidate from an invalid planning request.
//!
//! # Example
//!
//! ```ignore
//! use wdp_core::{WdpError, WdpResult};
//!
//! fn plan_network(path: &str) -> WdpResult<()> {
//!     let network = load_network(path)?;
//!     run_planner(&network)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all WDP operations.
///
/// Per-candidate infeasibilities (`SizingInfeasible`, `HydraulicInfeasible`,
/// `ProbeFailure`) are local to the admission loop: the candidate is rejected
/// and the planner continues. Only `InvalidInput` aborts a planning run.
#[derive(Error, Debug)]
pub enum WdpError {
    /// The planning request itself is malformed: disconnected street graph,
    /// absent source node, negative demand, or non-positive budget.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The aggregation sizer could not assign a flow to every edge.
    #[error("Sizing infeasible: {0}")]
    SizingInfeasible(String),

    /// The speed-band sizer exhausted the catalogue without a feasible
    /// diameter, even at the relaxation floor.
    #[error("Hydraulic sizing infeasible: {0}")]
    HydraulicInfeasible(String),

    /// The external hydraulic probe failed or returned a non-success verdict.
    #[error("Hydraulic probe failure: {0}")]
    ProbeFailure(String),

    /// I/O errors (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using WdpError.
pub type WdpResult<T> = Result<T, WdpError>;

// Conversion from anyhow::Error
impl From<anyhow::Error> for WdpError {
    fn from(err: anyhow::Error) -> Self {
        WdpError::Other(err.to_string())
    }
}

// Conversion from string-like types for convenience
impl From<String> for WdpError {
    fn from(s: String) -> Self {
        WdpError::Other(s)
    }
}

impl From<&str> for WdpError {
    fn from(s: &str) -> Self {
        WdpError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WdpError::SizingInfeasible("edge (3, 4) has no flow".into());
        assert!(err.to_string().contains("Sizing infeasible"));
        assert!(err.to_string().contains("no flow"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let wdp_err: WdpError = io_err.into();
        assert!(matches!(wdp_err, WdpError::Io(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> WdpResult<()> {
            Err(WdpError::InvalidInput("budget must be positive".into()))
        }

        fn outer() -> WdpResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
