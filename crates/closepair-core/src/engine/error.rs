use thiserror::Error;

use super::config::ConfigError;
use crate::core::models::point_set::PointSetError;

/// Advice attached to every resource exhaustion failure.
pub const RESOURCE_GUIDANCE: &str = "reduce slack or particle count";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Invalid point set: {source}")]
    PointSet {
        #[from]
        source: PointSetError,
    },

    #[error("Controller is configured for {expected} updates but was called for {actual}")]
    ScopeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Pair generation exhausted resources after {requested} pairs; {guidance}")]
    ResourceExhausted {
        requested: usize,
        guidance: &'static str,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl EngineError {
    pub(crate) fn exhausted(requested: usize) -> Self {
        EngineError::ResourceExhausted {
            requested,
            guidance: RESOURCE_GUIDANCE,
        }
    }
}
