//! Failover errors
//!
//! Only configuration errors are fatal. Everything else is recorded as an
//! incident and drives a state transition.

use thiserror::Error;

use crate::config::ConfigError;
use crate::probe::ProbeErrorCode;

/// Result type for failover operations
pub type FailoverResult<T> = Result<T, FailoverError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FailoverError {
    #[error("probe of {node_id} timed out")]
    ProbeTimeout { node_id: String },

    #[error("probe of {node_id} failed: {code}")]
    ProbeConnectionError { node_id: String, code: ProbeErrorCode },

    #[error("no healthy standby is eligible for promotion")]
    NoHealthyCandidate,

    #[error("promotion of {node_id} rejected: generation {expected} is stale (current {current})")]
    StalePromotion {
        node_id: String,
        expected: u64,
        current: u64,
    },

    #[error("promotion of {node_id} failed: {reason}")]
    PromotionFailure { node_id: String, reason: String },

    #[error("promotion halted after {rejections} stale generation rejections")]
    PromotionHalted { rejections: u32 },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("forbidden transition: {from} -> {to}")]
    ForbiddenTransition {
        from: &'static str,
        to: &'static str,
    },
}

impl FailoverError {
    /// Map a probe error code to its failover error.
    pub fn from_probe(node_id: &str, code: ProbeErrorCode) -> Self {
        if code.is_timeout() {
            Self::ProbeTimeout {
                node_id: node_id.to_string(),
            }
        } else {
            Self::ProbeConnectionError {
                node_id: node_id.to_string(),
                code,
            }
        }
    }

    pub fn forbidden_transition(from: &'static str, to: &'static str) -> Self {
        Self::ForbiddenTransition { from, to }
    }

    /// Whether the process should stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FailoverError::Configuration(_))
    }
}

impl From<ConfigError> for FailoverError {
    fn from(err: ConfigError) -> Self {
        FailoverError::Configuration(err.to_string())
    }
}
