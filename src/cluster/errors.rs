//! Cluster transaction errors
//!
//! A rejected transaction leaves the cluster exactly as it was.

use thiserror::Error;

/// Result type for cluster operations
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Reasons a transaction is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("stale generation: expected {expected}, cluster is at {actual}")]
    StaleGeneration { expected: u64, actual: u64 },

    #[error("node {0} is not a standby")]
    NotStandby(String),

    #[error("primary mismatch: transaction expects {expected}, cluster primary is {actual}")]
    PrimaryMismatch { expected: String, actual: String },

    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("cluster invariant violated: {0}")]
    InvariantViolation(String),
}

impl ClusterError {
    /// Whether this rejection came from the generation guard.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            ClusterError::StaleGeneration { .. } | ClusterError::PrimaryMismatch { .. }
        )
    }
}
