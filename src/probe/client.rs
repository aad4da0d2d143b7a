//! Node capability interface
//!
//! The orchestrator does not implement replication. Everything it needs from
//! a database node goes through `NodeClient`: a health check that reports
//! replication lag, and a generation-guarded promotion.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::ProbeErrorCode;

/// What a reachable node reported.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HealthReport {
    /// Seconds behind the primary. `None` for a primary, or when the standby
    /// could not compute it.
    pub lag_seconds: Option<f64>,
}

impl HealthReport {
    /// Report from a node that has no lag to speak of.
    pub fn primary() -> Self {
        Self { lag_seconds: None }
    }

    /// Report from a standby with the given lag.
    pub fn standby(lag_seconds: f64) -> Self {
        Self {
            lag_seconds: Some(lag_seconds),
        }
    }
}

/// Result of asking a node to become primary.
#[derive(Debug, Clone, PartialEq)]
pub enum PromoteOutcome {
    /// Node confirmed it is now primary.
    Promoted,

    /// Node refused because the caller's generation is out of date.
    StaleGeneration {
        /// Generation the node believes is current
        current: u64,
    },

    /// Promotion did not happen.
    Failed {
        /// Reason reported by the node layer
        reason: String,
    },
}

impl PromoteOutcome {
    /// Check if the node confirmed promotion.
    pub fn is_promoted(&self) -> bool {
        matches!(self, Self::Promoted)
    }
}

/// Capabilities the orchestrator consumes from the database layer.
///
/// Implementations must be cheap to call concurrently; the health monitor
/// issues one `check_health` per node per cycle in parallel. Timeouts are
/// enforced by the caller, so implementations may block as long as the
/// underlying I/O does.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Liveness and replication lag of one node.
    async fn check_health(&self, node_id: &str) -> Result<HealthReport, ProbeErrorCode>;

    /// Promote `node_id` to primary, fenced on `expected_generation`.
    async fn promote(&self, node_id: &str, expected_generation: u64) -> PromoteOutcome;
}
