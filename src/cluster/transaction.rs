//! Cluster transactions
//!
//! The only way to change a `ClusterState`. Each variant is applied to a
//! staged copy, checked against the cluster invariants, and swapped in as a
//! whole, so readers see either the state before or the state after.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::node::HealthStatus;
use crate::probe::ProbeErrorCode;

/// New health fields for one node, computed by the health classifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthUpdate {
    pub node_id: String,
    pub health: HealthStatus,
    pub consecutive_failed_probes: u32,
    pub first_failure_at: Option<DateTime<Utc>>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub replication_lag_seconds: Option<f64>,
    pub last_probe_latency_ms: Option<u64>,
    pub last_error: Option<ProbeErrorCode>,
    /// Clear the node's fence (automatic rejoin)
    pub unfence: bool,
}

/// Atomic hand-over of the primary role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionCommit {
    /// Generation the controller observed when it started the promotion
    pub expected_generation: u64,
    pub previous_primary_id: String,
    pub new_primary_id: String,
    pub at: DateTime<Utc>,
}

/// A unit of change to the cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum Transaction {
    /// Commit one monitor cycle's health observations.
    RecordHealth {
        updates: Vec<HealthUpdate>,
        at: DateTime<Utc>,
    },

    /// Demote the old primary and promote the new one in one step.
    Promote(PromotionCommit),

    /// Lift the fence on a node demoted by an earlier failover.
    Readmit { node_id: String, at: DateTime<Utc> },
}

impl Transaction {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Transaction::RecordHealth { .. } => "record_health",
            Transaction::Promote(_) => "promote",
            Transaction::Readmit { .. } => "readmit",
        }
    }
}
