//! Node record
//!
//! One entry per configured replica. Nodes are never removed: a node that
//! fails permanently stays in the registry as Unhealthy so history and
//! reports can still refer to it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::probe::ProbeErrorCode;

/// Replication role of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Sole write authority
    Primary,
    /// Follows the primary
    Standby,
}

impl NodeRole {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Primary => "primary",
            NodeRole::Standby => "standby",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Debounced health classification of a node.
///
/// ```text
///  Unknown ──fail──▶ Suspect ──N fails or sustained──▶ Unhealthy
///     │                 │                                 │
///     └──────ok─────────┴──────────────ok─────────────────┴──▶ Healthy
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Last probe succeeded
    Healthy,
    /// Failing, but not long enough to condemn
    Suspect,
    /// Condemned by consecutive failures or sustained unreachability
    Unhealthy,
    /// Not probed yet
    #[default]
    Unknown,
}

impl HealthStatus {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Suspect => "suspect",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One database replica as the orchestrator sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    pub region: String,
    pub endpoint: String,
    pub role: NodeRole,
    pub health: HealthStatus,
    /// Time of the last successful probe
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    /// Last reported lag; only meaningful for standbys
    pub replication_lag_seconds: Option<f64>,
    pub consecutive_failed_probes: u32,
    /// Start of the current failure streak
    pub first_failure_at: Option<DateTime<Utc>>,
    pub last_probe_latency_ms: Option<u64>,
    pub last_error: Option<ProbeErrorCode>,
    /// Demoted by a failover and not yet re-admitted
    pub fenced: bool,
}

impl Node {
    /// Create a node in Unknown health.
    pub fn new(
        id: impl Into<String>,
        region: impl Into<String>,
        endpoint: impl Into<String>,
        role: NodeRole,
    ) -> Self {
        Self {
            id: id.into(),
            region: region.into(),
            endpoint: endpoint.into(),
            role,
            health: HealthStatus::Unknown,
            last_heartbeat_at: None,
            replication_lag_seconds: None,
            consecutive_failed_probes: 0,
            first_failure_at: None,
            last_probe_latency_ms: None,
            last_error: None,
            fenced: false,
        }
    }

    pub fn is_primary(&self) -> bool {
        self.role == NodeRole::Primary
    }

    pub fn is_healthy(&self) -> bool {
        self.health == HealthStatus::Healthy
    }

    /// Whether the node may be elected as the next primary.
    pub fn is_eligible_standby(&self) -> bool {
        self.role == NodeRole::Standby && self.is_healthy() && !self.fenced
    }
}
