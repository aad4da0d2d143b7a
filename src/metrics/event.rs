//! History records
//!
//! All three record types are immutable once created.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::cluster::{ClusterView, Node, PromotionCommit};
use crate::failover::{FailoverError, FailoverPhase};

/// Why a failover started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    /// Primary reached the consecutive-failure threshold
    ConsecutiveProbeFailures,
    /// Primary's failure streak outlasted the sustained-unreachable threshold
    SustainedUnreachable,
    /// A freshly promoted primary failed during stabilisation
    StabilizationFailure,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::ConsecutiveProbeFailures => "consecutive_probe_failures",
            TriggerReason::SustainedUnreachable => "sustained_unreachable",
            TriggerReason::StabilizationFailure => "stabilization_failure",
        }
    }
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed promotion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailoverEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Generation created by this promotion
    pub generation: u64,
    pub previous_primary_id: String,
    pub new_primary_id: String,
    pub trigger: TriggerReason,
    /// First failed primary probe to promotion start
    pub detection_latency_ms: u64,
    pub promotion_duration_ms: u64,
    /// Promoted standby's last known lag; `None` if it never reported one
    pub data_loss_estimate_seconds: Option<f64>,
}

impl FailoverEvent {
    /// Observed recovery time.
    pub fn rto_ms(&self) -> u64 {
        self.detection_latency_ms
            .saturating_add(self.promotion_duration_ms)
    }

    /// The cluster transaction this event committed.
    pub fn to_commit(&self) -> PromotionCommit {
        PromotionCommit {
            expected_generation: self.generation.saturating_sub(1),
            previous_primary_id: self.previous_primary_id.clone(),
            new_primary_id: self.new_primary_id.clone(),
            at: self.timestamp,
        }
    }
}

/// Full cluster sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub timestamp: DateTime<Utc>,
    pub generation: u64,
    pub primary_id: String,
    pub phase: FailoverPhase,
    pub degraded: bool,
    pub nodes: Vec<Node>,
}

impl HealthSnapshot {
    pub fn new(
        timestamp: DateTime<Utc>,
        view: ClusterView,
        phase: FailoverPhase,
        degraded: bool,
    ) -> Self {
        Self {
            timestamp,
            generation: view.generation,
            primary_id: view.primary_id,
            phase,
            degraded,
            nodes: view.nodes,
        }
    }

    /// Number of nodes with role Primary in this sample.
    pub fn primary_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_primary()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    ProbeFailure,
    NoHealthyCandidate,
    StalePromotion,
    PromotionFailure,
    /// Repeated stale rejections stopped the election
    PromotionHalted,
    /// Anything that should never happen in a correct run
    Internal,
}

impl IncidentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentKind::ProbeFailure => "probe_failure",
            IncidentKind::NoHealthyCandidate => "no_healthy_candidate",
            IncidentKind::StalePromotion => "stale_promotion",
            IncidentKind::PromotionFailure => "promotion_failure",
            IncidentKind::PromotionHalted => "promotion_halted",
            IncidentKind::Internal => "internal",
        }
    }
}

impl From<&FailoverError> for IncidentKind {
    fn from(err: &FailoverError) -> Self {
        match err {
            FailoverError::ProbeTimeout { .. } | FailoverError::ProbeConnectionError { .. } => {
                IncidentKind::ProbeFailure
            }
            FailoverError::NoHealthyCandidate => IncidentKind::NoHealthyCandidate,
            FailoverError::StalePromotion { .. } => IncidentKind::StalePromotion,
            FailoverError::PromotionFailure { .. } => IncidentKind::PromotionFailure,
            FailoverError::PromotionHalted { .. } => IncidentKind::PromotionHalted,
            FailoverError::Configuration(_) | FailoverError::ForbiddenTransition { .. } => {
                IncidentKind::Internal
            }
        }
    }
}

/// A non-fatal error worth keeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Incident {
    pub timestamp: DateTime<Utc>,
    pub kind: IncidentKind,
    pub node_id: Option<String>,
    pub detail: String,
}

impl Incident {
    pub fn from_error(at: DateTime<Utc>, node_id: Option<&str>, err: &FailoverError) -> Self {
        Self {
            timestamp: at,
            kind: IncidentKind::from(err),
            node_id: node_id.map(str::to_string),
            detail: err.to_string(),
        }
    }
}
