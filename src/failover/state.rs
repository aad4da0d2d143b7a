//! Failover state machine
//!
//! ```text
//!   Stable ──primary unhealthy──▶ SuspectedFailure ──grace elapsed──▶ ElectingSuccessor
//!     ▲                               │                                   │    ▲
//!     │◀────────primary healthy───────┴───────────────────────────────────┤    │ failure / stale
//!     │                                                                   ▼    │
//!     └────window held──── Stabilizing ◀────────committed──────────── Promoting
//!                              │
//!                              └──new primary unhealthy──▶ SuspectedFailure
//! ```
//!
//! Transitions are explicit methods that consume the state. Calling one from
//! a state that does not allow it returns `ForbiddenTransition` and leaves
//! nothing changed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::errors::{FailoverError, FailoverResult};
use crate::metrics::TriggerReason;

/// Phase name without the per-phase data, for snapshots and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverPhase {
    Stable,
    SuspectedFailure,
    ElectingSuccessor,
    Promoting,
    Stabilizing,
}

impl FailoverPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailoverPhase::Stable => "Stable",
            FailoverPhase::SuspectedFailure => "SuspectedFailure",
            FailoverPhase::ElectingSuccessor => "ElectingSuccessor",
            FailoverPhase::Promoting => "Promoting",
            FailoverPhase::Stabilizing => "Stabilizing",
        }
    }
}

impl fmt::Display for FailoverPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The failure being handled, carried from suspicion to commit.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureContext {
    /// Primary judged failed
    pub primary_id: String,
    pub trigger: TriggerReason,
    /// First failed probe of the primary's current failure streak
    pub failure_started_at: DateTime<Utc>,
    /// Entry into SuspectedFailure
    pub suspected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum FailoverState {
    /// Primary healthy, nothing in progress.
    #[default]
    Stable,

    /// Primary unhealthy; waiting out the grace window.
    SuspectedFailure { failure: FailureContext },

    /// Choosing a standby.
    ElectingSuccessor {
        failure: FailureContext,
        election_started_at: DateTime<Utc>,
    },

    /// Promotion of `candidate_id` in flight.
    Promoting {
        failure: FailureContext,
        election_started_at: DateTime<Utc>,
        candidate_id: String,
        expected_generation: u64,
        started_at: DateTime<Utc>,
    },

    /// New primary must hold Healthy for the stabilisation window.
    Stabilizing {
        primary_id: String,
        healthy_since: DateTime<Utc>,
    },
}

impl FailoverState {
    pub fn new() -> Self {
        Self::Stable
    }

    pub fn phase(&self) -> FailoverPhase {
        match self {
            Self::Stable => FailoverPhase::Stable,
            Self::SuspectedFailure { .. } => FailoverPhase::SuspectedFailure,
            Self::ElectingSuccessor { .. } => FailoverPhase::ElectingSuccessor,
            Self::Promoting { .. } => FailoverPhase::Promoting,
            Self::Stabilizing { .. } => FailoverPhase::Stabilizing,
        }
    }

    pub fn state_name(&self) -> &'static str {
        self.phase().as_str()
    }

    /// The failure being handled, if any.
    pub fn failure(&self) -> Option<&FailureContext> {
        match self {
            Self::SuspectedFailure { failure }
            | Self::ElectingSuccessor { failure, .. }
            | Self::Promoting { failure, .. } => Some(failure),
            Self::Stable | Self::Stabilizing { .. } => None,
        }
    }

    /// Stable or Stabilizing → SuspectedFailure
    pub fn suspect(self, failure: FailureContext) -> FailoverResult<Self> {
        match self {
            Self::Stable | Self::Stabilizing { .. } => Ok(Self::SuspectedFailure { failure }),
            _ => Err(FailoverError::forbidden_transition(
                self.state_name(),
                "SuspectedFailure",
            )),
        }
    }

    /// SuspectedFailure or ElectingSuccessor → Stable
    ///
    /// The primary recovered before any promotion started.
    pub fn recover(self) -> FailoverResult<Self> {
        match self {
            Self::SuspectedFailure { .. } | Self::ElectingSuccessor { .. } => Ok(Self::Stable),
            _ => Err(FailoverError::forbidden_transition(
                self.state_name(),
                "Stable",
            )),
        }
    }

    /// SuspectedFailure → ElectingSuccessor
    pub fn begin_election(self, at: DateTime<Utc>) -> FailoverResult<Self> {
        match self {
            Self::SuspectedFailure { failure } => Ok(Self::ElectingSuccessor {
                failure,
                election_started_at: at,
            }),
            _ => Err(FailoverError::forbidden_transition(
                self.state_name(),
                "ElectingSuccessor",
            )),
        }
    }

    /// ElectingSuccessor → Promoting
    pub fn begin_promotion(
        self,
        candidate_id: &str,
        expected_generation: u64,
        at: DateTime<Utc>,
    ) -> FailoverResult<Self> {
        match self {
            Self::ElectingSuccessor {
                failure,
                election_started_at,
            } => Ok(Self::Promoting {
                failure,
                election_started_at,
                candidate_id: candidate_id.to_string(),
                expected_generation,
                started_at: at,
            }),
            _ => Err(FailoverError::forbidden_transition(
                self.state_name(),
                "Promoting",
            )),
        }
    }

    /// Promoting → ElectingSuccessor
    ///
    /// The promotion failed or was stale. The election clock keeps running.
    pub fn abort_promotion(self) -> FailoverResult<Self> {
        match self {
            Self::Promoting {
                failure,
                election_started_at,
                ..
            } => Ok(Self::ElectingSuccessor {
                failure,
                election_started_at,
            }),
            _ => Err(FailoverError::forbidden_transition(
                self.state_name(),
                "ElectingSuccessor",
            )),
        }
    }

    /// Promoting → Stabilizing
    pub fn promotion_committed(self, at: DateTime<Utc>) -> FailoverResult<Self> {
        match self {
            Self::Promoting { candidate_id, .. } => Ok(Self::Stabilizing {
                primary_id: candidate_id,
                healthy_since: at,
            }),
            _ => Err(FailoverError::forbidden_transition(
                self.state_name(),
                "Stabilizing",
            )),
        }
    }

    /// Stabilizing → Stable
    pub fn stabilized(self) -> FailoverResult<Self> {
        match self {
            Self::Stabilizing { .. } => Ok(Self::Stable),
            _ => Err(FailoverError::forbidden_transition(
                self.state_name(),
                "Stable",
            )),
        }
    }
}
