//! Read-only handle for reporting surfaces
//!
//! Cheap to clone. Holds no reference to the cluster state itself: status
//! comes from the watch channel, history from the shared recorder, and the
//! only write path is a queued operator command.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use super::status::ClusterStatus;
use crate::metrics::MetricsRecorder;

/// Commands applied by the control loop at the start of its next cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Lift the fence on a node demoted by a failover.
    Readmit { node_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("node {0} is not fenced")]
    NotFenced(String),

    #[error("command queue is full")]
    Busy,

    #[error("orchestrator is not running")]
    Stopped,
}

#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    status: watch::Receiver<Arc<ClusterStatus>>,
    commands: mpsc::Sender<OperatorCommand>,
    recorder: Arc<MetricsRecorder>,
    started_at: DateTime<Utc>,
}

impl OrchestratorHandle {
    pub(super) fn new(
        status: watch::Receiver<Arc<ClusterStatus>>,
        commands: mpsc::Sender<OperatorCommand>,
        recorder: Arc<MetricsRecorder>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            status,
            commands,
            recorder,
            started_at,
        }
    }

    /// Latest published status.
    pub fn status(&self) -> Arc<ClusterStatus> {
        self.status.borrow().clone()
    }

    pub fn recorder(&self) -> &MetricsRecorder {
        &self.recorder
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Queue re-admission of a fenced node.
    pub fn readmit(&self, node_id: &str) -> Result<(), CommandError> {
        let status = self.status();
        let node = status
            .node(node_id)
            .ok_or_else(|| CommandError::UnknownNode(node_id.to_string()))?;
        if !node.fenced {
            return Err(CommandError::NotFenced(node_id.to_string()));
        }

        self.commands
            .try_send(OperatorCommand::Readmit {
                node_id: node_id.to_string(),
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => CommandError::Busy,
                mpsc::error::TrySendError::Closed(_) => CommandError::Stopped,
            })
    }
}
