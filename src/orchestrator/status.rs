//! Published status snapshot

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cluster::{ClusterView, HealthStatus, Node};
use crate::failover::FailoverPhase;

/// What readers see of the cluster; replaced wholesale after every cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterStatus {
    pub generated_at: DateTime<Utc>,
    pub primary_id: String,
    pub generation: u64,
    pub phase: FailoverPhase,
    pub degraded: bool,
    pub last_transition_at: DateTime<Utc>,
    pub healthy_nodes: usize,
    pub nodes: Vec<Node>,
}

impl ClusterStatus {
    pub fn new(
        generated_at: DateTime<Utc>,
        view: ClusterView,
        phase: FailoverPhase,
        degraded: bool,
    ) -> Self {
        Self {
            generated_at,
            healthy_nodes: view
                .nodes
                .iter()
                .filter(|n| n.health == HealthStatus::Healthy)
                .count(),
            primary_id: view.primary_id,
            generation: view.generation,
            phase,
            degraded,
            last_transition_at: view.last_transition_at,
            nodes: view.nodes,
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
