//! Read-only cluster view

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::node::{HealthStatus, Node};

/// Point-in-time copy of the cluster, safe to hand to any reader.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterView {
    pub primary_id: String,
    pub generation: u64,
    pub last_transition_at: DateTime<Utc>,
    /// Nodes in id order
    pub nodes: Vec<Node>,
}

impl ClusterView {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn primary(&self) -> Option<&Node> {
        self.node(&self.primary_id)
    }

    /// Number of nodes currently classified Healthy.
    pub fn healthy_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.health == HealthStatus::Healthy)
            .count()
    }

    /// Ids of every node whose role is Primary.
    pub fn primaries(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.is_primary())
            .map(|n| n.id.as_str())
            .collect()
    }
}
