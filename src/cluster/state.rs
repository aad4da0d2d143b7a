//! Authoritative cluster state
//!
//! Owned by the orchestrator control loop; nothing else holds a mutable
//! reference. Readers get a `ClusterView` copy.
//!
//! Invariants checked after every transaction:
//! - exactly one node has role Primary, and it is `primary_id`
//! - `generation` never decreases, and only a promotion increments it

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::errors::{ClusterError, ClusterResult};
use super::node::{HealthStatus, Node, NodeRole};
use super::transaction::{HealthUpdate, PromotionCommit, Transaction};
use super::view::ClusterView;
use crate::config::NodeConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterState {
    nodes: BTreeMap<String, Node>,
    primary_id: String,
    generation: u64,
    last_transition_at: DateTime<Utc>,
}

impl ClusterState {
    /// Build a cluster from nodes. Exactly one must be primary.
    pub fn new(nodes: Vec<Node>, at: DateTime<Utc>) -> ClusterResult<Self> {
        let mut map = BTreeMap::new();
        for node in nodes {
            if map.contains_key(&node.id) {
                return Err(ClusterError::DuplicateNode(node.id));
            }
            map.insert(node.id.clone(), node);
        }

        let primaries: Vec<&String> = map
            .values()
            .filter(|n| n.is_primary())
            .map(|n| &n.id)
            .collect();
        let primary_id = match primaries.as_slice() {
            [only] => (*only).clone(),
            [] => {
                return Err(ClusterError::InvariantViolation(
                    "topology has no primary".to_string(),
                ))
            }
            many => {
                return Err(ClusterError::InvariantViolation(format!(
                    "topology has {} primaries",
                    many.len()
                )))
            }
        };

        Ok(Self {
            nodes: map,
            primary_id,
            generation: 0,
            last_transition_at: at,
        })
    }

    /// Build a cluster from configured topology.
    pub fn from_topology(topology: &[NodeConfig], at: DateTime<Utc>) -> ClusterResult<Self> {
        let nodes = topology
            .iter()
            .map(|c| Node::new(&c.id, &c.region, &c.endpoint, c.role))
            .collect();
        Self::new(nodes, at)
    }

    pub fn primary_id(&self) -> &str {
        &self.primary_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_transition_at(&self) -> DateTime<Utc> {
        self.last_transition_at
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The current primary.
    pub fn primary(&self) -> Option<&Node> {
        self.nodes.get(&self.primary_id)
    }

    /// Apply a transaction atomically.
    ///
    /// The transaction runs against a staged copy; on any error the cluster
    /// is left untouched.
    pub fn apply(&mut self, txn: &Transaction) -> ClusterResult<()> {
        let mut staged = self.clone();
        match txn {
            Transaction::RecordHealth { updates, .. } => staged.stage_health(updates)?,
            Transaction::Promote(commit) => staged.stage_promotion(commit)?,
            Transaction::Readmit { node_id, .. } => staged.stage_readmit(node_id)?,
        }
        staged.check_invariants()?;
        if staged.generation < self.generation {
            return Err(ClusterError::InvariantViolation(
                "generation went backwards".to_string(),
            ));
        }
        *self = staged;
        Ok(())
    }

    fn stage_health(&mut self, updates: &[HealthUpdate]) -> ClusterResult<()> {
        for update in updates {
            let node = self
                .nodes
                .get_mut(&update.node_id)
                .ok_or_else(|| ClusterError::UnknownNode(update.node_id.clone()))?;

            node.health = update.health;
            node.consecutive_failed_probes = update.consecutive_failed_probes;
            node.first_failure_at = update.first_failure_at;
            node.last_heartbeat_at = update.last_heartbeat_at;
            node.last_probe_latency_ms = update.last_probe_latency_ms;
            node.last_error = update.last_error;
            if node.role == NodeRole::Standby {
                node.replication_lag_seconds = update.replication_lag_seconds;
            } else {
                node.replication_lag_seconds = None;
            }
            if update.unfence {
                node.fenced = false;
            }
        }
        Ok(())
    }

    fn stage_promotion(&mut self, commit: &PromotionCommit) -> ClusterResult<()> {
        if commit.expected_generation != self.generation {
            return Err(ClusterError::StaleGeneration {
                expected: commit.expected_generation,
                actual: self.generation,
            });
        }
        if commit.previous_primary_id != self.primary_id {
            return Err(ClusterError::PrimaryMismatch {
                expected: commit.previous_primary_id.clone(),
                actual: self.primary_id.clone(),
            });
        }

        let new_primary = self
            .nodes
            .get(&commit.new_primary_id)
            .ok_or_else(|| ClusterError::UnknownNode(commit.new_primary_id.clone()))?;
        if new_primary.role != NodeRole::Standby {
            return Err(ClusterError::NotStandby(commit.new_primary_id.clone()));
        }

        // Fence the old primary first; both edits land in the same swap.
        if let Some(old) = self.nodes.get_mut(&commit.previous_primary_id) {
            old.role = NodeRole::Standby;
            old.health = HealthStatus::Unhealthy;
            old.fenced = true;
            old.replication_lag_seconds = None;
        }
        if let Some(new) = self.nodes.get_mut(&commit.new_primary_id) {
            new.role = NodeRole::Primary;
            new.fenced = false;
        }

        self.primary_id = commit.new_primary_id.clone();
        self.generation += 1;
        self.last_transition_at = commit.at;
        Ok(())
    }

    fn stage_readmit(&mut self, node_id: &str) -> ClusterResult<()> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| ClusterError::UnknownNode(node_id.to_string()))?;
        node.fenced = false;
        Ok(())
    }

    /// Verify the single-primary invariant.
    pub fn check_invariants(&self) -> ClusterResult<()> {
        let primaries: Vec<&str> = self
            .nodes
            .values()
            .filter(|n| n.is_primary())
            .map(|n| n.id.as_str())
            .collect();

        if primaries.len() != 1 {
            return Err(ClusterError::InvariantViolation(format!(
                "expected exactly one primary, found {:?}",
                primaries
            )));
        }
        if primaries[0] != self.primary_id {
            return Err(ClusterError::InvariantViolation(format!(
                "primary_id {} does not match primary node {}",
                self.primary_id, primaries[0]
            )));
        }
        Ok(())
    }

    /// Read-only copy for reporting.
    pub fn view(&self) -> ClusterView {
        ClusterView {
            primary_id: self.primary_id.clone(),
            generation: self.generation,
            last_transition_at: self.last_transition_at,
            nodes: self.nodes.values().cloned().collect(),
        }
    }

    /// Rebuild role state by replaying committed promotions in order.
    pub fn replay<I>(initial: &ClusterState, promotions: I) -> ClusterResult<ClusterState>
    where
        I: IntoIterator<Item = PromotionCommit>,
    {
        let mut state = initial.clone();
        for commit in promotions {
            state.apply(&Transaction::Promote(commit))?;
        }
        Ok(state)
    }
}
