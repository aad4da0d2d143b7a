//! In-memory node backend
//!
//! Stands in for a real replica set: every node's reachability, lag and
//! promotion behaviour can be scripted. Promotions are fenced on a shared
//! generation the same way a real fencing store would be, so a stale
//! promotion is rejected here exactly as it would be in production.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;

use super::client::{HealthReport, NodeClient, PromoteOutcome};
use super::errors::ProbeErrorCode;
use crate::cluster::NodeRole;
use crate::config::NodeConfig;

/// Scripted behaviour of one simulated node.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedNode {
    /// Whether probes and promotions reach the node
    pub reachable: bool,
    /// Whether the node currently acts as primary
    pub is_primary: bool,
    /// Lag reported while acting as standby
    pub lag_seconds: Option<f64>,
    /// Error returned while unreachable
    pub failure: ProbeErrorCode,
    /// Delay before answering a probe
    pub probe_delay: Duration,
    /// Delay before answering a promotion
    pub promote_delay: Duration,
    /// Forced promotion failure
    pub promote_failure: Option<String>,
}

impl SimulatedNode {
    fn new(is_primary: bool, lag_seconds: Option<f64>) -> Self {
        Self {
            reachable: true,
            is_primary,
            lag_seconds,
            failure: ProbeErrorCode::ConnectionRefused,
            probe_delay: Duration::ZERO,
            promote_delay: Duration::ZERO,
            promote_failure: None,
        }
    }
}

/// Scriptable `NodeClient` backed by memory.
#[derive(Debug, Default)]
pub struct SimulatedCluster {
    nodes: RwLock<BTreeMap<String, SimulatedNode>>,
    generation: AtomicU64,
    promotions: AtomicU64,
}

impl SimulatedCluster {
    /// Create an empty simulated cluster at generation 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a simulated cluster mirroring a configured topology.
    ///
    /// Standbys start with zero lag.
    pub fn from_topology(nodes: &[NodeConfig]) -> Self {
        let sim = Self::new();
        for node in nodes {
            match node.role {
                NodeRole::Primary => sim.add_primary(&node.id),
                NodeRole::Standby => sim.add_standby(&node.id, 0.0),
            }
        }
        sim
    }

    /// Add a node acting as primary.
    pub fn add_primary(&self, id: &str) {
        self.nodes
            .write()
            .insert(id.to_string(), SimulatedNode::new(true, None));
    }

    /// Add a standby with the given lag.
    pub fn add_standby(&self, id: &str, lag_seconds: f64) {
        self.nodes
            .write()
            .insert(id.to_string(), SimulatedNode::new(false, Some(lag_seconds)));
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut SimulatedNode)) {
        if let Some(node) = self.nodes.write().get_mut(id) {
            f(node);
        }
    }

    /// Make a node reachable or unreachable.
    pub fn set_reachable(&self, id: &str, reachable: bool) {
        self.update(id, |n| n.reachable = reachable);
    }

    /// Set the lag a standby reports.
    pub fn set_lag(&self, id: &str, lag_seconds: Option<f64>) {
        self.update(id, |n| n.lag_seconds = lag_seconds);
    }

    /// Set the error code returned while the node is unreachable.
    pub fn set_failure_code(&self, id: &str, code: ProbeErrorCode) {
        self.update(id, |n| n.failure = code);
    }

    /// Delay every probe of a node.
    pub fn set_probe_delay(&self, id: &str, delay: Duration) {
        self.update(id, |n| n.probe_delay = delay);
    }

    /// Delay every promotion of a node.
    pub fn set_promote_delay(&self, id: &str, delay: Duration) {
        self.update(id, |n| n.promote_delay = delay);
    }

    /// Make promotions of a node fail with `reason`, or succeed again with `None`.
    pub fn fail_promotions(&self, id: &str, reason: Option<&str>) {
        self.update(id, |n| n.promote_failure = reason.map(str::to_string));
    }

    /// Force the fencing generation, as if another controller had promoted.
    pub fn set_generation(&self, generation: u64) {
        self.generation.store(generation, Ordering::SeqCst);
    }

    /// Current fencing generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Number of promotions the backend accepted.
    pub fn promotion_count(&self) -> u64 {
        self.promotions.load(Ordering::SeqCst)
    }

    /// Whether a node currently acts as primary.
    pub fn is_primary(&self, id: &str) -> bool {
        self.nodes.read().get(id).map(|n| n.is_primary).unwrap_or(false)
    }

    /// Ids of every node acting as primary.
    pub fn primaries(&self) -> Vec<String> {
        self.nodes
            .read()
            .iter()
            .filter(|(_, n)| n.is_primary)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Random walk of every standby's lag, bounded to `[0, max_lag]`.
    pub fn drift_lag(&self, max_step: f64, max_lag: f64) {
        let mut rng = rand::thread_rng();
        for node in self.nodes.write().values_mut() {
            if node.is_primary {
                continue;
            }
            if let Some(lag) = node.lag_seconds.as_mut() {
                let step = rng.gen_range(-max_step..=max_step);
                *lag = (*lag + step).clamp(0.0, max_lag);
            }
        }
    }
}

#[async_trait]
impl NodeClient for SimulatedCluster {
    async fn check_health(&self, node_id: &str) -> Result<HealthReport, ProbeErrorCode> {
        let node = self
            .nodes
            .read()
            .get(node_id)
            .cloned()
            .ok_or(ProbeErrorCode::ProtocolError)?;

        if !node.probe_delay.is_zero() {
            tokio::time::sleep(node.probe_delay).await;
        }

        if !node.reachable {
            return Err(node.failure);
        }

        if node.is_primary {
            Ok(HealthReport::primary())
        } else {
            Ok(node
                .lag_seconds
                .map_or_else(HealthReport::default, HealthReport::standby))
        }
    }

    async fn promote(&self, node_id: &str, expected_generation: u64) -> PromoteOutcome {
        let delay = match self.nodes.read().get(node_id) {
            Some(node) => node.promote_delay,
            None => {
                return PromoteOutcome::Failed {
                    reason: format!("unknown node {}", node_id),
                }
            }
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        // Re-read: the node may have gone away while the promotion was in flight.
        let Some(node) = self.nodes.read().get(node_id).cloned() else {
            return PromoteOutcome::Failed {
                reason: format!("unknown node {}", node_id),
            };
        };
        if !node.reachable {
            return PromoteOutcome::Failed {
                reason: "node unreachable".to_string(),
            };
        }
        if let Some(reason) = node.promote_failure {
            return PromoteOutcome::Failed { reason };
        }

        let mut nodes = self.nodes.write();
        let current = self.generation.load(Ordering::SeqCst);
        if current != expected_generation {
            return PromoteOutcome::StaleGeneration { current };
        }

        for (id, n) in nodes.iter_mut() {
            n.is_primary = id == node_id;
            if n.is_primary {
                n.lag_seconds = None;
            }
        }
        self.generation.store(current + 1, Ordering::SeqCst);
        self.promotions.fetch_add(1, Ordering::SeqCst);
        PromoteOutcome::Promoted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_nodes() -> SimulatedCluster {
        let sim = SimulatedCluster::new();
        sim.add_primary("p");
        sim.add_standby("a", 2.0);
        sim.add_standby("b", 0.5);
        sim
    }

    #[tokio::test]
    async fn test_promote_moves_primary_and_bumps_generation() {
        let sim = three_nodes();

        let outcome = sim.promote("b", 0).await;
        assert!(outcome.is_promoted());
        assert_eq!(sim.primaries(), vec!["b".to_string()]);
        assert_eq!(sim.generation(), 1);
        assert_eq!(sim.promotion_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_generation_rejected() {
        let sim = three_nodes();
        sim.set_generation(4);

        let outcome = sim.promote("b", 3).await;
        assert_eq!(outcome, PromoteOutcome::StaleGeneration { current: 4 });
        assert!(sim.is_primary("p"));
    }

    #[tokio::test]
    async fn test_unreachable_node_cannot_be_promoted() {
        let sim = three_nodes();
        sim.set_reachable("a", false);

        let outcome = sim.promote("a", 0).await;
        assert!(matches!(outcome, PromoteOutcome::Failed { .. }));
        assert_eq!(sim.generation(), 0);
    }

    #[tokio::test]
    async fn test_injected_promotion_failure() {
        let sim = three_nodes();
        sim.fail_promotions("b", Some("disk full"));

        match sim.promote("b", 0).await {
            PromoteOutcome::Failed { reason } => assert_eq!(reason, "disk full"),
            other => panic!("expected failure, got {:?}", other),
        }

        sim.fail_promotions("b", None);
        assert!(sim.promote("b", 0).await.is_promoted());
    }

    #[test]
    fn test_drift_stays_in_bounds() {
        let sim = three_nodes();
        for _ in 0..100 {
            sim.drift_lag(0.5, 3.0);
        }
        let nodes = sim.nodes.read();
        for node in nodes.values().filter(|n| !n.is_primary) {
            let lag = node.lag_seconds.unwrap();
            assert!((0.0..=3.0).contains(&lag));
        }
    }
}
