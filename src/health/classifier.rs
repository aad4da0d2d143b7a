//! Health debouncing
//!
//! Pure rules turning one probe result plus the node's previous health into
//! new health fields:
//!
//! - any success: Healthy, counter and streak cleared
//! - first failure: Suspect
//! - Suspect becomes Unhealthy after `failure_threshold` consecutive
//!   failures, or once the streak has lasted `sustained_unreachable`
//!
//! A single failed probe therefore never condemns a node unless the
//! threshold is 1.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::elapsed;
use crate::cluster::{HealthStatus, HealthUpdate, Node, NodeRole};
use crate::config::{Config, RejoinPolicy};
use crate::probe::ProbeResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceRules {
    pub failure_threshold: u32,
    pub sustained_unreachable: Duration,
    pub rejoin_policy: RejoinPolicy,
}

impl From<&Config> for DebounceRules {
    fn from(config: &Config) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            sustained_unreachable: config.sustained_unreachable(),
            rejoin_policy: config.rejoin_policy,
        }
    }
}

/// New health fields for `node` after `probe`.
pub fn classify(
    node: &Node,
    probe: &ProbeResult,
    now: DateTime<Utc>,
    rules: &DebounceRules,
) -> HealthUpdate {
    if probe.reachable {
        return HealthUpdate {
            node_id: node.id.clone(),
            health: HealthStatus::Healthy,
            consecutive_failed_probes: 0,
            first_failure_at: None,
            last_heartbeat_at: Some(now),
            replication_lag_seconds: match node.role {
                NodeRole::Standby => probe.lag_seconds,
                NodeRole::Primary => None,
            },
            last_probe_latency_ms: Some(probe.latency_ms),
            last_error: None,
            unfence: node.fenced && rules.rejoin_policy == RejoinPolicy::Auto,
        };
    }

    let failures = node.consecutive_failed_probes.saturating_add(1);
    let streak_start = node.first_failure_at.unwrap_or(now);
    let condemned = failures >= rules.failure_threshold
        || elapsed(streak_start, now) >= rules.sustained_unreachable;

    HealthUpdate {
        node_id: node.id.clone(),
        health: if condemned {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Suspect
        },
        consecutive_failed_probes: failures,
        first_failure_at: Some(streak_start),
        last_heartbeat_at: node.last_heartbeat_at,
        // Keep the last lag we saw; it is the best data-loss estimate left.
        replication_lag_seconds: node.replication_lag_seconds,
        last_probe_latency_ms: Some(probe.latency_ms),
        last_error: probe.error,
        unfence: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeErrorCode;

    fn rules() -> DebounceRules {
        DebounceRules {
            failure_threshold: 3,
            sustained_unreachable: Duration::from_secs(15),
            rejoin_policy: RejoinPolicy::Auto,
        }
    }

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + chrono::Duration::seconds(secs)
    }

    fn apply(node: &mut Node, update: &HealthUpdate) {
        node.health = update.health;
        node.consecutive_failed_probes = update.consecutive_failed_probes;
        node.first_failure_at = update.first_failure_at;
        node.last_heartbeat_at = update.last_heartbeat_at;
        node.replication_lag_seconds = update.replication_lag_seconds;
        if update.unfence {
            node.fenced = false;
        }
    }

    fn fail() -> ProbeResult {
        ProbeResult::unreachable("n", ProbeErrorCode::ConnectionRefused, 3)
    }

    #[test]
    fn test_first_failure_is_suspect() {
        let node = Node::new("n", "r", "e", NodeRole::Standby);
        let update = classify(&node, &fail(), t(0), &rules());
        assert_eq!(update.health, HealthStatus::Suspect);
        assert_eq!(update.consecutive_failed_probes, 1);
        assert_eq!(update.first_failure_at, Some(t(0)));
        assert_eq!(update.last_error, Some(ProbeErrorCode::ConnectionRefused));
    }

    #[test]
    fn test_threshold_condemns() {
        let mut node = Node::new("n", "r", "e", NodeRole::Primary);
        for i in 0..2 {
            let update = classify(&node, &fail(), t(i), &rules());
            assert_eq!(update.health, HealthStatus::Suspect);
            apply(&mut node, &update);
        }
        let update = classify(&node, &fail(), t(2), &rules());
        assert_eq!(update.health, HealthStatus::Unhealthy);
        assert_eq!(update.first_failure_at, Some(t(0)));
    }

    #[test]
    fn test_sustained_streak_condemns_before_threshold() {
        let mut node = Node::new("n", "r", "e", NodeRole::Primary);
        let rules = DebounceRules {
            failure_threshold: 10,
            ..rules()
        };
        let outcome = classify(&node, &fail(), t(0), &rules);
        apply(&mut node, &outcome);
        let update = classify(&node, &fail(), t(15), &rules);
        assert_eq!(update.health, HealthStatus::Unhealthy);
        assert_eq!(update.consecutive_failed_probes, 2);
    }

    #[test]
    fn test_success_resets_everything() {
        let mut node = Node::new("n", "r", "e", NodeRole::Standby);
        for i in 0..3 {
            let outcome = classify(&node, &fail(), t(i), &rules());
            apply(&mut node, &outcome);
        }
        assert_eq!(node.health, HealthStatus::Unhealthy);

        let ok = ProbeResult::reachable("n", Some(0.4), 2);
        let update = classify(&node, &ok, t(5), &rules());
        assert_eq!(update.health, HealthStatus::Healthy);
        assert_eq!(update.consecutive_failed_probes, 0);
        assert_eq!(update.first_failure_at, None);
        assert_eq!(update.last_heartbeat_at, Some(t(5)));
        assert_eq!(update.replication_lag_seconds, Some(0.4));
    }

    #[test]
    fn test_failure_keeps_last_lag_and_heartbeat() {
        let mut node = Node::new("n", "r", "e", NodeRole::Standby);
        let ok = ProbeResult::reachable("n", Some(1.5), 2);
        let outcome = classify(&node, &ok, t(0), &rules());
        apply(&mut node, &outcome);

        let update = classify(&node, &fail(), t(5), &rules());
        assert_eq!(update.replication_lag_seconds, Some(1.5));
        assert_eq!(update.last_heartbeat_at, Some(t(0)));
    }

    #[test]
    fn test_rejoin_policy() {
        let mut node = Node::new("old", "r", "e", NodeRole::Standby);
        node.fenced = true;
        let ok = ProbeResult::reachable("old", None, 2);

        assert!(classify(&node, &ok, t(0), &rules()).unfence);

        let manual = DebounceRules {
            rejoin_policy: RejoinPolicy::Manual,
            ..rules()
        };
        assert!(!classify(&node, &ok, t(0), &manual).unfence);
        assert!(!classify(&node, &fail(), t(0), &rules()).unfence);
    }
}
