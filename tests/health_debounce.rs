//! Health Debounce Tests
//!
//! Monitor cycles against the simulated cluster:
//! - Suspect before Unhealthy, by count or by sustained duration
//! - a successful probe resets the streak
//! - failed probes keep the last known lag and heartbeat
//! - timeouts, bounded probe concurrency, and manual rejoin

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use failoverd::cluster::{ClusterState, HealthStatus, NodeRole, PromotionCommit, Transaction};
use failoverd::config::{Config, NodeConfig, RejoinPolicy};
use failoverd::health::{DebounceRules, HealthMonitor};
use failoverd::metrics::{IncidentKind, MetricsRecorder};
use failoverd::probe::{NodeProbe, ProbeErrorCode, SimulatedCluster};

fn t(secs: i64) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-06-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
        + chrono::Duration::seconds(secs)
}

fn topology() -> Vec<NodeConfig> {
    vec![
        NodeConfig::new("p", "r1", "p:5432", NodeRole::Primary),
        NodeConfig::new("a", "r2", "a:5432", NodeRole::Standby),
        NodeConfig::new("b", "r3", "b:5432", NodeRole::Standby),
    ]
}

struct Fixture {
    sim: Arc<SimulatedCluster>,
    monitor: HealthMonitor,
    cluster: ClusterState,
    recorder: MetricsRecorder,
}

impl Fixture {
    fn new(configure: impl FnOnce(&mut Config)) -> Self {
        let mut config = Config::with_nodes(topology());
        configure(&mut config);
        let sim = Arc::new(SimulatedCluster::from_topology(&config.nodes));
        Self {
            monitor: HealthMonitor::from_config(&config, sim.clone()),
            cluster: ClusterState::from_topology(&config.nodes, t(0)).unwrap(),
            recorder: MetricsRecorder::new(config.metrics_retention()),
            sim,
        }
    }

    async fn cycle_at(&mut self, secs: i64) -> HealthStatus {
        self.monitor
            .run_cycle(&mut self.cluster, &self.recorder, t(secs))
            .await
            .unwrap();
        self.cluster.node("p").unwrap().health
    }
}

// =============================================================================
// Debounce
// =============================================================================

/// Failures below the threshold only make the node Suspect.
#[tokio::test]
async fn test_threshold_failures_make_unhealthy() {
    let mut f = Fixture::new(|_| {});
    assert_eq!(f.cycle_at(0).await, HealthStatus::Healthy);

    f.sim.set_reachable("p", false);
    assert_eq!(f.cycle_at(5).await, HealthStatus::Suspect);
    assert_eq!(f.cycle_at(10).await, HealthStatus::Suspect);
    assert_eq!(f.cycle_at(15).await, HealthStatus::Unhealthy);

    let p = f.cluster.node("p").unwrap();
    assert_eq!(p.consecutive_failed_probes, 3);
    assert_eq!(p.first_failure_at, Some(t(5)));
    assert_eq!(p.last_heartbeat_at, Some(t(0)));
    assert_eq!(p.last_error, Some(ProbeErrorCode::ConnectionRefused));
}

/// A long enough streak is Unhealthy even below the failure count.
#[tokio::test]
async fn test_sustained_unreachable_makes_unhealthy() {
    let mut f = Fixture::new(|c| c.failure_threshold = 10);
    f.cycle_at(0).await;

    f.sim.set_reachable("p", false);
    assert_eq!(f.cycle_at(5).await, HealthStatus::Suspect);
    assert_eq!(f.cycle_at(15).await, HealthStatus::Suspect);
    assert_eq!(f.cycle_at(20).await, HealthStatus::Unhealthy);
    assert_eq!(f.cluster.node("p").unwrap().consecutive_failed_probes, 3);
}

/// One success clears the streak.
#[tokio::test]
async fn test_success_resets_streak() {
    let mut f = Fixture::new(|_| {});
    f.sim.set_reachable("p", false);
    f.cycle_at(0).await;
    f.cycle_at(5).await;

    f.sim.set_reachable("p", true);
    assert_eq!(f.cycle_at(10).await, HealthStatus::Healthy);
    let p = f.cluster.node("p").unwrap();
    assert_eq!(p.consecutive_failed_probes, 0);
    assert_eq!(p.first_failure_at, None);
    assert_eq!(p.last_heartbeat_at, Some(t(10)));
    assert_eq!(p.last_error, None);

    f.sim.set_reachable("p", false);
    assert_eq!(f.cycle_at(15).await, HealthStatus::Suspect);
    assert_eq!(f.cluster.node("p").unwrap().first_failure_at, Some(t(15)));
}

/// A failed standby keeps its last reported lag.
#[tokio::test]
async fn test_failed_probe_keeps_last_lag() {
    let mut f = Fixture::new(|_| {});
    f.sim.set_lag("a", Some(1.25));
    f.cycle_at(0).await;
    assert_eq!(f.cluster.node("a").unwrap().replication_lag_seconds, Some(1.25));

    f.sim.set_reachable("a", false);
    f.sim.set_lag("a", Some(9.0));
    f.cycle_at(5).await;
    let a = f.cluster.node("a").unwrap();
    assert_eq!(a.health, HealthStatus::Suspect);
    assert_eq!(a.replication_lag_seconds, Some(1.25));
}

/// The probe error a node fails with is kept and carried into its incident.
#[tokio::test]
async fn test_failure_code_is_recorded() {
    let mut f = Fixture::new(|_| {});
    f.cycle_at(0).await;
    f.sim.set_failure_code("a", ProbeErrorCode::AuthFailure);
    f.sim.set_reachable("a", false);
    f.cycle_at(5).await;

    let a = f.cluster.node("a").unwrap();
    assert_eq!(a.health, HealthStatus::Suspect);
    assert_eq!(a.last_error, Some(ProbeErrorCode::AuthFailure));
    let incident = f
        .recorder
        .incidents()
        .into_iter()
        .find(|i| i.node_id.as_deref() == Some("a"))
        .unwrap();
    assert_eq!(incident.kind, IncidentKind::ProbeFailure);
    assert!(incident.detail.contains("authentication failed"));
}

/// A standby that cannot compute its lag reports none; the primary never
/// reports lag.
#[tokio::test]
async fn test_unknown_standby_lag_is_reported() {
    let mut f = Fixture::new(|_| {});
    f.sim.set_lag("b", None);
    f.sim.set_lag("a", Some(0.4));
    f.cycle_at(0).await;

    assert_eq!(f.cluster.node("a").unwrap().replication_lag_seconds, Some(0.4));
    assert_eq!(f.cluster.node("b").unwrap().replication_lag_seconds, None);
    assert_eq!(f.cluster.node("b").unwrap().health, HealthStatus::Healthy);
    assert_eq!(f.cluster.node("p").unwrap().replication_lag_seconds, None);
}

/// Entering Suspect or Unhealthy records a probe incident; staying there
/// does not.
#[tokio::test]
async fn test_probe_incidents_on_degradation_only() {
    let mut f = Fixture::new(|_| {});
    f.cycle_at(0).await;
    f.sim.set_reachable("b", false);
    for secs in [5, 10, 15, 20, 25] {
        f.cycle_at(secs).await;
    }

    let incidents: Vec<_> = f
        .recorder
        .incidents()
        .into_iter()
        .filter(|i| i.kind == IncidentKind::ProbeFailure)
        .collect();
    assert_eq!(incidents.len(), 2);
    assert!(incidents.iter().all(|i| i.node_id.as_deref() == Some("b")));
}

// =============================================================================
// Probe Execution
// =============================================================================

/// A probe slower than the timeout counts as a timeout failure.
#[tokio::test(start_paused = true)]
async fn test_slow_probe_times_out() {
    let mut f = Fixture::new(|c| c.probe_timeout_ms = 1_000);
    f.sim.set_probe_delay("a", Duration::from_secs(5));

    f.cycle_at(0).await;
    let a = f.cluster.node("a").unwrap();
    assert_eq!(a.health, HealthStatus::Suspect);
    assert_eq!(a.last_error, Some(ProbeErrorCode::Timeout));
    assert_eq!(f.cluster.node("b").unwrap().health, HealthStatus::Healthy);
}

/// Probes are bounded by the configured parallelism.
#[tokio::test(start_paused = true)]
async fn test_probe_parallelism_is_bounded() {
    let mut serial = Fixture::new(|c| c.max_concurrent_probes = Some(1));
    let mut parallel = Fixture::new(|_| {});
    for f in [&serial, &parallel] {
        for id in ["p", "a", "b"] {
            f.sim.set_probe_delay(id, Duration::from_millis(500));
        }
    }

    let started = tokio::time::Instant::now();
    serial.cycle_at(0).await;
    assert!(started.elapsed() >= Duration::from_millis(1_500));

    let started = tokio::time::Instant::now();
    parallel.cycle_at(0).await;
    assert!(started.elapsed() < Duration::from_millis(1_000));
}

/// A monitor built directly from parts behaves like one built from config.
#[tokio::test]
async fn test_monitor_from_parts() {
    let sim = Arc::new(SimulatedCluster::from_topology(&topology()));
    let rules = DebounceRules {
        failure_threshold: 1,
        sustained_unreachable: Duration::from_secs(60),
        rejoin_policy: RejoinPolicy::Auto,
    };
    let mut monitor = HealthMonitor::new(
        NodeProbe::new(sim.clone(), Duration::from_secs(1)),
        rules,
        2,
    );
    let mut cluster = ClusterState::from_topology(&topology(), t(0)).unwrap();
    let recorder = MetricsRecorder::new(Duration::from_secs(60));

    sim.set_reachable("b", false);
    let cycle = monitor.run_cycle(&mut cluster, &recorder, t(0)).await.unwrap();
    assert_eq!(cycle.results.len(), 3);
    assert_eq!(cluster.node("b").unwrap().health, HealthStatus::Unhealthy);
    assert!(!monitor.is_in_flight("b"));
}

// =============================================================================
// Rejoin
// =============================================================================

/// Under the manual policy a demoted node stays fenced after it recovers.
#[tokio::test]
async fn test_manual_policy_keeps_node_fenced() {
    let mut f = Fixture::new(|c| c.rejoin_policy = RejoinPolicy::Manual);
    f.cycle_at(0).await;
    f.cluster
        .apply(&Transaction::Promote(PromotionCommit {
            expected_generation: 0,
            previous_primary_id: "p".into(),
            new_primary_id: "a".into(),
            at: t(1),
        }))
        .unwrap();

    let cycle = f
        .monitor
        .run_cycle(&mut f.cluster, &f.recorder, t(5))
        .await
        .unwrap();
    assert!(cycle.rejoined.is_empty());
    let p = f.cluster.node("p").unwrap();
    assert_eq!(p.health, HealthStatus::Healthy);
    assert!(p.fenced);
}
