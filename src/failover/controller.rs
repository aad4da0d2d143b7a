//! Failover controller
//!
//! Consumes the committed cluster state once per monitor cycle and moves the
//! state machine forward. Within one evaluation it keeps stepping while the
//! next transition's condition already holds, so a cycle can go from
//! SuspectedFailure all the way to Stabilizing.
//!
//! The controller is the only writer of node roles. It never touches health
//! fields.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::election::rank_candidates;
use super::errors::{FailoverError, FailoverResult};
use super::state::{FailoverPhase, FailoverState, FailureContext};
use crate::clock::elapsed;
use crate::cluster::{ClusterState, HealthStatus, Node, PromotionCommit, Transaction};
use crate::config::Config;
use crate::metrics::{FailoverEvent, HealthSnapshot, Incident, MetricsRecorder, TriggerReason};
use crate::observability::{log_event, Event};
use crate::probe::{NodeClient, PromoteOutcome};

/// Stale rejections in one failover before the election stops promoting.
pub const STALE_REJECTION_LIMIT: u32 = 3;

/// Timing and threshold knobs the controller reads.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    pub failure_threshold: u32,
    pub suspect_grace: Duration,
    pub promotion_timeout: Duration,
    pub promotion_backoff: Duration,
    pub stabilization_window: Duration,
    pub catch_up_lag_threshold_seconds: f64,
    pub catch_up_max_wait: Duration,
}

impl From<&Config> for ControllerSettings {
    fn from(config: &Config) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            suspect_grace: config.suspect_grace(),
            promotion_timeout: config.promotion_timeout(),
            promotion_backoff: config.promotion_backoff(),
            stabilization_window: config.stabilization_window(),
            catch_up_lag_threshold_seconds: config.catch_up_lag_threshold_seconds,
            catch_up_max_wait: config.catch_up_max_wait(),
        }
    }
}

/// One state change inside an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseChange {
    pub from: FailoverPhase,
    pub to: FailoverPhase,
    pub at: DateTime<Utc>,
}

/// What one evaluation did.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub transitions: Vec<PhaseChange>,
    pub failover: Option<FailoverEvent>,
    pub degraded: bool,
    /// Evaluation time plus any time spent promoting
    pub finished_at: Option<DateTime<Utc>>,
}

enum Step {
    Continue,
    Hold,
}

pub struct FailoverController {
    settings: ControllerSettings,
    client: Arc<dyn NodeClient>,
    state: FailoverState,
    degraded: bool,
    /// Candidate id -> end of its promotion backoff
    backoff: HashMap<String, DateTime<Utc>>,
    stale_rejections: u32,
}

impl FailoverController {
    pub fn new(settings: ControllerSettings, client: Arc<dyn NodeClient>) -> Self {
        Self {
            settings,
            client,
            state: FailoverState::Stable,
            degraded: false,
            backoff: HashMap::new(),
            stale_rejections: 0,
        }
    }

    pub fn state(&self) -> &FailoverState {
        &self.state
    }

    pub fn phase(&self) -> FailoverPhase {
        self.state.phase()
    }

    /// No eligible standby was found on the last election attempt, or the
    /// election stopped after repeated stale rejections.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// The election stopped promoting because our view of the generation is
    /// behind the nodes'. Only primary recovery clears it.
    pub fn is_halted(&self) -> bool {
        self.stale_rejections >= STALE_REJECTION_LIMIT
    }

    /// Stale rejections seen in the current failover.
    pub fn stale_rejections(&self) -> u32 {
        self.stale_rejections
    }

    /// End of a node's promotion backoff, if it is backed off.
    pub fn backoff_until(&self, node_id: &str) -> Option<DateTime<Utc>> {
        self.backoff.get(node_id).copied()
    }

    /// Move the state machine as far as the committed cluster state allows.
    pub async fn evaluate(
        &mut self,
        cluster: &mut ClusterState,
        recorder: &MetricsRecorder,
        now: DateTime<Utc>,
    ) -> FailoverResult<Evaluation> {
        let mut evaluation = Evaluation::default();
        let mut now = now;
        let max_steps = 6 + 2 * cluster.len();

        for _ in 0..max_steps {
            match self
                .step(cluster, recorder, &mut now, &mut evaluation)
                .await?
            {
                Step::Continue => continue,
                Step::Hold => break,
            }
        }

        evaluation.degraded = self.degraded;
        evaluation.finished_at = Some(now);
        Ok(evaluation)
    }

    async fn step(
        &mut self,
        cluster: &mut ClusterState,
        recorder: &MetricsRecorder,
        now: &mut DateTime<Utc>,
        evaluation: &mut Evaluation,
    ) -> FailoverResult<Step> {
        match self.state.clone() {
            FailoverState::Stable => {
                let Some(primary) = cluster.primary() else {
                    return Ok(Step::Hold);
                };
                if primary.health != HealthStatus::Unhealthy {
                    return Ok(Step::Hold);
                }

                let failure = FailureContext {
                    primary_id: primary.id.clone(),
                    trigger: self.trigger_for(primary),
                    failure_started_at: primary.first_failure_at.unwrap_or(*now),
                    suspected_at: *now,
                };
                log_event(
                    Event::FailoverSuspected,
                    &[
                        ("primary", &failure.primary_id),
                        ("trigger", failure.trigger.as_str()),
                    ],
                );
                let next = self.state.clone().suspect(failure)?;
                self.enter(next, cluster, recorder, *now, evaluation);
                Ok(Step::Continue)
            }

            FailoverState::SuspectedFailure { failure } => {
                if self.primary_recovered(cluster, &failure) {
                    log_event(Event::FailoverAbandoned, &[("primary", &failure.primary_id)]);
                    self.stale_rejections = 0;
                    let next = self.state.clone().recover()?;
                    self.enter(next, cluster, recorder, *now, evaluation);
                    return Ok(Step::Hold);
                }
                if elapsed(failure.suspected_at, *now) < self.settings.suspect_grace {
                    return Ok(Step::Hold);
                }
                let next = self.state.clone().begin_election(*now)?;
                self.enter(next, cluster, recorder, *now, evaluation);
                Ok(Step::Continue)
            }

            FailoverState::ElectingSuccessor {
                failure,
                election_started_at,
            } => {
                if self.primary_recovered(cluster, &failure) {
                    log_event(Event::FailoverAbandoned, &[("primary", &failure.primary_id)]);
                    self.degraded = false;
                    self.stale_rejections = 0;
                    let next = self.state.clone().recover()?;
                    self.enter(next, cluster, recorder, *now, evaluation);
                    return Ok(Step::Hold);
                }

                if self.is_halted() {
                    recorder.counters().increment_degraded_cycles();
                    log_event(
                        Event::ClusterDegraded,
                        &[
                            ("failed_primary", &failure.primary_id),
                            ("reason", "stale_generation"),
                            ("stale_rejections", &self.stale_rejections.to_string()),
                        ],
                    );
                    return Ok(Step::Hold);
                }

                let at = *now;
                self.backoff.retain(|_, until| *until > at);
                let backoff = &self.backoff;
                let candidates = rank_candidates(cluster.nodes(), |id| backoff.contains_key(id));

                let Some(best) = candidates.into_iter().next() else {
                    self.mark_degraded(recorder, &failure, *now);
                    return Ok(Step::Hold);
                };
                self.degraded = false;

                let lagging = best
                    .lag_seconds
                    .map_or(true, |lag| lag > self.settings.catch_up_lag_threshold_seconds);
                if lagging && elapsed(election_started_at, *now) < self.settings.catch_up_max_wait {
                    let lag = best
                        .lag_seconds
                        .map(|l| l.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    log_event(
                        Event::CatchUpWait,
                        &[("candidate", &best.node_id), ("lag_seconds", &lag)],
                    );
                    return Ok(Step::Hold);
                }

                let generation = cluster.generation();
                log_event(
                    Event::PromotionStart,
                    &[
                        ("candidate", &best.node_id),
                        ("expected_generation", &generation.to_string()),
                    ],
                );
                let next = self
                    .state
                    .clone()
                    .begin_promotion(&best.node_id, generation, *now)?;
                self.enter(next, cluster, recorder, *now, evaluation);
                Ok(Step::Continue)
            }

            FailoverState::Promoting {
                failure,
                candidate_id,
                expected_generation,
                started_at,
                ..
            } => {
                let data_loss = cluster
                    .node(&candidate_id)
                    .and_then(|n| n.replication_lag_seconds);

                let clock = tokio::time::Instant::now();
                let outcome = tokio::time::timeout(
                    self.settings.promotion_timeout,
                    self.client.promote(&candidate_id, expected_generation),
                )
                .await;
                let duration = clock.elapsed();
                let committed_at = started_at
                    + chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
                *now = (*now).max(committed_at);

                let result = match outcome {
                    Err(_) => Err(FailoverError::PromotionFailure {
                        node_id: candidate_id.clone(),
                        reason: format!(
                            "timed out after {}ms",
                            self.settings.promotion_timeout.as_millis()
                        ),
                    }),
                    Ok(PromoteOutcome::Failed { reason }) => Err(FailoverError::PromotionFailure {
                        node_id: candidate_id.clone(),
                        reason,
                    }),
                    Ok(PromoteOutcome::StaleGeneration { current }) => {
                        Err(FailoverError::StalePromotion {
                            node_id: candidate_id.clone(),
                            expected: expected_generation,
                            current,
                        })
                    }
                    Ok(PromoteOutcome::Promoted) => {
                        let commit = PromotionCommit {
                            expected_generation,
                            previous_primary_id: failure.primary_id.clone(),
                            new_primary_id: candidate_id.clone(),
                            at: committed_at,
                        };
                        match cluster.apply(&Transaction::Promote(commit)) {
                            Ok(()) => Ok(()),
                            Err(e) if e.is_stale() => Err(FailoverError::StalePromotion {
                                node_id: candidate_id.clone(),
                                expected: expected_generation,
                                current: cluster.generation(),
                            }),
                            Err(e) => Err(FailoverError::PromotionFailure {
                                node_id: candidate_id.clone(),
                                reason: e.to_string(),
                            }),
                        }
                    }
                };

                match result {
                    Ok(()) => {
                        let event = recorder.record_failover(FailoverEvent {
                            id: Uuid::new_v4(),
                            timestamp: committed_at,
                            generation: cluster.generation(),
                            previous_primary_id: failure.primary_id.clone(),
                            new_primary_id: candidate_id.clone(),
                            trigger: failure.trigger,
                            detection_latency_ms: millis(elapsed(
                                failure.failure_started_at,
                                started_at,
                            )),
                            promotion_duration_ms: millis(duration),
                            data_loss_estimate_seconds: data_loss,
                        });
                        recorder.counters().increment_failovers();
                        self.backoff.remove(&candidate_id);
                        self.stale_rejections = 0;
                        log_event(
                            Event::FailoverComplete,
                            &[
                                ("previous_primary", &event.previous_primary_id),
                                ("new_primary", &event.new_primary_id),
                                ("generation", &event.generation.to_string()),
                                ("rto_ms", &event.rto_ms().to_string()),
                            ],
                        );
                        evaluation.failover = Some(event);

                        let next = self.state.clone().promotion_committed(committed_at)?;
                        self.enter(next, cluster, recorder, committed_at, evaluation);
                        Ok(Step::Continue)
                    }
                    Err(err @ FailoverError::StalePromotion { .. }) => {
                        recorder.record_incident(Incident::from_error(
                            committed_at,
                            Some(&candidate_id),
                            &err,
                        ));
                        recorder.counters().increment_stale_promotions();
                        let until = self.back_off(&candidate_id, committed_at);
                        self.stale_rejections += 1;
                        log_event(
                            Event::PromotionStale,
                            &[
                                ("candidate", &candidate_id),
                                ("error", &err.to_string()),
                                ("backoff_until", &until.to_rfc3339()),
                                ("stale_rejections", &self.stale_rejections.to_string()),
                            ],
                        );
                        if self.is_halted() {
                            self.halt(recorder, &failure, committed_at);
                        }
                        let next = self.state.clone().abort_promotion()?;
                        self.enter(next, cluster, recorder, committed_at, evaluation);
                        Ok(Step::Hold)
                    }
                    Err(err) => {
                        recorder.record_incident(Incident::from_error(
                            committed_at,
                            Some(&candidate_id),
                            &err,
                        ));
                        recorder.counters().increment_promotion_failures();
                        let until = self.back_off(&candidate_id, committed_at);
                        log_event(
                            Event::PromotionFailed,
                            &[
                                ("candidate", &candidate_id),
                                ("error", &err.to_string()),
                                ("backoff_until", &until.to_rfc3339()),
                            ],
                        );
                        let next = self.state.clone().abort_promotion()?;
                        self.enter(next, cluster, recorder, committed_at, evaluation);
                        Ok(Step::Continue)
                    }
                }
            }

            FailoverState::Stabilizing {
                primary_id,
                healthy_since,
            } => {
                let Some(primary) = cluster.node(&primary_id) else {
                    return Ok(Step::Hold);
                };
                match primary.health {
                    HealthStatus::Unhealthy => {
                        let failure = FailureContext {
                            primary_id: primary.id.clone(),
                            trigger: TriggerReason::StabilizationFailure,
                            failure_started_at: primary.first_failure_at.unwrap_or(*now),
                            suspected_at: *now,
                        };
                        log_event(
                            Event::FailoverSuspected,
                            &[
                                ("primary", &failure.primary_id),
                                ("trigger", failure.trigger.as_str()),
                            ],
                        );
                        let next = self.state.clone().suspect(failure)?;
                        self.enter(next, cluster, recorder, *now, evaluation);
                        Ok(Step::Continue)
                    }
                    HealthStatus::Healthy => {
                        if elapsed(healthy_since, *now) < self.settings.stabilization_window {
                            return Ok(Step::Hold);
                        }
                        log_event(Event::ClusterStabilized, &[("primary", &primary_id)]);
                        let next = self.state.clone().stabilized()?;
                        self.enter(next, cluster, recorder, *now, evaluation);
                        Ok(Step::Hold)
                    }
                    HealthStatus::Suspect | HealthStatus::Unknown => {
                        // Window restarts once the primary is healthy again.
                        self.state = FailoverState::Stabilizing {
                            primary_id,
                            healthy_since: *now,
                        };
                        Ok(Step::Hold)
                    }
                }
            }
        }
    }

    fn trigger_for(&self, primary: &Node) -> TriggerReason {
        if primary.consecutive_failed_probes >= self.settings.failure_threshold {
            TriggerReason::ConsecutiveProbeFailures
        } else {
            TriggerReason::SustainedUnreachable
        }
    }

    fn primary_recovered(&self, cluster: &ClusterState, failure: &FailureContext) -> bool {
        cluster
            .node(&failure.primary_id)
            .is_some_and(|n| n.is_primary() && n.health == HealthStatus::Healthy)
    }

    fn back_off(&mut self, candidate_id: &str, at: DateTime<Utc>) -> DateTime<Utc> {
        let until = at
            + chrono::Duration::from_std(self.settings.promotion_backoff)
                .unwrap_or(chrono::Duration::zero());
        self.backoff.insert(candidate_id.to_string(), until);
        until
    }

    fn halt(&mut self, recorder: &MetricsRecorder, failure: &FailureContext, now: DateTime<Utc>) {
        self.degraded = true;
        recorder.record_incident(Incident::from_error(
            now,
            Some(&failure.primary_id),
            &FailoverError::PromotionHalted {
                rejections: self.stale_rejections,
            },
        ));
        recorder.counters().increment_degraded_cycles();
        log_event(
            Event::ClusterDegraded,
            &[
                ("failed_primary", &failure.primary_id),
                ("reason", "stale_generation"),
                ("stale_rejections", &self.stale_rejections.to_string()),
            ],
        );
    }

    fn mark_degraded(
        &mut self,
        recorder: &MetricsRecorder,
        failure: &FailureContext,
        now: DateTime<Utc>,
    ) {
        if !self.degraded {
            self.degraded = true;
            recorder.record_incident(Incident::from_error(
                now,
                Some(&failure.primary_id),
                &FailoverError::NoHealthyCandidate,
            ));
        }
        recorder.counters().increment_degraded_cycles();
        log_event(
            Event::ClusterDegraded,
            &[
                ("failed_primary", &failure.primary_id),
                ("reason", "no_candidate"),
                ("backed_off", &self.backoff.len().to_string()),
            ],
        );
    }

    fn enter(
        &mut self,
        next: FailoverState,
        cluster: &ClusterState,
        recorder: &MetricsRecorder,
        at: DateTime<Utc>,
        evaluation: &mut Evaluation,
    ) {
        let from = self.state.phase();
        let to = next.phase();
        self.state = next;

        log_event(
            Event::FailoverPhaseChanged,
            &[("from", from.as_str()), ("to", to.as_str())],
        );
        recorder.record_snapshot(HealthSnapshot::new(at, cluster.view(), to, self.degraded));
        evaluation.transitions.push(PhaseChange { from, to, at });
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{HealthUpdate, NodeRole};
    use crate::config::NodeConfig;
    use crate::probe::SimulatedCluster;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn topology() -> Vec<NodeConfig> {
        vec![
            NodeConfig::new("p", "us-west-2", "p:5432", NodeRole::Primary),
            NodeConfig::new("a", "us-east-1", "a:5432", NodeRole::Standby),
            NodeConfig::new("b", "eu-west-1", "b:5432", NodeRole::Standby),
        ]
    }

    fn settings() -> ControllerSettings {
        ControllerSettings {
            failure_threshold: 3,
            suspect_grace: Duration::from_secs(5),
            promotion_timeout: Duration::from_secs(30),
            promotion_backoff: Duration::from_secs(30),
            stabilization_window: Duration::from_secs(5),
            catch_up_lag_threshold_seconds: 1.0,
            catch_up_max_wait: Duration::from_secs(30),
        }
    }

    fn set_health(
        cluster: &mut ClusterState,
        id: &str,
        health: HealthStatus,
        lag: Option<f64>,
        failures: u32,
        at: DateTime<Utc>,
    ) {
        let update = HealthUpdate {
            node_id: id.into(),
            health,
            consecutive_failed_probes: failures,
            first_failure_at: (failures > 0).then_some(at),
            last_heartbeat_at: (failures == 0).then_some(at),
            replication_lag_seconds: lag,
            last_probe_latency_ms: Some(1),
            last_error: None,
            unfence: false,
        };
        cluster
            .apply(&Transaction::RecordHealth {
                updates: vec![update],
                at,
            })
            .unwrap();
    }

    fn healthy_cluster(lag_a: f64, lag_b: f64) -> ClusterState {
        let mut cluster = ClusterState::from_topology(&topology(), t0()).unwrap();
        set_health(&mut cluster, "p", HealthStatus::Healthy, None, 0, t0());
        set_health(&mut cluster, "a", HealthStatus::Healthy, Some(lag_a), 0, t0());
        set_health(&mut cluster, "b", HealthStatus::Healthy, Some(lag_b), 0, t0());
        cluster
    }

    fn controller(sim: &Arc<SimulatedCluster>) -> FailoverController {
        let client: Arc<dyn NodeClient> = sim.clone();
        FailoverController::new(settings(), client)
    }

    fn sim() -> Arc<SimulatedCluster> {
        Arc::new(SimulatedCluster::from_topology(&topology()))
    }

    #[tokio::test]
    async fn test_suspect_primary_is_not_enough() {
        let sim = sim();
        let mut ctl = controller(&sim);
        let recorder = MetricsRecorder::new(Duration::from_secs(3600));
        let mut cluster = healthy_cluster(0.0, 0.0);
        set_health(&mut cluster, "p", HealthStatus::Suspect, None, 1, t0());

        let eval = ctl.evaluate(&mut cluster, &recorder, t0()).await.unwrap();
        assert!(eval.transitions.is_empty());
        assert_eq!(ctl.phase(), FailoverPhase::Stable);
    }

    #[tokio::test]
    async fn test_grace_window_then_promotion() {
        let sim = sim();
        let mut ctl = controller(&sim);
        let recorder = MetricsRecorder::new(Duration::from_secs(3600));
        let mut cluster = healthy_cluster(2.0, 0.5);
        sim.set_lag("a", Some(2.0));
        sim.set_lag("b", Some(0.5));
        set_health(&mut cluster, "p", HealthStatus::Unhealthy, None, 3, t0());

        ctl.evaluate(&mut cluster, &recorder, t0()).await.unwrap();
        assert_eq!(ctl.phase(), FailoverPhase::SuspectedFailure);

        let later = t0() + chrono::Duration::seconds(5);
        let eval = ctl.evaluate(&mut cluster, &recorder, later).await.unwrap();
        let event = eval.failover.expect("failover");
        assert_eq!(event.new_primary_id, "b");
        assert_eq!(event.previous_primary_id, "p");
        assert_eq!(event.generation, 1);
        assert_eq!(event.trigger, TriggerReason::ConsecutiveProbeFailures);
        assert_eq!(event.data_loss_estimate_seconds, Some(0.5));
        assert_eq!(event.detection_latency_ms, 5_000);
        assert_eq!(ctl.phase(), FailoverPhase::Stabilizing);
        assert_eq!(cluster.primary_id(), "b");
        assert!(sim.is_primary("b"));
    }

    #[tokio::test]
    async fn test_primary_recovery_abandons_failover() {
        let sim = sim();
        let mut ctl = controller(&sim);
        let recorder = MetricsRecorder::new(Duration::from_secs(3600));
        let mut cluster = healthy_cluster(0.0, 0.0);
        set_health(&mut cluster, "p", HealthStatus::Unhealthy, None, 3, t0());
        ctl.evaluate(&mut cluster, &recorder, t0()).await.unwrap();

        set_health(&mut cluster, "p", HealthStatus::Healthy, None, 0, t0());
        ctl.evaluate(&mut cluster, &recorder, t0() + chrono::Duration::seconds(5))
            .await
            .unwrap();
        assert_eq!(ctl.phase(), FailoverPhase::Stable);
        assert_eq!(recorder.failover_count(), 0);
        assert_eq!(cluster.generation(), 0);
    }

    #[tokio::test]
    async fn test_no_candidate_degrades_once() {
        let sim = sim();
        let mut ctl = controller(&sim);
        let recorder = MetricsRecorder::new(Duration::from_secs(3600));
        let mut cluster = healthy_cluster(0.0, 0.0);
        set_health(&mut cluster, "p", HealthStatus::Unhealthy, None, 3, t0());
        set_health(&mut cluster, "a", HealthStatus::Unhealthy, Some(0.0), 3, t0());
        set_health(&mut cluster, "b", HealthStatus::Suspect, Some(0.0), 1, t0());

        for i in 0..3 {
            let at = t0() + chrono::Duration::seconds(5 * i);
            ctl.evaluate(&mut cluster, &recorder, at).await.unwrap();
        }
        assert!(ctl.is_degraded());
        assert_eq!(ctl.phase(), FailoverPhase::ElectingSuccessor);
        let incidents = recorder.incidents();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].kind, crate::metrics::IncidentKind::NoHealthyCandidate);
        assert_eq!(recorder.counters().snapshot().degraded_cycles, 2);

        set_health(&mut cluster, "b", HealthStatus::Healthy, Some(0.0), 0, t0());
        let eval = ctl
            .evaluate(&mut cluster, &recorder, t0() + chrono::Duration::seconds(15))
            .await
            .unwrap();
        assert!(!eval.degraded);
        assert_eq!(eval.failover.map(|e| e.new_primary_id), Some("b".to_string()));
    }

    #[tokio::test]
    async fn test_lagging_candidate_waits_for_catch_up() {
        let sim = sim();
        let mut ctl = controller(&sim);
        let recorder = MetricsRecorder::new(Duration::from_secs(3600));
        let mut cluster = healthy_cluster(4.0, 6.0);
        set_health(&mut cluster, "p", HealthStatus::Unhealthy, None, 3, t0());
        ctl.evaluate(&mut cluster, &recorder, t0()).await.unwrap();

        let election = t0() + chrono::Duration::seconds(5);
        ctl.evaluate(&mut cluster, &recorder, election).await.unwrap();
        assert_eq!(ctl.phase(), FailoverPhase::ElectingSuccessor);

        // Caught up within the wait.
        set_health(&mut cluster, "a", HealthStatus::Healthy, Some(0.8), 0, election);
        let eval = ctl
            .evaluate(&mut cluster, &recorder, election + chrono::Duration::seconds(10))
            .await
            .unwrap();
        assert_eq!(eval.failover.map(|e| e.new_primary_id), Some("a".to_string()));
    }

    #[tokio::test]
    async fn test_catch_up_wait_is_bounded() {
        let sim = sim();
        let mut ctl = controller(&sim);
        let recorder = MetricsRecorder::new(Duration::from_secs(3600));
        let mut cluster = healthy_cluster(4.0, 6.0);
        set_health(&mut cluster, "p", HealthStatus::Unhealthy, None, 3, t0());
        ctl.evaluate(&mut cluster, &recorder, t0()).await.unwrap();
        let election = t0() + chrono::Duration::seconds(5);
        ctl.evaluate(&mut cluster, &recorder, election).await.unwrap();

        let eval = ctl
            .evaluate(&mut cluster, &recorder, election + chrono::Duration::seconds(30))
            .await
            .unwrap();
        let event = eval.failover.expect("promotes after max wait");
        assert_eq!(event.new_primary_id, "a");
        assert_eq!(event.data_loss_estimate_seconds, Some(4.0));
    }

    #[tokio::test]
    async fn test_failed_promotion_tries_next_candidate() {
        let sim = sim();
        sim.fail_promotions("a", Some("disk full"));
        let mut ctl = controller(&sim);
        let recorder = MetricsRecorder::new(Duration::from_secs(3600));
        let mut cluster = healthy_cluster(0.0, 0.3);
        set_health(&mut cluster, "p", HealthStatus::Unhealthy, None, 3, t0());
        ctl.evaluate(&mut cluster, &recorder, t0()).await.unwrap();

        let at = t0() + chrono::Duration::seconds(5);
        let eval = ctl.evaluate(&mut cluster, &recorder, at).await.unwrap();
        assert_eq!(eval.failover.map(|e| e.new_primary_id), Some("b".to_string()));
        assert!(ctl.backoff_until("a").is_some());

        let incidents = recorder.incidents();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].kind, crate::metrics::IncidentKind::PromotionFailure);
        assert!(incidents[0].detail.contains("disk full"));
    }

    #[tokio::test]
    async fn test_stale_generation_blocks_promotion() {
        let sim = sim();
        sim.set_generation(4);
        let mut ctl = controller(&sim);
        let recorder = MetricsRecorder::new(Duration::from_secs(3600));
        let mut cluster = healthy_cluster(0.0, 0.0);
        set_health(&mut cluster, "p", HealthStatus::Unhealthy, None, 3, t0());
        ctl.evaluate(&mut cluster, &recorder, t0()).await.unwrap();

        let eval = ctl
            .evaluate(&mut cluster, &recorder, t0() + chrono::Duration::seconds(5))
            .await
            .unwrap();
        assert!(eval.failover.is_none());
        assert_eq!(ctl.phase(), FailoverPhase::ElectingSuccessor);
        assert_eq!(cluster.primary_id(), "p");
        assert_eq!(cluster.generation(), 0);
        assert_eq!(
            recorder.incidents()[0].kind,
            crate::metrics::IncidentKind::StalePromotion
        );
        assert!(ctl.backoff_until("a").is_some());
        assert_eq!(ctl.stale_rejections(), 1);
    }

    #[tokio::test]
    async fn test_repeated_stale_rejections_halt_election() {
        use crate::metrics::IncidentKind;

        let sim = sim();
        sim.set_generation(4);
        let mut ctl = controller(&sim);
        let recorder = MetricsRecorder::new(Duration::from_secs(3600));
        let mut cluster = healthy_cluster(0.0, 0.0);
        set_health(&mut cluster, "p", HealthStatus::Unhealthy, None, 3, t0());

        // a at 5s, b at 10s, then a again once its backoff ends
        for i in 0..25 {
            let at = t0() + chrono::Duration::seconds(5 * i);
            ctl.evaluate(&mut cluster, &recorder, at).await.unwrap();
        }

        assert!(ctl.is_halted());
        assert!(ctl.is_degraded());
        assert_eq!(ctl.stale_rejections(), STALE_REJECTION_LIMIT);
        assert_eq!(ctl.phase(), FailoverPhase::ElectingSuccessor);
        assert_eq!(cluster.generation(), 0);
        assert_eq!(recorder.counters().snapshot().stale_promotions, 3);

        let count = |kind: IncidentKind| {
            recorder
                .incidents()
                .iter()
                .filter(|i| i.kind == kind)
                .count()
        };
        assert_eq!(count(IncidentKind::StalePromotion), 3);
        assert_eq!(count(IncidentKind::PromotionHalted), 1);
        assert_eq!(count(IncidentKind::NoHealthyCandidate), 1);

        set_health(&mut cluster, "p", HealthStatus::Healthy, None, 0, t0());
        let eval = ctl
            .evaluate(&mut cluster, &recorder, t0() + chrono::Duration::seconds(130))
            .await
            .unwrap();
        assert!(!eval.degraded);
        assert!(!ctl.is_halted());
        assert_eq!(ctl.phase(), FailoverPhase::Stable);
    }

    #[tokio::test]
    async fn test_stabilization_completes() {
        let sim = sim();
        let mut ctl = controller(&sim);
        let recorder = MetricsRecorder::new(Duration::from_secs(3600));
        let mut cluster = healthy_cluster(0.0, 0.0);
        set_health(&mut cluster, "p", HealthStatus::Unhealthy, None, 3, t0());
        ctl.evaluate(&mut cluster, &recorder, t0()).await.unwrap();
        let at = t0() + chrono::Duration::seconds(5);
        ctl.evaluate(&mut cluster, &recorder, at).await.unwrap();
        assert_eq!(ctl.phase(), FailoverPhase::Stabilizing);

        ctl.evaluate(&mut cluster, &recorder, at + chrono::Duration::seconds(2))
            .await
            .unwrap();
        assert_eq!(ctl.phase(), FailoverPhase::Stabilizing);
        ctl.evaluate(&mut cluster, &recorder, at + chrono::Duration::seconds(6))
            .await
            .unwrap();
        assert_eq!(ctl.phase(), FailoverPhase::Stable);
    }

    #[tokio::test]
    async fn test_every_transition_recorded_as_snapshot() {
        let sim = sim();
        let mut ctl = controller(&sim);
        let recorder = MetricsRecorder::new(Duration::from_secs(3600));
        let mut cluster = healthy_cluster(0.0, 0.0);
        set_health(&mut cluster, "p", HealthStatus::Unhealthy, None, 3, t0());
        ctl.evaluate(&mut cluster, &recorder, t0()).await.unwrap();
        let eval = ctl
            .evaluate(&mut cluster, &recorder, t0() + chrono::Duration::seconds(5))
            .await
            .unwrap();

        let phases: Vec<FailoverPhase> = eval.transitions.iter().map(|t| t.to).collect();
        assert_eq!(
            phases,
            vec![
                FailoverPhase::ElectingSuccessor,
                FailoverPhase::Promoting,
                FailoverPhase::Stabilizing
            ]
        );
        let snapshots = recorder.snapshots(None);
        assert_eq!(snapshots.len(), 4);
        assert!(snapshots.iter().all(|s| s.primary_count() == 1));
    }
}
