//! Health monitor
//!
//! One cycle probes every node concurrently, waits for all of them, then
//! commits the classified results as a single `RecordHealth` transaction.
//!
//! Probe parallelism is bounded by a semaphore. A node whose previous probe
//! is still running (its cycle was cancelled before the join) is skipped:
//! no observation is recorded for it this cycle, and the late result of the
//! old probe is discarded when it arrives. Probe tasks are matched to their
//! cycle by task id, so a late panic from an old probe is never counted
//! against the current cycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};

use super::classifier::{classify, DebounceRules};
use crate::cluster::{ClusterResult, ClusterState, HealthStatus, Transaction};
use crate::config::Config;
use crate::failover::FailoverError;
use crate::metrics::{Incident, MetricsRecorder};
use crate::observability::{log_event, Event};
use crate::probe::{NodeClient, NodeProbe, ProbeErrorCode, ProbeResult};

/// A node whose classification changed this cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthChange {
    pub node_id: String,
    pub from: HealthStatus,
    pub to: HealthStatus,
}

/// What one monitor cycle observed and committed.
#[derive(Debug, Clone, Default)]
pub struct MonitorCycle {
    pub cycle: u64,
    pub results: Vec<ProbeResult>,
    pub skipped: Vec<String>,
    pub changes: Vec<HealthChange>,
    /// Fenced nodes released by automatic rejoin
    pub rejoined: Vec<String>,
}

/// Clears a node's in-flight flag however its probe task ends.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct HealthMonitor {
    probe: Arc<NodeProbe>,
    rules: DebounceRules,
    semaphore: Arc<Semaphore>,
    in_flight: HashMap<String, Arc<AtomicBool>>,
    tasks: JoinSet<Option<ProbeResult>>,
    cycle: u64,
}

impl HealthMonitor {
    pub fn new(probe: NodeProbe, rules: DebounceRules, max_concurrent_probes: usize) -> Self {
        Self {
            probe: Arc::new(probe),
            rules,
            semaphore: Arc::new(Semaphore::new(max_concurrent_probes.max(1))),
            in_flight: HashMap::new(),
            tasks: JoinSet::new(),
            cycle: 0,
        }
    }

    pub fn from_config(config: &Config, client: Arc<dyn NodeClient>) -> Self {
        Self::new(
            NodeProbe::new(client, config.probe_timeout()),
            DebounceRules::from(config),
            config.probe_parallelism(),
        )
    }

    pub fn rules(&self) -> &DebounceRules {
        &self.rules
    }

    /// Whether a probe of `node_id` is still running.
    pub fn is_in_flight(&self, node_id: &str) -> bool {
        self.in_flight
            .get(node_id)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Probe every node, classify, and commit.
    ///
    /// Cancel-safe: if the returned future is dropped before the commit,
    /// the cluster is unchanged and the probes still running are skipped by
    /// the next cycle.
    pub async fn run_cycle(
        &mut self,
        cluster: &mut ClusterState,
        recorder: &MetricsRecorder,
        now: DateTime<Utc>,
    ) -> ClusterResult<MonitorCycle> {
        self.cycle += 1;
        let cycle = self.cycle;
        let mut report = MonitorCycle {
            cycle,
            ..MonitorCycle::default()
        };

        // Results of probes from cancelled cycles are stale.
        while self.tasks.try_join_next().is_some() {}

        // Task id -> node, for this cycle's probes only
        let mut pending: HashMap<Id, String> = HashMap::new();
        for node in cluster.nodes() {
            let flag = self
                .in_flight
                .entry(node.id.clone())
                .or_insert_with(|| Arc::new(AtomicBool::new(false)))
                .clone();
            if flag.swap(true, Ordering::AcqRel) {
                log_event(Event::ProbeSkipped, &[("node", &node.id)]);
                report.skipped.push(node.id.clone());
                continue;
            }

            let guard = InFlightGuard(flag);
            let probe = Arc::clone(&self.probe);
            let semaphore = Arc::clone(&self.semaphore);
            let node_id = node.id.clone();
            let handle = self.tasks.spawn(async move {
                let _guard = guard;
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                Some(probe.probe(&node_id).await)
            });
            pending.insert(handle.id(), node.id.clone());
        }

        while !pending.is_empty() {
            match self.tasks.join_next_with_id().await {
                Some(Ok((id, result))) => {
                    if pending.remove(&id).is_none() {
                        continue;
                    }
                    if let Some(result) = result {
                        report.results.push(result);
                    }
                }
                Some(Err(err)) => {
                    let Some(node_id) = pending.remove(&err.id()) else {
                        tracing::warn!(error = %err, "probe task from an earlier cycle failed");
                        continue;
                    };
                    tracing::error!(node = %node_id, cycle, error = %err, "probe task failed");
                    report.skipped.push(node_id);
                }
                None => break,
            }
        }
        report.results.sort_by(|a, b| a.node_id.cmp(&b.node_id));

        let mut updates = Vec::with_capacity(report.results.len());
        for result in &report.results {
            let Some(node) = cluster.node(&result.node_id) else {
                continue;
            };
            let update = classify(node, result, now, &self.rules);
            if update.health != node.health {
                report.changes.push(HealthChange {
                    node_id: node.id.clone(),
                    from: node.health,
                    to: update.health,
                });
            }
            if update.unfence {
                report.rejoined.push(node.id.clone());
            }
            updates.push(update);
        }

        cluster.apply(&Transaction::RecordHealth { updates, at: now })?;

        self.after_commit(&report, recorder, now);
        Ok(report)
    }

    fn after_commit(&self, report: &MonitorCycle, recorder: &MetricsRecorder, now: DateTime<Utc>) {
        for change in &report.changes {
            let error = report
                .results
                .iter()
                .find(|r| r.node_id == change.node_id)
                .and_then(|r| r.error);
            log_event(
                Event::NodeHealthChanged,
                &[
                    ("node", &change.node_id),
                    ("from", change.from.as_str()),
                    ("to", change.to.as_str()),
                    ("error", error.map(|e| e.as_str()).unwrap_or("none")),
                ],
            );

            if matches!(change.to, HealthStatus::Suspect | HealthStatus::Unhealthy) {
                let code = error.unwrap_or(ProbeErrorCode::ProtocolError);
                let err = FailoverError::from_probe(&change.node_id, code);
                recorder.record_incident(Incident::from_error(now, Some(&change.node_id), &err));
            }
        }

        for node_id in &report.rejoined {
            log_event(
                Event::NodeReadmitted,
                &[("node", node_id), ("policy", "auto")],
            );
            recorder.counters().increment_readmissions();
        }

        let failed = report.results.iter().filter(|r| !r.reachable).count();
        let counters = recorder.counters();
        counters.increment_monitor_cycles();
        counters.add_probes(report.results.len() as u64, failed as u64);
        counters.add_probes_skipped(report.skipped.len() as u64);

        log_event(
            Event::MonitorCycle,
            &[
                ("cycle", &report.cycle.to_string()),
                ("probed", &report.results.len().to_string()),
                ("failed", &failed.to_string()),
                ("skipped", &report.skipped.len().to_string()),
            ],
        );
    }
}
