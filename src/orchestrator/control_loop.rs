//! Control loop
//!
//! The orchestrator owns the `ClusterState`. Each cycle:
//!
//! 1. apply queued operator commands
//! 2. probe all nodes and commit their health
//! 3. let the failover controller evaluate the committed state
//! 4. record a snapshot and publish a new status
//!
//! Cancellation is checked only between cycles, so a cycle that has started
//! a promotion always finishes committing or rejecting it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::handle::{OperatorCommand, OrchestratorHandle};
use super::status::ClusterStatus;
use crate::clock::Clock;
use crate::cluster::{ClusterState, Transaction};
use crate::config::Config;
use crate::failover::{ControllerSettings, Evaluation, FailoverController, FailoverResult};
use crate::health::{HealthMonitor, MonitorCycle};
use crate::metrics::{HealthSnapshot, Incident, IncidentKind, MetricsRecorder};
use crate::observability::{log_event, Event};
use crate::probe::NodeClient;

const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Everything one cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub commands_applied: usize,
    pub monitor: MonitorCycle,
    pub evaluation: Evaluation,
    pub status: Arc<ClusterStatus>,
}

pub struct Orchestrator {
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
    initial: ClusterState,
    cluster: ClusterState,
    monitor: HealthMonitor,
    controller: FailoverController,
    recorder: Arc<MetricsRecorder>,
    status_tx: watch::Sender<Arc<ClusterStatus>>,
    commands_tx: mpsc::Sender<OperatorCommand>,
    commands_rx: mpsc::Receiver<OperatorCommand>,
    started_at: DateTime<Utc>,
}

impl Orchestrator {
    /// Validate the configuration and build the initial cluster from it.
    pub fn new(
        config: Config,
        client: Arc<dyn NodeClient>,
        clock: Arc<dyn Clock>,
    ) -> FailoverResult<Self> {
        config.validate()?;

        let now = clock.now();
        let cluster = ClusterState::from_topology(&config.nodes, now)
            .map_err(|e| crate::failover::FailoverError::Configuration(e.to_string()))?;
        let monitor = HealthMonitor::from_config(&config, Arc::clone(&client));
        let controller = FailoverController::new(ControllerSettings::from(&config), client);
        let recorder = Arc::new(MetricsRecorder::new(config.metrics_retention()));

        let status = Arc::new(ClusterStatus::new(
            now,
            cluster.view(),
            controller.phase(),
            controller.is_degraded(),
        ));
        let (status_tx, _) = watch::channel(status);
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);

        Ok(Self {
            config: Arc::new(config),
            clock,
            initial: cluster.clone(),
            cluster,
            monitor,
            controller,
            recorder,
            status_tx,
            commands_tx,
            commands_rx,
            started_at: now,
        })
    }

    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle::new(
            self.status_tx.subscribe(),
            self.commands_tx.clone(),
            Arc::clone(&self.recorder),
            self.started_at,
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cluster(&self) -> &ClusterState {
        &self.cluster
    }

    /// The cluster as built from configuration, before any cycle ran.
    pub fn initial_cluster(&self) -> &ClusterState {
        &self.initial
    }

    pub fn controller(&self) -> &FailoverController {
        &self.controller
    }

    pub fn recorder(&self) -> &Arc<MetricsRecorder> {
        &self.recorder
    }

    pub fn status(&self) -> Arc<ClusterStatus> {
        self.status_tx.borrow().clone()
    }

    /// Run one full cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started_at = self.clock.now();
        let commands_applied = self.apply_commands(started_at);

        let monitor = match self
            .monitor
            .run_cycle(&mut self.cluster, &self.recorder, started_at)
            .await
        {
            Ok(cycle) => cycle,
            Err(err) => {
                tracing::error!(error = %err, "health commit rejected");
                self.record_internal(started_at, err.to_string());
                MonitorCycle::default()
            }
        };

        let evaluation = match self
            .controller
            .evaluate(&mut self.cluster, &self.recorder, started_at)
            .await
        {
            Ok(evaluation) => evaluation,
            Err(err) => {
                tracing::error!(error = %err, "failover evaluation failed");
                self.record_internal(started_at, err.to_string());
                Evaluation::default()
            }
        };

        let finished_at = evaluation.finished_at.unwrap_or(started_at);
        self.recorder.record_snapshot(HealthSnapshot::new(
            finished_at,
            self.cluster.view(),
            self.controller.phase(),
            self.controller.is_degraded(),
        ));
        let status = self.publish(finished_at);

        CycleReport {
            started_at,
            commands_applied,
            monitor,
            evaluation,
            status,
        }
    }

    /// Run cycles every probe interval until `cancel` fires.
    ///
    /// Returns the orchestrator so callers can inspect its final state.
    pub async fn run(mut self, cancel: CancellationToken) -> Self {
        log_event(
            Event::OrchestratorStart,
            &[
                ("nodes", &self.cluster.len().to_string()),
                ("primary", self.cluster.primary_id()),
                ("interval_ms", &self.config.probe_interval_ms.to_string()),
            ],
        );

        let mut ticker = tokio::time::interval(self.config.probe_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }

        log_event(
            Event::OrchestratorStop,
            &[
                ("generation", &self.cluster.generation().to_string()),
                ("failovers", &self.recorder.failover_count().to_string()),
            ],
        );
        self
    }

    fn apply_commands(&mut self, now: DateTime<Utc>) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.commands_rx.try_recv() {
            match command {
                OperatorCommand::Readmit { node_id } => {
                    let txn = Transaction::Readmit {
                        node_id: node_id.clone(),
                        at: now,
                    };
                    match self.cluster.apply(&txn) {
                        Ok(()) => {
                            applied += 1;
                            self.recorder.counters().increment_readmissions();
                            log_event(
                                Event::NodeReadmitted,
                                &[("node", &node_id), ("policy", "manual")],
                            );
                        }
                        Err(err) => log_event(
                            Event::CommandRejected,
                            &[("command", txn.kind()), ("error", &err.to_string())],
                        ),
                    }
                }
            }
        }
        applied
    }

    fn record_internal(&self, at: DateTime<Utc>, detail: String) {
        self.recorder.record_incident(Incident {
            timestamp: at,
            kind: IncidentKind::Internal,
            node_id: None,
            detail,
        });
    }

    fn publish(&self, at: DateTime<Utc>) -> Arc<ClusterStatus> {
        let status = Arc::new(ClusterStatus::new(
            at,
            self.cluster.view(),
            self.controller.phase(),
            self.controller.is_degraded(),
        ));
        self.status_tx.send_replace(Arc::clone(&status));
        status
    }
}
