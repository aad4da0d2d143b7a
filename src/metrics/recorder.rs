//! Append-only history
//!
//! Each history keeps strictly increasing timestamps: a record whose
//! timestamp does not move past the previous one is advanced by 1µs.
//! Snapshots and incidents older than the retention window (measured from
//! the newest record) are dropped; failover events are never dropped.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::event::{FailoverEvent, HealthSnapshot, Incident};
use super::report::RecoveryReport;
use crate::observability::MetricsRegistry;

#[derive(Debug, Default)]
struct History {
    snapshots: VecDeque<HealthSnapshot>,
    failovers: Vec<FailoverEvent>,
    incidents: VecDeque<Incident>,
}

#[derive(Debug)]
pub struct MetricsRecorder {
    retention: chrono::Duration,
    history: RwLock<History>,
    counters: MetricsRegistry,
}

fn next_timestamp(last: Option<DateTime<Utc>>, proposed: DateTime<Utc>) -> DateTime<Utc> {
    match last {
        Some(last) if proposed <= last => last + chrono::Duration::microseconds(1),
        _ => proposed,
    }
}

impl MetricsRecorder {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention: chrono::Duration::from_std(retention)
                .unwrap_or_else(|_| chrono::Duration::days(365)),
            history: RwLock::new(History::default()),
            counters: MetricsRegistry::new(),
        }
    }

    pub fn counters(&self) -> &MetricsRegistry {
        &self.counters
    }

    pub fn record_snapshot(&self, mut snapshot: HealthSnapshot) {
        let mut history = self.history.write();
        snapshot.timestamp = next_timestamp(
            history.snapshots.back().map(|s| s.timestamp),
            snapshot.timestamp,
        );
        let cutoff = snapshot.timestamp - self.retention;
        history.snapshots.push_back(snapshot);
        while history
            .snapshots
            .front()
            .is_some_and(|s| s.timestamp < cutoff)
        {
            history.snapshots.pop_front();
        }
    }

    /// Append a failover event; returns the event as stored.
    pub fn record_failover(&self, mut event: FailoverEvent) -> FailoverEvent {
        let mut history = self.history.write();
        event.timestamp = next_timestamp(
            history.failovers.last().map(|e| e.timestamp),
            event.timestamp,
        );
        history.failovers.push(event.clone());
        event
    }

    pub fn record_incident(&self, mut incident: Incident) {
        let mut history = self.history.write();
        incident.timestamp = next_timestamp(
            history.incidents.back().map(|i| i.timestamp),
            incident.timestamp,
        );
        let cutoff = incident.timestamp - self.retention;
        history.incidents.push_back(incident);
        while history
            .incidents
            .front()
            .is_some_and(|i| i.timestamp < cutoff)
        {
            history.incidents.pop_front();
        }
    }

    /// Most recent snapshots, oldest first; all retained ones when `limit` is `None`.
    pub fn snapshots(&self, limit: Option<usize>) -> Vec<HealthSnapshot> {
        let history = self.history.read();
        let skip = limit
            .map(|l| history.snapshots.len().saturating_sub(l))
            .unwrap_or(0);
        history.snapshots.iter().skip(skip).cloned().collect()
    }

    pub fn latest_snapshot(&self) -> Option<HealthSnapshot> {
        self.history.read().snapshots.back().cloned()
    }

    pub fn failovers(&self) -> Vec<FailoverEvent> {
        self.history.read().failovers.clone()
    }

    pub fn last_failover(&self) -> Option<FailoverEvent> {
        self.history.read().failovers.last().cloned()
    }

    pub fn failover_count(&self) -> usize {
        self.history.read().failovers.len()
    }

    pub fn incidents(&self) -> Vec<Incident> {
        self.history.read().incidents.iter().cloned().collect()
    }

    /// RTO/RPO figures over the whole failover history.
    pub fn report(&self) -> RecoveryReport {
        let history = self.history.read();
        RecoveryReport::from_history(&history.failovers, history.incidents.len())
    }
}
