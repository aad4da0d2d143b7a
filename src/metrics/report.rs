//! Recovery report
//!
//! RTO is detection latency plus promotion duration; RPO is the promoted
//! standby's last known lag.

use serde::Serialize;
use uuid::Uuid;

use super::event::FailoverEvent;

/// Per-failover recovery figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryEntry {
    pub id: Uuid,
    pub generation: u64,
    pub previous_primary_id: String,
    pub new_primary_id: String,
    pub rto_ms: u64,
    pub rpo_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RecoveryReport {
    pub failover_count: usize,
    pub incident_count: usize,
    pub last_rto_ms: Option<u64>,
    pub max_rto_ms: Option<u64>,
    pub mean_rto_ms: Option<f64>,
    pub last_rpo_seconds: Option<f64>,
    /// Worst known data loss; failovers without a lag figure are not counted
    pub max_rpo_seconds: Option<f64>,
    /// Failovers whose data loss could not be estimated
    pub unknown_rpo_count: usize,
    pub failovers: Vec<RecoveryEntry>,
}

impl RecoveryReport {
    pub fn from_history(failovers: &[FailoverEvent], incident_count: usize) -> Self {
        let entries: Vec<RecoveryEntry> = failovers
            .iter()
            .map(|e| RecoveryEntry {
                id: e.id,
                generation: e.generation,
                previous_primary_id: e.previous_primary_id.clone(),
                new_primary_id: e.new_primary_id.clone(),
                rto_ms: e.rto_ms(),
                rpo_seconds: e.data_loss_estimate_seconds,
            })
            .collect();

        let rtos: Vec<u64> = entries.iter().map(|e| e.rto_ms).collect();
        let mean_rto_ms = if rtos.is_empty() {
            None
        } else {
            Some(rtos.iter().sum::<u64>() as f64 / rtos.len() as f64)
        };

        let max_rpo_seconds = entries
            .iter()
            .filter_map(|e| e.rpo_seconds)
            .max_by(|a, b| a.total_cmp(b));

        Self {
            failover_count: entries.len(),
            incident_count,
            last_rto_ms: rtos.last().copied(),
            max_rto_ms: rtos.iter().max().copied(),
            mean_rto_ms,
            last_rpo_seconds: entries.last().and_then(|e| e.rpo_seconds),
            max_rpo_seconds,
            unknown_rpo_count: entries.iter().filter(|e| e.rpo_seconds.is_none()).count(),
            failovers: entries,
        }
    }
}
