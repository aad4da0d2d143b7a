//! Operational counters
//!
//! Monotonic, reset only on process start. Relaxed ordering throughout;
//! readers only need eventually-consistent totals.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    monitor_cycles: AtomicU64,
    probes_sent: AtomicU64,
    probes_failed: AtomicU64,
    probes_skipped: AtomicU64,
    failovers: AtomicU64,
    promotion_failures: AtomicU64,
    stale_promotions: AtomicU64,
    degraded_cycles: AtomicU64,
    readmissions: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_monitor_cycles(&self) {
        self.monitor_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_probes(&self, sent: u64, failed: u64) {
        self.probes_sent.fetch_add(sent, Ordering::Relaxed);
        self.probes_failed.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn add_probes_skipped(&self, skipped: u64) {
        self.probes_skipped.fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn increment_failovers(&self) {
        self.failovers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_promotion_failures(&self) {
        self.promotion_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_stale_promotions(&self) {
        self.stale_promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_degraded_cycles(&self) {
        self.degraded_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_readmissions(&self) {
        self.readmissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failovers(&self) -> u64 {
        self.failovers.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            monitor_cycles: self.monitor_cycles.load(Ordering::Relaxed),
            probes_sent: self.probes_sent.load(Ordering::Relaxed),
            probes_failed: self.probes_failed.load(Ordering::Relaxed),
            probes_skipped: self.probes_skipped.load(Ordering::Relaxed),
            failovers: self.failovers.load(Ordering::Relaxed),
            promotion_failures: self.promotion_failures.load(Ordering::Relaxed),
            stale_promotions: self.stale_promotions.load(Ordering::Relaxed),
            degraded_cycles: self.degraded_cycles.load(Ordering::Relaxed),
            readmissions: self.readmissions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub monitor_cycles: u64,
    pub probes_sent: u64,
    pub probes_failed: u64,
    pub probes_skipped: u64,
    pub failovers: u64,
    pub promotion_failures: u64,
    pub stale_promotions: u64,
    pub degraded_cycles: u64,
    pub readmissions: u64,
}
