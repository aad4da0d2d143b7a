//! Failover history and recovery metrics
//!
//! `MetricsRecorder` is a pure recorder: it stores what the control loop
//! hands it and derives RTO/RPO figures, and never influences decisions.

mod event;
mod recorder;
mod report;

pub use event::{FailoverEvent, HealthSnapshot, Incident, IncidentKind, TriggerReason};
pub use recorder::MetricsRecorder;
pub use report::{RecoveryEntry, RecoveryReport};
