//! Lifecycle events
//!
//! Every line the orchestrator logs about its own lifecycle is one of these.
//! Names are stable so log pipelines can match on them.

use std::fmt;

/// Log severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observable orchestrator events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Configuration loaded and validated
    ConfigLoaded,
    /// Control loop started
    OrchestratorStart,
    /// Control loop stopped after cancellation
    OrchestratorStop,
    /// Reporting API listening
    Serving,

    // Health
    /// Monitor cycle committed
    MonitorCycle,
    /// Probe skipped because the previous one is still running
    ProbeSkipped,
    /// A node changed health status
    NodeHealthChanged,
    /// A fenced node was re-admitted
    NodeReadmitted,

    // Failover
    /// Controller moved between phases
    FailoverPhaseChanged,
    /// Primary unhealthy, grace window started
    FailoverSuspected,
    /// Primary recovered before promotion
    FailoverAbandoned,
    /// Candidate lagging; waiting for catch-up
    CatchUpWait,
    /// Promotion call started
    PromotionStart,
    /// Promotion committed
    FailoverComplete,
    /// Promotion failed or timed out
    PromotionFailed,
    /// Promotion rejected for a stale generation
    PromotionStale,
    /// No eligible standby, or the election halted on stale rejections
    ClusterDegraded,
    /// New primary held through the stabilisation window
    ClusterStabilized,

    // Operator
    /// Operator command rejected
    CommandRejected,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::OrchestratorStart => "ORCHESTRATOR_START",
            Event::OrchestratorStop => "ORCHESTRATOR_STOP",
            Event::Serving => "FAILOVERD_SERVING",

            Event::MonitorCycle => "MONITOR_CYCLE",
            Event::ProbeSkipped => "PROBE_SKIPPED",
            Event::NodeHealthChanged => "NODE_HEALTH_CHANGED",
            Event::NodeReadmitted => "NODE_READMITTED",

            Event::FailoverPhaseChanged => "FAILOVER_PHASE_CHANGED",
            Event::FailoverSuspected => "FAILOVER_SUSPECTED",
            Event::FailoverAbandoned => "FAILOVER_ABANDONED",
            Event::CatchUpWait => "CATCH_UP_WAIT",
            Event::PromotionStart => "PROMOTION_START",
            Event::FailoverComplete => "FAILOVER_COMPLETE",
            Event::PromotionFailed => "PROMOTION_FAILED",
            Event::PromotionStale => "PROMOTION_STALE",
            Event::ClusterDegraded => "CLUSTER_DEGRADED",
            Event::ClusterStabilized => "CLUSTER_STABILIZED",

            Event::CommandRejected => "COMMAND_REJECTED",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Event::MonitorCycle => Severity::Trace,
            Event::ProbeSkipped
            | Event::FailoverSuspected
            | Event::CatchUpWait
            | Event::PromotionStale
            | Event::CommandRejected => Severity::Warn,
            Event::PromotionFailed | Event::ClusterDegraded => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
