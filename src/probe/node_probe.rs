//! Timeout-bounded node probe

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::trace;

use super::client::NodeClient;
use super::errors::ProbeErrorCode;

/// Outcome of one probe against one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    /// Node that was probed
    pub node_id: String,
    /// Whether the node answered in time
    pub reachable: bool,
    /// Lag reported by the node, if any
    pub lag_seconds: Option<f64>,
    /// Wall time the probe took
    pub latency_ms: u64,
    /// Failure code when `reachable` is false
    pub error: Option<ProbeErrorCode>,
}

impl ProbeResult {
    /// Successful probe.
    pub fn reachable(node_id: impl Into<String>, lag_seconds: Option<f64>, latency_ms: u64) -> Self {
        Self {
            node_id: node_id.into(),
            reachable: true,
            lag_seconds,
            latency_ms,
            error: None,
        }
    }

    /// Failed probe.
    pub fn unreachable(node_id: impl Into<String>, error: ProbeErrorCode, latency_ms: u64) -> Self {
        Self {
            node_id: node_id.into(),
            reachable: false,
            lag_seconds: None,
            latency_ms,
            error: Some(error),
        }
    }
}

/// Probes nodes through a `NodeClient`, never waiting longer than `timeout`.
pub struct NodeProbe {
    client: Arc<dyn NodeClient>,
    timeout: Duration,
}

impl NodeProbe {
    /// Create a probe with the given per-call timeout.
    pub fn new(client: Arc<dyn NodeClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Probe timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe one node. Always returns; errors become `reachable = false`.
    pub async fn probe(&self, node_id: &str) -> ProbeResult {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.client.check_health(node_id)).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(Ok(report)) => ProbeResult::reachable(node_id, report.lag_seconds, latency_ms),
            Ok(Err(code)) => ProbeResult::unreachable(node_id, code, latency_ms),
            Err(_) => ProbeResult::unreachable(node_id, ProbeErrorCode::Timeout, latency_ms),
        };

        trace!(
            node = %node_id,
            reachable = result.reachable,
            latency_ms = result.latency_ms,
            "probe finished"
        );
        result
    }
}
