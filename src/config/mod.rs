//! Orchestrator configuration
//!
//! Loaded once at startup from a JSON file and immutable afterwards.
//! Durations are written in milliseconds. Every field except `nodes` has a
//! default, so the smallest valid file is a node list with one primary.

mod errors;

pub use errors::{ConfigError, ConfigResult};

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cluster::NodeRole;
use crate::http_server::HttpServerConfig;
use crate::observability::LoggingConfig;

/// One configured replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    pub region: String,
    pub endpoint: String,
    pub role: NodeRole,
}

impl NodeConfig {
    pub fn new(id: &str, region: &str, endpoint: &str, role: NodeRole) -> Self {
        Self {
            id: id.to_string(),
            region: region.to_string(),
            endpoint: endpoint.to_string(),
            role,
        }
    }
}

/// What happens to a primary demoted by a failover once it answers again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejoinPolicy {
    /// Un-fence on the first successful probe; it rejoins as a standby.
    #[default]
    Auto,
    /// Stay fenced until an operator re-admits it.
    Manual,
}

/// Full orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Time between monitor cycles (default 5s)
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    /// Upper bound on a single probe (default 2s)
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Consecutive failures before Suspect becomes Unhealthy (default 3)
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Failure streak length that condemns a node regardless of count (default 15s)
    #[serde(default = "default_sustained_unreachable_ms")]
    pub sustained_unreachable_ms: u64,

    /// Grace window in SuspectedFailure before electing (default 5s)
    #[serde(default = "default_suspect_grace_ms")]
    pub suspect_grace_ms: u64,

    /// Upper bound on one promotion call (default 30s)
    #[serde(default = "default_promotion_timeout_ms")]
    pub promotion_timeout_ms: u64,

    /// How long a candidate that failed promotion is skipped (default 30s)
    #[serde(default = "default_promotion_backoff_ms")]
    pub promotion_backoff_ms: u64,

    /// New primary must stay healthy this long before Stable (default 5s)
    #[serde(default = "default_stabilization_window_ms")]
    pub stabilization_window_ms: u64,

    /// Candidate lag above which the controller waits for catch-up (default 1.0s)
    #[serde(default = "default_catch_up_lag_threshold")]
    pub catch_up_lag_threshold_seconds: f64,

    /// Longest catch-up wait, counted from election start (default 30s)
    #[serde(default = "default_catch_up_max_wait_ms")]
    pub catch_up_max_wait_ms: u64,

    /// Parallel probe limit; defaults to the node count
    #[serde(default)]
    pub max_concurrent_probes: Option<usize>,

    /// How long snapshots and incidents are kept (default 1h)
    #[serde(default = "default_metrics_retention_ms")]
    pub metrics_retention_ms: u64,

    #[serde(default)]
    pub rejoin_policy: RejoinPolicy,

    pub nodes: Vec<NodeConfig>,

    /// Reporting API; not served when absent
    #[serde(default)]
    pub http: Option<HttpServerConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_probe_interval_ms() -> u64 {
    5_000
}
fn default_probe_timeout_ms() -> u64 {
    2_000
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_sustained_unreachable_ms() -> u64 {
    15_000
}
fn default_suspect_grace_ms() -> u64 {
    5_000
}
fn default_promotion_timeout_ms() -> u64 {
    30_000
}
fn default_promotion_backoff_ms() -> u64 {
    30_000
}
fn default_stabilization_window_ms() -> u64 {
    5_000
}
fn default_catch_up_lag_threshold() -> f64 {
    1.0
}
fn default_catch_up_max_wait_ms() -> u64 {
    30_000
}
fn default_metrics_retention_ms() -> u64 {
    3_600_000
}

impl Config {
    /// Config with every default and the given topology.
    pub fn with_nodes(nodes: Vec<NodeConfig>) -> Self {
        Self {
            probe_interval_ms: default_probe_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            failure_threshold: default_failure_threshold(),
            sustained_unreachable_ms: default_sustained_unreachable_ms(),
            suspect_grace_ms: default_suspect_grace_ms(),
            promotion_timeout_ms: default_promotion_timeout_ms(),
            promotion_backoff_ms: default_promotion_backoff_ms(),
            stabilization_window_ms: default_stabilization_window_ms(),
            catch_up_lag_threshold_seconds: default_catch_up_lag_threshold(),
            catch_up_max_wait_ms: default_catch_up_max_wait_ms(),
            max_concurrent_probes: None,
            metrics_retention_ms: default_metrics_retention_ms(),
            rejoin_policy: RejoinPolicy::Auto,
            nodes,
            http: None,
            logging: LoggingConfig::default(),
        }
    }

    /// Load and validate configuration from a JSON file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON string.
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: Config =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field; the first violation wins.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.nodes.len() < 2 {
            return Err(ConfigError::invalid(
                "at least two nodes are required for failover",
            ));
        }

        let mut ids = HashSet::new();
        let mut endpoints = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return Err(ConfigError::invalid("node id must not be empty"));
            }
            if node.endpoint.trim().is_empty() {
                return Err(ConfigError::invalid(format!(
                    "node {} has an empty endpoint",
                    node.id
                )));
            }
            if !ids.insert(node.id.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate node id: {}",
                    node.id
                )));
            }
            if !endpoints.insert(node.endpoint.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate node endpoint: {}",
                    node.endpoint
                )));
            }
        }

        let primaries = self
            .nodes
            .iter()
            .filter(|n| n.role == NodeRole::Primary)
            .count();
        if primaries != 1 {
            return Err(ConfigError::invalid(format!(
                "exactly one primary is required, found {}",
                primaries
            )));
        }

        for (name, value) in [
            ("probe_interval_ms", self.probe_interval_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("sustained_unreachable_ms", self.sustained_unreachable_ms),
            ("promotion_timeout_ms", self.promotion_timeout_ms),
            ("metrics_retention_ms", self.metrics_retention_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(format!("{} must be > 0", name)));
            }
        }

        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold must be >= 1"));
        }

        if !self.catch_up_lag_threshold_seconds.is_finite()
            || self.catch_up_lag_threshold_seconds < 0.0
        {
            return Err(ConfigError::invalid(
                "catch_up_lag_threshold_seconds must be a non-negative number",
            ));
        }

        if self.max_concurrent_probes == Some(0) {
            return Err(ConfigError::invalid("max_concurrent_probes must be > 0"));
        }

        self.logging.validate().map_err(ConfigError::Invalid)?;
        if let Some(http) = &self.http {
            http.validate().map_err(ConfigError::Invalid)?;
        }

        Ok(())
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn sustained_unreachable(&self) -> Duration {
        Duration::from_millis(self.sustained_unreachable_ms)
    }

    pub fn suspect_grace(&self) -> Duration {
        Duration::from_millis(self.suspect_grace_ms)
    }

    pub fn promotion_timeout(&self) -> Duration {
        Duration::from_millis(self.promotion_timeout_ms)
    }

    pub fn promotion_backoff(&self) -> Duration {
        Duration::from_millis(self.promotion_backoff_ms)
    }

    pub fn stabilization_window(&self) -> Duration {
        Duration::from_millis(self.stabilization_window_ms)
    }

    pub fn catch_up_max_wait(&self) -> Duration {
        Duration::from_millis(self.catch_up_max_wait_ms)
    }

    pub fn metrics_retention(&self) -> Duration {
        Duration::from_millis(self.metrics_retention_ms)
    }

    /// Effective probe parallelism.
    pub fn probe_parallelism(&self) -> usize {
        self.max_concurrent_probes
            .unwrap_or(self.nodes.len())
            .max(1)
    }
}
