//! Probe error codes
//!
//! A failed probe is never raised to the caller. It is folded into a
//! `ProbeResult` with `reachable = false` and one of these codes, and the
//! health classifier decides what repeated failures mean.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a single probe did not reach a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum ProbeErrorCode {
    /// The probe did not complete within the probe timeout
    #[error("probe timed out")]
    Timeout,

    /// The node refused or dropped the connection
    #[error("connection refused")]
    ConnectionRefused,

    /// The node rejected the probe credentials
    #[error("authentication failed")]
    AuthFailure,

    /// The node answered with something the probe could not interpret
    #[error("protocol error")]
    ProtocolError,
}

impl ProbeErrorCode {
    /// Stable code string used in logs and incidents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "PROBE_TIMEOUT",
            Self::ConnectionRefused => "PROBE_CONNECTION_REFUSED",
            Self::AuthFailure => "PROBE_AUTH_FAILURE",
            Self::ProtocolError => "PROBE_PROTOCOL_ERROR",
        }
    }

    /// True when the node may simply be slow rather than down.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}
