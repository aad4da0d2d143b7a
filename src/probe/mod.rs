//! Node probing
//!
//! `NodeClient` is the seam to the database layer; `NodeProbe` wraps it with
//! a timeout and turns every failure into a `ProbeResult` instead of an
//! error. `SimulatedCluster` is an in-memory backend for tests and the
//! `simulate` command.

mod client;
mod errors;
mod node_probe;
mod simulated;

pub use client::{HealthReport, NodeClient, PromoteOutcome};
pub use errors::ProbeErrorCode;
pub use node_probe::{NodeProbe, ProbeResult};
pub use simulated::{SimulatedCluster, SimulatedNode};
