//! Orchestrator
//!
//! Wires probe → health → cluster → failover → metrics into one control
//! loop, and hands out read-only `OrchestratorHandle`s to the reporting
//! surfaces.

mod control_loop;
mod handle;
mod status;

pub use control_loop::{CycleReport, Orchestrator};
pub use handle::{CommandError, OperatorCommand, OrchestratorHandle};
pub use status::ClusterStatus;
