//! Failover control
//!
//! The state machine (`state`), successor ranking (`election`) and the
//! controller that drives both against the cluster (`controller`).
//!
//! Safety properties:
//! - a promotion is attempted only with the generation read from the
//!   committed cluster state
//! - demotion and promotion are one cluster transaction
//! - a promotion in flight is never abandoned mid-call

mod controller;
mod election;
mod errors;
mod state;

pub use controller::{
    ControllerSettings, Evaluation, FailoverController, PhaseChange, STALE_REJECTION_LIMIT,
};
pub use election::{rank_candidates, Candidate};
pub use errors::{FailoverError, FailoverResult};
pub use state::{FailoverPhase, FailoverState, FailureContext};
