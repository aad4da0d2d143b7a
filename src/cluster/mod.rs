//! Cluster state
//!
//! The single source of truth for node roles, health and the promotion
//! generation. `ClusterState` is mutated only through `Transaction`s, each
//! applied all-or-nothing; readers work from `ClusterView` copies.
//!
//! Invariants:
//! - exactly one node is Primary in every committed state
//! - `generation` strictly increases with every promotion
//! - a promotion carrying a stale generation is rejected

mod errors;
mod node;
mod state;
mod transaction;
mod view;

pub use errors::{ClusterError, ClusterResult};
pub use node::{HealthStatus, Node, NodeRole};
pub use state::ClusterState;
pub use transaction::{HealthUpdate, PromotionCommit, Transaction};
pub use view::ClusterView;
