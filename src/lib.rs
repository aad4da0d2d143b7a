//! failoverd - automatic failover for a statically configured database
//! replica set
//!
//! A single control loop probes every node, debounces failures into health
//! states, elects and promotes the most caught-up standby when the primary
//! is lost, and records every failover with its RTO and RPO estimates.

pub mod cli;
pub mod clock;
pub mod cluster;
pub mod config;
pub mod failover;
pub mod health;
pub mod http_server;
pub mod metrics;
pub mod observability;
pub mod orchestrator;
pub mod probe;
