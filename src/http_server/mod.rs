//! # Reporting API
//!
//! Read-only HTTP view of the orchestrator, plus the one operator command
//! (re-admission of a fenced node). Handlers only talk to an
//! `OrchestratorHandle`; they never touch the cluster state.
//!
//! # Endpoints
//!
//! - `/health` - orchestrator liveness
//! - `/metrics` - operational counters
//! - `/cluster/*` - status, nodes, failover history, recovery report

pub mod cluster_routes;
pub mod config;
pub mod observability_routes;
pub mod server;

pub use config::HttpServerConfig;
pub use server::HttpServer;
