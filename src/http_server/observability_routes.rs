//! Observability HTTP Routes
//!
//! Liveness of the orchestrator itself and its operational counters.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::failover::FailoverPhase;
use crate::observability::MetricsSnapshot;
use crate::orchestrator::OrchestratorHandle;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" while no standby can be promoted
    pub status: String,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub last_cycle_at: DateTime<Utc>,
    pub phase: FailoverPhase,
    pub primary_id: String,
    pub generation: u64,
}

pub fn observability_routes(handle: OrchestratorHandle) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(handle)
}

async fn health_handler(State(handle): State<OrchestratorHandle>) -> impl IntoResponse {
    let status = handle.status();
    let response = HealthResponse {
        status: if status.degraded { "degraded" } else { "ok" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: handle.started_at(),
        last_cycle_at: status.generated_at,
        phase: status.phase,
        primary_id: status.primary_id.clone(),
        generation: status.generation,
    };

    (StatusCode::OK, Json(response))
}

async fn metrics_handler(State(handle): State<OrchestratorHandle>) -> Json<MetricsSnapshot> {
    Json(handle.recorder().counters().snapshot())
}
