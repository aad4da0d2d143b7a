//! Cluster HTTP Routes
//!
//! Status, node views and failover history, all served from the latest
//! published `ClusterStatus` and the shared recorder.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::cluster::Node;
use crate::metrics::{FailoverEvent, HealthSnapshot, Incident, RecoveryReport};
use crate::orchestrator::{ClusterStatus, CommandError, OrchestratorHandle};

// ==================
// Response Types
// ==================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct NodesListResponse {
    pub nodes: Vec<Node>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotQuery {
    pub limit: Option<usize>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: status.as_u16(),
        }),
    )
}

// ==================
// Cluster Routes
// ==================

pub fn cluster_routes(handle: OrchestratorHandle) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/nodes", get(list_nodes_handler))
        .route("/nodes/:id", get(get_node_handler))
        .route("/nodes/:id/readmit", post(readmit_handler))
        .route("/failovers", get(failovers_handler))
        .route("/report", get(report_handler))
        .route("/snapshots", get(snapshots_handler))
        .route("/incidents", get(incidents_handler))
        .with_state(handle)
}

async fn status_handler(State(handle): State<OrchestratorHandle>) -> Json<ClusterStatus> {
    Json(handle.status().as_ref().clone())
}

async fn list_nodes_handler(State(handle): State<OrchestratorHandle>) -> Json<NodesListResponse> {
    let nodes = handle.status().nodes.clone();
    Json(NodesListResponse {
        total: nodes.len(),
        nodes,
    })
}

async fn get_node_handler(
    State(handle): State<OrchestratorHandle>,
    Path(id): Path<String>,
) -> Result<Json<Node>, ApiError> {
    handle
        .status()
        .node(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown node: {}", id)))
}

async fn readmit_handler(
    State(handle): State<OrchestratorHandle>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    match handle.readmit(&id) {
        Ok(()) => Ok((
            StatusCode::ACCEPTED,
            Json(MessageResponse {
                message: format!("readmission of {} queued", id),
            }),
        )),
        Err(err) => {
            let status = match err {
                CommandError::UnknownNode(_) => StatusCode::NOT_FOUND,
                CommandError::NotFenced(_) => StatusCode::CONFLICT,
                CommandError::Busy | CommandError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
            };
            Err(api_error(status, err.to_string()))
        }
    }
}

// ==================
// History Handlers
// ==================

async fn failovers_handler(State(handle): State<OrchestratorHandle>) -> Json<Vec<FailoverEvent>> {
    Json(handle.recorder().failovers())
}

async fn report_handler(State(handle): State<OrchestratorHandle>) -> Json<RecoveryReport> {
    Json(handle.recorder().report())
}

async fn snapshots_handler(
    State(handle): State<OrchestratorHandle>,
    Query(query): Query<SnapshotQuery>,
) -> Json<Vec<HealthSnapshot>> {
    Json(handle.recorder().snapshots(query.limit))
}

async fn incidents_handler(State(handle): State<OrchestratorHandle>) -> Json<Vec<Incident>> {
    Json(handle.recorder().incidents())
}
