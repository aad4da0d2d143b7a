//! Reporting API Tests
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot` against an
//! orchestrator that has already been through one failover.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tower::ServiceExt;

use failoverd::clock::ManualClock;
use failoverd::cluster::NodeRole;
use failoverd::config::{Config, NodeConfig, RejoinPolicy};
use failoverd::http_server::{HttpServer, HttpServerConfig};
use failoverd::orchestrator::Orchestrator;
use failoverd::probe::SimulatedCluster;

struct Fixture {
    orch: Orchestrator,
    clock: Arc<ManualClock>,
    router: Router,
}

impl Fixture {
    async fn after_failover() -> Self {
        let mut config = Config::with_nodes(vec![
            NodeConfig::new("p", "us-west-2", "p:5432", NodeRole::Primary),
            NodeConfig::new("a", "us-east-1", "a:5432", NodeRole::Standby),
            NodeConfig::new("b", "eu-west-1", "b:5432", NodeRole::Standby),
        ]);
        config.rejoin_policy = RejoinPolicy::Manual;

        let sim = Arc::new(SimulatedCluster::from_topology(&config.nodes));
        let start = DateTime::parse_from_rfc3339("2026-07-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = Arc::new(ManualClock::new(start));
        let mut orch = Orchestrator::new(config, sim.clone(), clock.clone()).unwrap();
        let router = HttpServer::new(HttpServerConfig::default(), orch.handle()).router();

        orch.run_cycle().await;
        sim.set_reachable("p", false);
        for _ in 0..4 {
            clock.advance(Duration::from_secs(5));
            orch.run_cycle().await;
        }
        sim.set_reachable("p", true);
        clock.advance(Duration::from_secs(5));
        orch.run_cycle().await;
        assert_eq!(orch.cluster().primary_id(), "a");

        Self { orch, clock, router }
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri).await
    }

    async fn send(&self, method: Method, uri: &str) -> (StatusCode, Value) {
        send(&self.router, method, uri).await
    }
}

async fn send(router: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

// =============================================================================
// Observability
// =============================================================================

#[tokio::test]
async fn test_health_reports_current_primary() {
    let f = Fixture::after_failover().await;
    let (status, body) = f.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["primary_id"], "a");
    assert_eq!(body["generation"], 1);
    assert_eq!(body["phase"], "stabilizing");
}

#[tokio::test]
async fn test_metrics_counts_cycles_and_failovers() {
    let f = Fixture::after_failover().await;
    let (status, body) = f.get("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["monitor_cycles"], 6);
    assert_eq!(body["failovers"], 1);
}

// =============================================================================
// Cluster Views
// =============================================================================

#[tokio::test]
async fn test_status_and_nodes() {
    let f = Fixture::after_failover().await;

    let (status, body) = f.get("/cluster/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["primary_id"], "a");
    assert_eq!(body["degraded"], false);

    let (_, body) = f.get("/cluster/nodes").await;
    assert_eq!(body["total"], 3);

    let (status, body) = f.get("/cluster/nodes/p").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "standby");
    assert_eq!(body["fenced"], true);

    let (status, body) = f.get("/cluster/nodes/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn test_failover_history_and_report() {
    let f = Fixture::after_failover().await;

    let (_, body) = f.get("/cluster/failovers").await;
    let events = body.as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["previous_primary_id"], "p");
    assert_eq!(events[0]["new_primary_id"], "a");
    assert_eq!(events[0]["data_loss_estimate_seconds"], 0.0);

    let (_, body) = f.get("/cluster/report").await;
    assert_eq!(body["failover_count"], 1);
    assert_eq!(body["unknown_rpo_count"], 0);

    let (_, body) = f.get("/cluster/snapshots?limit=2").await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (_, body) = f.get("/cluster/incidents").await;
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .any(|i| i["kind"] == "probe_failure" && i["node_id"] == "p"));
}

// =============================================================================
// Operator Commands
// =============================================================================

#[tokio::test]
async fn test_readmit_flow() {
    let mut f = Fixture::after_failover().await;

    let (status, _) = f.send(Method::POST, "/cluster/nodes/ghost/readmit").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = f.send(Method::POST, "/cluster/nodes/b/readmit").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = f.send(Method::POST, "/cluster/nodes/p/readmit").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["message"].as_str().unwrap().contains("p"));

    f.clock.advance(Duration::from_secs(5));
    let report = f.orch.run_cycle().await;
    assert_eq!(report.commands_applied, 1);
    assert!(!f.orch.cluster().node("p").unwrap().fenced);

    let (status, _) = f.send(Method::POST, "/cluster/nodes/p/readmit").await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_readmit_after_shutdown_is_unavailable() {
    let f = Fixture::after_failover().await;
    let Fixture { orch, router, .. } = f;
    drop(orch);

    let (status, body) = send(&router, Method::POST, "/cluster/nodes/p/readmit").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], 503);
}
