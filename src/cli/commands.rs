//! CLI command implementations
//!
//! `validate` only loads and checks configuration. `simulate` runs the full
//! control loop against an in-memory cluster, optionally serving the
//! reporting API, and prints the recovery report when it stops.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::SystemClock;
use crate::config::Config;
use crate::http_server::{HttpServer, HttpServerConfig};
use crate::observability::{init_logging, log_event, Event, LoggingConfig};
use crate::orchestrator::Orchestrator;
use crate::probe::SimulatedCluster;

use super::args::{Cli, Command, SimulateArgs};
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Upper bound for random-walk lag in the simulation.
const SIMULATED_MAX_LAG_SECONDS: f64 = 30.0;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
pub fn run() -> CliResult<()> {
    run_command(Cli::parse_args())
}

pub fn run_command(cli: Cli) -> CliResult<()> {
    match &cli.command {
        Command::Validate { config } => {
            let config = load_config(&cli, config)?;
            validate(&config)
        }
        Command::Simulate(args) => {
            let config = load_config(&cli, &args.config)?;
            simulate(config, args.clone())
        }
    }
}

/// Load configuration, apply the global logging flags and install the
/// subscriber.
fn load_config(cli: &Cli, path: &Path) -> CliResult<Config> {
    let mut config = Config::load(path)?;
    apply_logging_overrides(&mut config.logging, cli);
    config
        .logging
        .validate()
        .map_err(CliError::config_error)?;
    init_logging(&config.logging).map_err(CliError::config_error)?;

    log_event(
        Event::ConfigLoaded,
        &[
            ("path", &path.display().to_string()),
            ("nodes", &config.nodes.len().to_string()),
        ],
    );
    Ok(config)
}

fn apply_logging_overrides(logging: &mut LoggingConfig, cli: &Cli) {
    if let Some(level) = &cli.log_level {
        logging.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        logging.format = format;
    }
}

/// Print the validated topology.
pub fn validate(config: &Config) -> CliResult<()> {
    let primary = config
        .nodes
        .iter()
        .find(|n| n.role == crate::cluster::NodeRole::Primary)
        .map(|n| n.id.clone());

    write_response(json!({
        "valid": true,
        "primary": primary,
        "nodes": config.nodes,
        "probe_interval_ms": config.probe_interval_ms,
        "failure_threshold": config.failure_threshold,
        "suspect_grace_ms": config.suspect_grace_ms,
        "rejoin_policy": config.rejoin_policy,
    }))
}

/// Run the control loop against a simulated cluster.
pub fn simulate(config: Config, args: SimulateArgs) -> CliResult<()> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::runtime_error(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(run_simulation(config, args))
}

async fn run_simulation(mut config: Config, args: SimulateArgs) -> CliResult<()> {
    if let Some(port) = args.port {
        let http = config.http.take().unwrap_or_default();
        config.http = Some(HttpServerConfig { port, ..http });
    }

    let sim = Arc::new(SimulatedCluster::from_topology(&config.nodes));
    let interval = config.probe_interval();
    let http_config = config.http.clone();
    let orchestrator = Orchestrator::new(config, sim.clone(), Arc::new(SystemClock))
        .map_err(|e| CliError::config_error(e.to_string()))?;
    let handle = orchestrator.handle();
    let primary_id = handle.status().primary_id.clone();
    let cancel = CancellationToken::new();

    let server = match http_config {
        Some(http) => {
            let listener = tokio::net::TcpListener::bind(http.socket_addr()).await?;
            let server = HttpServer::new(http, handle.clone());
            Some(tokio::spawn(server.serve(listener, cancel.clone())))
        }
        None => None,
    };

    let faults = spawn_faults(
        sim,
        primary_id,
        args.fail_primary_after_secs.map(Duration::from_secs),
        args.lag_drift,
        interval,
        cancel.clone(),
    );
    let control = tokio::spawn(orchestrator.run(cancel.clone()));

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.duration_secs)) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, stopping simulation");
        }
    }
    cancel.cancel();

    let orchestrator = control
        .await
        .map_err(|e| CliError::runtime_error(format!("control loop failed: {}", e)))?;
    faults
        .await
        .map_err(|e| CliError::runtime_error(format!("fault injector failed: {}", e)))?;
    if let Some(server) = server {
        server
            .await
            .map_err(|e| CliError::runtime_error(format!("HTTP server failed: {}", e)))??;
    }

    let status = orchestrator.status();
    write_response(json!({
        "primary": status.primary_id,
        "generation": status.generation,
        "phase": status.phase,
        "degraded": status.degraded,
        "report": orchestrator.recorder().report(),
        "counters": orchestrator.recorder().counters().snapshot(),
    }))
}

/// Inject the scripted primary outage and optional lag drift.
fn spawn_faults(
    sim: Arc<SimulatedCluster>,
    primary_id: String,
    fail_primary_after: Option<Duration>,
    lag_drift: Option<f64>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outage = async {
            match fail_primary_after {
                Some(after) => tokio::time::sleep(after).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(outage);
        let mut outage_done = false;
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = &mut outage, if !outage_done => {
                    outage_done = true;
                    sim.set_reachable(&primary_id, false);
                    tracing::warn!(node = %primary_id, "simulated primary outage");
                }
                _ = ticker.tick() => {
                    if let Some(step) = lag_drift {
                        sim.drift_lag(step, SIMULATED_MAX_LAG_SECONDS);
                    }
                }
            }
        }
    })
}
