//! Node Probe - status reporter for compute-network node containers
//!
//! Finds node containers through the local container runtime, derives
//! each node's wallet from its keypair file and reports where the node
//! stands on the ledger. In `once` mode a single JSON report is written
//! to stdout; in `serve` mode probes run on a schedule behind an HTTP API.

use anyhow::Result;
use clap::{Parser, Subcommand};
use probe_lib::{
    health::{components, HealthRegistry},
    ledger::{HttpLedger, LedgerFactory, LedgerSource},
    models::ProbeReport,
    observability::{ProbeMetrics, StructuredLogger},
    probe::{ProbeLoop, Prober},
    runtime::DockerClient,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const PROBE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Written when the report itself cannot be serialized
const FALLBACK_REPORT: &str = r#"{"nodes":[],"error":"Failed to serialize report"}"#;

/// Node status probe
#[derive(Parser)]
#[command(name = "node-probe")]
#[command(author, version, about = "Reports the ledger status of local node containers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Run one probe and print the report (default)
    Once,
    /// Probe on a schedule and serve results over HTTP
    Serve,
}

impl Command {
    fn as_str(&self) -> &'static str {
        match self {
            Command::Once => "once",
            Command::Serve => "serve",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Stdout carries only the report
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Once);

    let config = match config::ProbeAgentConfig::load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Failed to load configuration, using defaults");
            config::ProbeAgentConfig::default()
        }
    };
    info!(
        host = %config.host_name,
        docker_socket = %config.docker_socket,
        ledger = %config.ledger_endpoint,
        "Probe configured"
    );

    let logger = StructuredLogger::new(&config.host_name);
    logger.log_startup(PROBE_VERSION, command.as_str());

    let prober = build_prober(&config);

    match command {
        Command::Once => run_once(&config, prober, &logger).await,
        Command::Serve => serve(&config, prober, logger).await,
    }
}

fn build_prober(config: &config::ProbeAgentConfig) -> Prober {
    let runtime = Arc::new(DockerClient::new(
        &config.docker_socket,
        config.request_timeout(),
    ));

    let ledger_config = config.ledger_config();
    let ledger_factory: LedgerFactory = Arc::new(move || -> Result<Arc<dyn LedgerSource>> {
        Ok(Arc::new(HttpLedger::new(&ledger_config)?))
    });

    Prober::new(runtime, ledger_factory, config.probe_config())
}

/// Run a single probe and print its report
///
/// Every failure ends up in the report; this never returns an error.
async fn run_once(
    config: &config::ProbeAgentConfig,
    prober: Prober,
    logger: &StructuredLogger,
) -> Result<()> {
    let start = Instant::now();

    let report = tokio::select! {
        outcome = tokio::time::timeout(config.probe_timeout(), prober.run()) => {
            outcome.unwrap_or_else(|_| {
                warn!(timeout_secs = config.probe_timeout_secs, "Probe run timed out");
                ProbeReport::failed("Probe timed out")
            })
        }
        _ = tokio::signal::ctrl_c() => {
            logger.log_shutdown("SIGINT received");
            ProbeReport::failed("Probe cancelled")
        }
    };

    logger.log_run_complete(&report, start.elapsed().as_millis());

    let output = serde_json::to_string(&report).unwrap_or_else(|e| {
        error!(error = %e, "Failed to serialize report");
        FALLBACK_REPORT.to_string()
    });
    println!("{}", output);

    Ok(())
}

/// Probe on a schedule until interrupted
async fn serve(
    config: &config::ProbeAgentConfig,
    prober: Prober,
    logger: StructuredLogger,
) -> Result<()> {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::RUNTIME).await;
    health_registry.register(components::LEDGER).await;
    health_registry.register(components::PROBE_LOOP).await;

    let metrics = ProbeMetrics::new();

    let probe_loop = ProbeLoop::new(
        Arc::new(prober),
        config.loop_config(),
        health_registry.clone(),
        metrics.clone(),
        logger.clone(),
    );

    let app_state = Arc::new(api::AppState::new(
        health_registry,
        metrics,
        probe_loop.state(),
    ));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let loop_handle = tokio::spawn(probe_loop.run(shutdown_tx.subscribe()));
    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    let _ = shutdown_tx.send(());

    if let Err(e) = loop_handle.await {
        error!(error = %e, "Probe loop task failed");
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    Ok(())
}
