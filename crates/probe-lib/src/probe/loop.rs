//! Scheduled probe loop
//!
//! Runs the prober on a fixed interval with jitter, caps each run with a
//! timeout and keeps the latest result for readers.

use super::Prober;
use crate::health::{components, HealthRegistry};
use crate::models::{NodeStatus, ProbeReport};
use crate::observability::{ProbeMetrics, StructuredLogger};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{interval, Instant};
use tracing::{info, warn};

/// Error recorded when a run exceeds its timeout
pub const PROBE_TIMEOUT_ERROR: &str = "Probe timed out";

/// Configuration for the probe loop
#[derive(Debug, Clone)]
pub struct ProbeLoopConfig {
    /// Base interval between runs (default: 30 seconds)
    pub interval: Duration,
    /// Maximum jitter to add to the interval (default: 2 seconds)
    pub jitter: Duration,
    /// Upper bound on a single run (default: 45 seconds)
    pub probe_timeout: Duration,
}

impl Default for ProbeLoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            jitter: Duration::from_secs(2),
            probe_timeout: Duration::from_secs(45),
        }
    }
}

/// Latest probe result as served to readers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeState {
    pub nodes: Vec<NodeStatus>,
    pub error: Option<String>,
    /// Wall-clock time of the last run, `HH:MM:SS`
    pub last_probe: Option<String>,
}

/// Shared handle to the latest probe state
#[derive(Debug, Clone, Default)]
pub struct ProbeStateHandle {
    inner: Arc<RwLock<ProbeState>>,
}

impl ProbeStateHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> ProbeState {
        self.inner.read().await.clone()
    }

    /// Replace the state with a finished report
    async fn publish(&self, report: ProbeReport) {
        let mut state = self.inner.write().await;
        *state = ProbeState {
            nodes: report.nodes,
            error: report.error,
            last_probe: Some(probe_timestamp()),
        };
    }

    /// Keep the previous nodes but flag the run as timed out
    async fn mark_timed_out(&self) {
        let mut state = self.inner.write().await;
        state.error = Some(PROBE_TIMEOUT_ERROR.to_string());
        state.last_probe = Some(probe_timestamp());
    }
}

fn probe_timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// Periodically probes and publishes results
pub struct ProbeLoop {
    prober: Arc<Prober>,
    config: ProbeLoopConfig,
    state: ProbeStateHandle,
    health: HealthRegistry,
    metrics: ProbeMetrics,
    logger: StructuredLogger,
}

impl ProbeLoop {
    /// Create a new probe loop
    pub fn new(
        prober: Arc<Prober>,
        config: ProbeLoopConfig,
        health: HealthRegistry,
        metrics: ProbeMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            prober,
            config,
            state: ProbeStateHandle::new(),
            health,
            metrics,
            logger,
        }
    }

    /// Handle for reading the latest state
    pub fn state(&self) -> ProbeStateHandle {
        self.state.clone()
    }

    /// Run until a shutdown signal is received
    ///
    /// An in-flight run is dropped on shutdown and its results discarded.
    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            timeout_secs = self.config.probe_timeout.as_secs(),
            "Starting probe loop"
        );

        let mut ticker = interval(self.current_interval());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.probe_once() => {}
                        _ = shutdown.recv() => {
                            info!("Shutdown during probe run, discarding results");
                            break;
                        }
                    }
                    ticker = interval(self.current_interval());
                    // The first tick of a fresh interval completes immediately
                    ticker.tick().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down probe loop");
                    break;
                }
            }
        }
    }

    /// Run a single probe and publish its result
    pub async fn probe_once(&self) {
        let start = Instant::now();

        let outcome =
            tokio::time::timeout(self.config.probe_timeout, self.prober.run_with_diagnostics())
                .await;
        let elapsed = start.elapsed();

        match outcome {
            Ok((report, diagnostics)) => {
                self.health.record_run(&diagnostics).await;
                self.health.set_healthy(components::PROBE_LOOP).await;
                self.metrics.record_run(&report, elapsed.as_secs_f64());
                self.logger.log_run_complete(&report, elapsed.as_millis());
                for node in &report.nodes {
                    self.logger.log_node_status(node);
                }
                self.state.publish(report).await;
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.config.probe_timeout.as_secs(),
                    "Probe run timed out"
                );
                self.health
                    .set_degraded(components::PROBE_LOOP, PROBE_TIMEOUT_ERROR)
                    .await;
                self.metrics.record_timeout(elapsed.as_secs_f64());
                self.state.mark_timed_out().await;
            }
        }

        self.health.set_ready(true).await;
    }

    /// Interval until the next run
    fn current_interval(&self) -> Duration {
        let jitter_ms = rand_jitter(self.config.jitter.as_millis() as u64);
        self.config.interval + Duration::from_millis(jitter_ms)
    }
}

/// Generate a jitter value between 0 and max_ms
fn rand_jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;

    now % max_ms
}
