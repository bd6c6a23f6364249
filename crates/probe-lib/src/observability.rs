//! Observability infrastructure for the node probe
//!
//! Provides:
//! - Prometheus metrics (probe latency, run outcomes, node counts by status)
//! - Structured JSON logging with tracing

use crate::models::{NodeStatus, ProbeReport, ProbeStatus};
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, register_int_gauge_vec,
    Histogram, IntCounter, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for probe run latency (in seconds)
const PROBE_LATENCY_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 45.0];

const STATUSES: [ProbeStatus; 5] = [
    ProbeStatus::Unknown,
    ProbeStatus::Idle,
    ProbeStatus::Queued,
    ProbeStatus::Running,
    ProbeStatus::Error,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ProbeMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct ProbeMetricsInner {
    probe_latency_seconds: Histogram,
    probe_runs: IntCounter,
    probe_failures: IntCounter,
    nodes_discovered: IntGauge,
    nodes_by_status: IntGaugeVec,
    unidentified_nodes: IntCounter,
}

impl ProbeMetricsInner {
    fn new() -> Self {
        Self {
            probe_latency_seconds: register_histogram!(
                "node_probe_latency_seconds",
                "Time spent on one full probe run",
                PROBE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register probe_latency_seconds"),

            probe_runs: register_int_counter!(
                "node_probe_runs_total",
                "Total number of probe runs"
            )
            .expect("Failed to register probe_runs"),

            probe_failures: register_int_counter!(
                "node_probe_failures_total",
                "Total number of probe runs that could not probe at all"
            )
            .expect("Failed to register probe_failures"),

            nodes_discovered: register_int_gauge!(
                "node_probe_nodes_discovered",
                "Number of target containers found in the last run"
            )
            .expect("Failed to register nodes_discovered"),

            nodes_by_status: register_int_gauge_vec!(
                "node_probe_nodes_by_status",
                "Number of nodes per status in the last run",
                &["status"]
            )
            .expect("Failed to register nodes_by_status"),

            unidentified_nodes: register_int_counter!(
                "node_probe_unidentified_nodes_total",
                "Total number of nodes whose wallet could not be resolved"
            )
            .expect("Failed to register unidentified_nodes"),
        }
    }
}

/// Probe metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct ProbeMetrics {
    _private: (),
}

impl Default for ProbeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ProbeMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ProbeMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record the outcome of a finished probe run
    pub fn record_run(&self, report: &ProbeReport, duration_secs: f64) {
        let inner = self.inner();
        inner.probe_runs.inc();
        inner.probe_latency_seconds.observe(duration_secs);

        if report.error.is_some() {
            inner.probe_failures.inc();
        }

        inner.nodes_discovered.set(report.nodes.len() as i64);
        for status in STATUSES {
            let count = report.nodes.iter().filter(|n| n.status == status).count();
            inner
                .nodes_by_status
                .with_label_values(&[status.as_str()])
                .set(count as i64);
        }

        let unidentified = report.nodes.iter().filter(|n| n.wallet.is_none()).count();
        inner.unidentified_nodes.inc_by(unidentified as u64);
    }

    /// Record a run that was cut off by the probe timeout
    pub fn record_timeout(&self, duration_secs: f64) {
        let inner = self.inner();
        inner.probe_runs.inc();
        inner.probe_failures.inc();
        inner.probe_latency_seconds.observe(duration_secs);
    }
}

/// Structured logger for probe events
///
/// Provides consistent JSON-formatted logging for probe runs
/// and per-node results.
#[derive(Clone)]
pub struct StructuredLogger {
    host: String,
}

impl StructuredLogger {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    /// Log probe startup
    pub fn log_startup(&self, version: &str, mode: &str) {
        info!(
            event = "probe_started",
            host = %self.host,
            probe_version = %version,
            mode = %mode,
            "Node probe started"
        );
    }

    /// Log probe shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "probe_shutdown",
            host = %self.host,
            reason = %reason,
            "Node probe shutting down"
        );
    }

    /// Log the summary of a finished run
    pub fn log_run_complete(&self, report: &ProbeReport, elapsed_ms: u128) {
        let node_errors = report.nodes.iter().filter(|n| n.error.is_some()).count();

        match &report.error {
            Some(error) => {
                warn!(
                    event = "probe_failed",
                    host = %self.host,
                    error = %error,
                    elapsed_ms = elapsed_ms,
                    "Probe run could not complete"
                );
            }
            None => {
                info!(
                    event = "probe_complete",
                    host = %self.host,
                    nodes = report.nodes.len(),
                    node_errors = node_errors,
                    elapsed_ms = elapsed_ms,
                    "Probe run complete"
                );
            }
        }
    }

    /// Log the status of one node
    pub fn log_node_status(&self, node: &NodeStatus) {
        debug!(
            event = "node_status",
            host = %self.host,
            container = %node.container,
            wallet = ?node.wallet.as_ref().map(|w| w.as_str()),
            status = node.status.as_str(),
            market = ?node.market,
            queue_position = ?node.queue_position,
            job = ?node.job,
            error = ?node.error,
            "Node status"
        );
    }
}
