//! Probe configuration

use anyhow::Result;
use probe_lib::identity::DEFAULT_KEY_PATH;
use probe_lib::ledger::LedgerConfig;
use probe_lib::probe::{ProbeConfig, ProbeLoopConfig, DEFAULT_WORKLOAD_MARKER};
use probe_lib::runtime::DEFAULT_DOCKER_SOCKET;
use serde::Deserialize;
use std::time::Duration;

/// Probe configuration, read from `PROBE_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeAgentConfig {
    /// Host name reported in structured logs
    #[serde(default = "default_host_name")]
    pub host_name: String,

    /// Container runtime Unix socket
    #[serde(default = "default_docker_socket")]
    pub docker_socket: String,

    /// Substring of the image reference marking node containers
    #[serde(default = "default_workload_marker")]
    pub workload_marker: String,

    /// Keypair file inside each node container
    #[serde(default = "default_key_path")]
    pub key_path: String,

    #[serde(default = "default_ledger_endpoint")]
    pub ledger_endpoint: String,

    #[serde(default = "default_market_api_endpoint")]
    pub market_api_endpoint: String,

    /// Timeout of a single runtime request in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout of a single ledger request in seconds
    #[serde(default = "default_ledger_timeout")]
    pub ledger_timeout_secs: u64,

    /// Upper bound on a whole probe run in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Interval between runs in serve mode
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// API server port for health, metrics and nodes
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_host_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_docker_socket() -> String {
    DEFAULT_DOCKER_SOCKET.to_string()
}

fn default_workload_marker() -> String {
    DEFAULT_WORKLOAD_MARKER.to_string()
}

fn default_key_path() -> String {
    DEFAULT_KEY_PATH.to_string()
}

fn default_ledger_endpoint() -> String {
    LedgerConfig::default().ledger_endpoint
}

fn default_market_api_endpoint() -> String {
    LedgerConfig::default().market_api_endpoint
}

fn default_request_timeout() -> u64 {
    10
}

fn default_ledger_timeout() -> u64 {
    15
}

fn default_probe_timeout() -> u64 {
    45
}

fn default_probe_interval() -> u64 {
    30
}

fn default_max_concurrency() -> usize {
    4
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ProbeAgentConfig {
    fn default() -> Self {
        Self {
            host_name: default_host_name(),
            docker_socket: default_docker_socket(),
            workload_marker: default_workload_marker(),
            key_path: default_key_path(),
            ledger_endpoint: default_ledger_endpoint(),
            market_api_endpoint: default_market_api_endpoint(),
            request_timeout_secs: default_request_timeout(),
            ledger_timeout_secs: default_ledger_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            probe_interval_secs: default_probe_interval(),
            max_concurrency: default_max_concurrency(),
            api_port: default_api_port(),
        }
    }
}

impl ProbeAgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("PROBE"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|_| Self::default()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            ledger_endpoint: self.ledger_endpoint.clone(),
            market_api_endpoint: self.market_api_endpoint.clone(),
            timeout: Duration::from_secs(self.ledger_timeout_secs),
        }
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            workload_marker: self.workload_marker.clone(),
            key_path: self.key_path.clone(),
            max_concurrency: self.max_concurrency,
        }
    }

    pub fn loop_config(&self) -> ProbeLoopConfig {
        ProbeLoopConfig {
            interval: Duration::from_secs(self.probe_interval_secs),
            probe_timeout: self.probe_timeout(),
            ..ProbeLoopConfig::default()
        }
    }
}
