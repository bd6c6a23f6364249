//! Probe orchestration
//!
//! A probe run discovers target containers, resolves each node's wallet
//! and evaluates it against the ledger. Containers are processed
//! independently: a failure in one container's pipeline becomes that
//! node's `error` and never aborts the run.

mod r#loop;


pub use r#loop::{ProbeLoop, ProbeLoopConfig, ProbeState, ProbeStateHandle};

use crate::identity::{resolve_wallet, DEFAULT_KEY_PATH};
use crate::ledger::{LedgerFactory, LedgerSource};
use crate::models::{ContainerRecord, NodeStatus, ProbeReport, WalletAddress};
use crate::runtime::{list_target_containers, RuntimeApi, TransportError};
use crate::status::{NodeState, StatusAggregator};
use anyhow::Result;
use futures::{stream, FutureExt, StreamExt};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error reported for nodes whose wallet cannot be resolved
pub const UNIDENTIFIED_NODE_ERROR: &str = "Could not extract wallet key";

/// Default substring identifying target container images
pub const DEFAULT_WORKLOAD_MARKER: &str = "nosana";

/// Configuration for a probe run
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Substring of the image reference marking target containers
    pub workload_marker: String,
    /// Path of the keypair file inside each container
    pub key_path: String,
    /// Maximum number of containers processed at once
    pub max_concurrency: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            workload_marker: DEFAULT_WORKLOAD_MARKER.to_string(),
            key_path: DEFAULT_KEY_PATH.to_string(),
            max_concurrency: 4,
        }
    }
}

/// What a run learned about its external dependencies
#[derive(Debug, Clone, Default)]
pub struct RunDiagnostics {
    /// Set when the runtime could not be reached
    pub runtime_error: Option<String>,
    /// Set when the ledger client could not be created
    pub ledger_unavailable: Option<String>,
    /// Shared reads that failed and were treated as empty
    pub ledger_warnings: Vec<String>,
    /// Whether the run got as far as the ledger
    pub ledger_used: bool,
}

/// Failure inside one container's pipeline
#[derive(Debug, Error)]
enum ContainerFault {
    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("node evaluation panicked: {0}")]
    Panicked(String),
}

/// Result of one container's pipeline
enum NodeOutcome {
    Unidentified,
    Evaluated {
        wallet: WalletAddress,
        state: NodeState,
    },
    /// The wallet is kept when the fault happened after it was resolved
    Faulted {
        wallet: Option<WalletAddress>,
        fault: ContainerFault,
    },
}

/// Read-only data shared by every container in a run
struct RunContext {
    runtime: Arc<dyn RuntimeApi>,
    key_path: String,
    aggregator: StatusAggregator,
    market_names: HashMap<String, String>,
}

/// Drives probe runs over all target containers
pub struct Prober {
    runtime: Arc<dyn RuntimeApi>,
    ledger_factory: LedgerFactory,
    config: ProbeConfig,
}

impl Prober {
    /// Create a new prober
    pub fn new(
        runtime: Arc<dyn RuntimeApi>,
        ledger_factory: LedgerFactory,
        config: ProbeConfig,
    ) -> Self {
        Self {
            runtime,
            ledger_factory,
            config,
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Run one probe and return its report
    pub async fn run(&self) -> ProbeReport {
        self.run_with_diagnostics().await.0
    }

    /// Run one probe, also returning what was learned about dependencies
    pub async fn run_with_diagnostics(&self) -> (ProbeReport, RunDiagnostics) {
        let mut diagnostics = RunDiagnostics::default();

        let containers =
            match list_target_containers(self.runtime.as_ref(), &self.config.workload_marker)
                .await
            {
                Ok(containers) => containers,
                Err(e) => {
                    warn!(error = %e, "Container runtime unavailable");
                    diagnostics.runtime_error = Some(e.to_string());
                    return (
                        ProbeReport::failed(format!("Docker socket unavailable: {}", e)),
                        diagnostics,
                    );
                }
            };

        if containers.is_empty() {
            info!("No target containers found");
            return (ProbeReport::default(), diagnostics);
        }

        let ledger = match (self.ledger_factory)() {
            Ok(ledger) => ledger,
            Err(e) => {
                warn!(error = %e, "Failed to create ledger client");
                diagnostics.ledger_unavailable = Some(format!("{:#}", e));
                return (
                    ProbeReport::failed(format!("Failed to create ledger client: {:#}", e)),
                    diagnostics,
                );
            }
        };
        diagnostics.ledger_used = true;

        let context = Arc::new(self.prepare_context(ledger, &mut diagnostics).await);

        // Each item owns its data so the run future stays Send
        let outcomes: Vec<NodeOutcome> = stream::iter(containers.clone())
            .map(|container| {
                let context = context.clone();
                async move { probe_container(&container, &context).await }
            })
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let nodes = containers
            .iter()
            .zip(outcomes)
            .map(|(container, outcome)| build_node(container, outcome, &context.market_names))
            .collect();

        (ProbeReport { nodes, error: None }, diagnostics)
    }

    /// Fetch the market snapshot and display names shared by the run
    async fn prepare_context(
        &self,
        ledger: Arc<dyn LedgerSource>,
        diagnostics: &mut RunDiagnostics,
    ) -> RunContext {
        let (markets, names) = tokio::join!(ledger.markets(), ledger.market_names());

        let markets = markets.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to fetch markets, queue positions unavailable");
            diagnostics.ledger_warnings.push(format!("markets: {}", e));
            Vec::new()
        });

        let market_names = match names {
            Ok(listings) => listings
                .iter()
                .map(|l| (l.address.clone(), l.display_name().to_string()))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to fetch market names, using addresses");
                diagnostics.ledger_warnings.push(format!("market names: {}", e));
                HashMap::new()
            }
        };

        debug!(markets = markets.len(), "Prepared market snapshot");

        RunContext {
            runtime: self.runtime.clone(),
            key_path: self.config.key_path.clone(),
            aggregator: StatusAggregator::new(ledger, Arc::new(markets)),
            market_names,
        }
    }
}

/// Run one container's pipeline, converting panics into faults
async fn probe_container(container: &ContainerRecord, context: &RunContext) -> NodeOutcome {
    let resolved = AssertUnwindSafe(resolve_wallet(
        context.runtime.as_ref(),
        &container.id,
        &context.key_path,
    ))
    .catch_unwind()
    .await;

    let wallet = match resolved {
        Ok(Ok(Some(wallet))) => wallet,
        Ok(Ok(None)) => {
            debug!(container = %container.display_name, "Wallet key not found");
            return NodeOutcome::Unidentified;
        }
        Ok(Err(e)) => {
            return NodeOutcome::Faulted {
                wallet: None,
                fault: e.into(),
            }
        }
        Err(payload) => {
            return NodeOutcome::Faulted {
                wallet: None,
                fault: ContainerFault::Panicked(panic_message(payload)),
            }
        }
    };

    match AssertUnwindSafe(context.aggregator.evaluate(&wallet))
        .catch_unwind()
        .await
    {
        Ok(state) => NodeOutcome::Evaluated { wallet, state },
        Err(payload) => NodeOutcome::Faulted {
            wallet: Some(wallet),
            fault: ContainerFault::Panicked(panic_message(payload)),
        },
    }
}

/// Turn a container's outcome into its reported status
fn build_node(
    container: &ContainerRecord,
    outcome: NodeOutcome,
    market_names: &HashMap<String, String>,
) -> NodeStatus {
    let mut node = NodeStatus::pending(container.display_name.clone());

    match outcome {
        NodeOutcome::Unidentified => {
            node.error = Some(UNIDENTIFIED_NODE_ERROR.to_string());
        }
        NodeOutcome::Evaluated { wallet, state } => {
            node.wallet = Some(wallet);
            state.apply_to(&mut node);
            node.market_name = node
                .market
                .as_ref()
                .map(|m| market_names.get(m).cloned().unwrap_or_else(|| m.clone()));
        }
        NodeOutcome::Faulted { wallet, fault } => {
            warn!(container = %container.display_name, error = %fault, "Node probe failed");
            node.wallet = wallet;
            node.error = Some(fault.to_string());
        }
    }

    node
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Builder for creating a prober
pub struct ProberBuilder {
    runtime: Option<Arc<dyn RuntimeApi>>,
    ledger_factory: Option<LedgerFactory>,
    config: ProbeConfig,
}

impl ProberBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            runtime: None,
            ledger_factory: None,
            config: ProbeConfig::default(),
        }
    }

    /// Set the container runtime client
    pub fn runtime(mut self, runtime: Arc<dyn RuntimeApi>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Set how the ledger client is created for each run
    pub fn ledger_factory(mut self, factory: LedgerFactory) -> Self {
        self.ledger_factory = Some(factory);
        self
    }

    /// Use an already constructed ledger client for every run
    pub fn ledger(self, ledger: Arc<dyn LedgerSource>) -> Self {
        self.ledger_factory(Arc::new(move || Ok::<_, anyhow::Error>(ledger.clone())))
    }

    pub fn workload_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.workload_marker = marker.into();
        self
    }

    pub fn key_path(mut self, path: impl Into<String>) -> Self {
        self.config.key_path = path.into();
        self
    }

    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.config.max_concurrency = max;
        self
    }

    /// Build the prober
    pub fn build(self) -> Result<Prober> {
        let runtime = self
            .runtime
            .ok_or_else(|| anyhow::anyhow!("Runtime client is required"))?;
        let ledger_factory = self
            .ledger_factory
            .ok_or_else(|| anyhow::anyhow!("Ledger factory is required"))?;

        if self.config.workload_marker.is_empty() {
            anyhow::bail!("Workload marker must not be empty");
        }

        Ok(Prober::new(runtime, ledger_factory, self.config))
    }
}

impl Default for ProberBuilder {
    fn default() -> Self {
        Self::new()
    }
}
