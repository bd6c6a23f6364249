//! Node status aggregation
//!
//! Merges the queue listing and the active-run listing for one wallet
//! into a single status. The merge is a small state machine:
//!
//! ```text
//!   Idle ──queue match──► Queued ──run found──► Running
//!    │ └──────────────────run found───────────────▲
//!    └──run lookup failed──► Error
//! ```
//!
//! A failed run lookup never downgrades a queued node. A running node
//! starts from the queue's market and timeout, and its job overrides them
//! when it resolves.

use crate::ledger::LedgerSource;
use crate::models::{Market, NodeStatus, ProbeStatus, QueueType, RunRecord, WalletAddress};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a node sits in a market's queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSlot {
    pub market: String,
    /// 1-based position
    pub position: usize,
    pub length: usize,
    pub max_duration: Option<u64>,
}

/// The run a node is currently executing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRun {
    pub job: Option<String>,
    pub duration: Option<i64>,
    pub market: Option<String>,
    pub max_duration: Option<u64>,
}

/// Status of a node while its ledger signals are merged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Idle,
    Queued(QueueSlot),
    Running(ActiveRun),
    Error(String),
}

impl NodeState {
    /// A queue match only moves an idle node
    pub fn on_queue_match(self, slot: QueueSlot) -> Self {
        match self {
            NodeState::Idle => NodeState::Queued(slot),
            other => other,
        }
    }

    /// An active run takes precedence over a possibly stale queue entry
    pub fn on_active_run(self, run: ActiveRun) -> Self {
        match self {
            NodeState::Idle | NodeState::Queued(_) => NodeState::Running(run),
            other => other,
        }
    }

    /// A failed run lookup is only reported when nothing else is known
    pub fn on_run_lookup_failed(self, message: String) -> Self {
        match self {
            NodeState::Idle => NodeState::Error(message),
            other => other,
        }
    }

    pub fn status(&self) -> ProbeStatus {
        match self {
            NodeState::Idle => ProbeStatus::Idle,
            NodeState::Queued(_) => ProbeStatus::Queued,
            NodeState::Running(_) => ProbeStatus::Running,
            NodeState::Error(_) => ProbeStatus::Error,
        }
    }

    /// Write this state into a node record
    pub fn apply_to(self, node: &mut NodeStatus) {
        node.status = self.status();
        match self {
            NodeState::Idle => {}
            NodeState::Queued(slot) => {
                node.market = Some(slot.market);
                node.queue_position = Some(slot.position);
                node.queue_length = Some(slot.length);
                node.max_duration = slot.max_duration;
            }
            NodeState::Running(run) => {
                node.market = run.market;
                node.job = run.job;
                node.duration = run.duration;
                node.max_duration = run.max_duration;
                node.queue_position = None;
                node.queue_length = None;
            }
            NodeState::Error(message) => {
                node.error = Some(message);
            }
        }
    }
}

/// Find the first node queue containing `wallet`, in listing order
pub fn find_queue_slot(markets: &[Market], wallet: &WalletAddress) -> Option<QueueSlot> {
    markets
        .iter()
        .filter(|m| m.queue_type == QueueType::Node)
        .find_map(|m| {
            let index = m.queue.iter().position(|w| w == wallet)?;
            Some(QueueSlot {
                market: m.address.clone(),
                position: index + 1,
                length: m.queue.len(),
                max_duration: m.max_duration(),
            })
        })
}

/// Evaluates wallets against a shared market snapshot
pub struct StatusAggregator {
    ledger: Arc<dyn LedgerSource>,
    markets: Arc<Vec<Market>>,
    markets_by_address: HashMap<String, usize>,
}

impl StatusAggregator {
    pub fn new(ledger: Arc<dyn LedgerSource>, markets: Arc<Vec<Market>>) -> Self {
        let markets_by_address = markets
            .iter()
            .enumerate()
            .map(|(i, m)| (m.address.clone(), i))
            .collect();

        Self {
            ledger,
            markets,
            markets_by_address,
        }
    }

    /// Evaluate `wallet` against the ledger as of now
    pub async fn evaluate(&self, wallet: &WalletAddress) -> NodeState {
        self.evaluate_at(wallet, chrono::Utc::now().timestamp()).await
    }

    /// Evaluate `wallet` with `now` as the current unix time
    pub async fn evaluate_at(&self, wallet: &WalletAddress, now: i64) -> NodeState {
        let mut state = NodeState::Idle;

        let slot = find_queue_slot(&self.markets, wallet);
        if let Some(slot) = &slot {
            debug!(wallet = %wallet, market = %slot.market, position = slot.position, "Node is queued");
            state = state.on_queue_match(slot.clone());
        }

        match self.ledger.runs_for_node(wallet).await {
            Ok(runs) => {
                // Only the first run is authoritative
                if let Some(run) = runs.into_iter().next() {
                    let active = self.resolve_run(run, now, slot.as_ref()).await;
                    state = state.on_active_run(active);
                }
            }
            Err(e) => {
                warn!(wallet = %wallet, error = %e, "Runs query failed");
                state = state.on_run_lookup_failed(format!("runs query failed: {}", e));
            }
        }

        state
    }

    /// Resolve a run's job to its market, starting from the queue slot's values
    async fn resolve_run(
        &self,
        run: RunRecord,
        now: i64,
        slot: Option<&QueueSlot>,
    ) -> ActiveRun {
        // A zero start time means unknown; out-of-range values yield no duration
        let duration = run
            .start_epoch_seconds
            .filter(|start| *start > 0)
            .and_then(|start| now.checked_sub(start));
        let mut active = ActiveRun {
            job: run.job,
            duration,
            market: slot.map(|s| s.market.clone()),
            max_duration: slot.and_then(|s| s.max_duration),
        };

        let Some(job_id) = active.job.clone() else {
            return active;
        };

        match self.ledger.job(&job_id).await {
            Ok(Some(job)) => {
                if let Some(market) = job.market {
                    // The timeout is only replaced when the market is in the snapshot
                    if let Some(i) = self.markets_by_address.get(&market) {
                        active.max_duration = self.markets[*i].max_duration();
                    }
                    active.market = Some(market);
                }
            }
            Ok(None) => debug!(job = %job_id, "Job not found"),
            Err(e) => debug!(job = %job_id, error = %e, "Job lookup failed"),
        }

        active
    }
}
