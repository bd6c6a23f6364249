//! Read-only access to ledger state
//!
//! The probe consumes markets, active runs, jobs and market display
//! names through [`LedgerSource`]. [`HttpLedger`] reads them from a JSON
//! gateway in front of the chain.

mod http;

pub use http::{HttpLedger, LedgerConfig};

use crate::models::{JobRecord, Market, MarketListing, RunRecord, WalletAddress};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Source of ledger state for status aggregation
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// All markets with their queues and timeouts
    async fn markets(&self) -> Result<Vec<Market>>;

    /// Active runs of `node`, most relevant first
    async fn runs_for_node(&self, node: &WalletAddress) -> Result<Vec<RunRecord>>;

    /// Job record by id, `None` if it does not exist
    async fn job(&self, job: &str) -> Result<Option<JobRecord>>;

    /// Human-readable market names
    async fn market_names(&self) -> Result<Vec<MarketListing>>;
}

/// Constructs the ledger client for a probe run
pub type LedgerFactory = Arc<dyn Fn() -> Result<Arc<dyn LedgerSource>> + Send + Sync>;
