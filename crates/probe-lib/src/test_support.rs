//! Shared fixtures for unit tests

use crate::ledger::LedgerSource;
use crate::models::{JobRecord, Market, MarketListing, QueueType, RunRecord, WalletAddress};
use crate::runtime::{RuntimeApi, RuntimeResponse, TransportError, HEADER_BLOCK_SIZE};
use anyhow::Result;
use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Build a single-entry tar body holding `payload`
pub fn tar_with_payload(payload: &[u8]) -> Vec<u8> {
    let mut body = vec![0u8; HEADER_BLOCK_SIZE];
    body[..14].copy_from_slice(b"nosana_key.js\0");
    let size = format!("{:011o}\0", payload.len());
    body[124..136].copy_from_slice(size.as_bytes());
    body.extend_from_slice(payload);
    let padded = body.len().div_ceil(HEADER_BLOCK_SIZE) * HEADER_BLOCK_SIZE;
    body.resize(padded + HEADER_BLOCK_SIZE * 2, 0);
    body
}

/// Deterministic signing key derived from `seed_byte`
pub fn signing_key(seed_byte: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed_byte; 32])
}

/// Credential file contents for `key`: a JSON array of 64 byte values
pub fn credential_json(key: &SigningKey) -> Vec<u8> {
    let bytes: Vec<u8> = key.to_keypair_bytes().to_vec();
    serde_json::to_vec(&bytes).unwrap()
}

/// Wallet address expected for `key`
pub fn wallet_for(key: &SigningKey) -> WalletAddress {
    WalletAddress::new(bs58::encode(key.verifying_key().to_bytes()).into_string())
}

pub fn node_market(address: &str, queue: &[&WalletAddress], timeout: u64) -> Market {
    Market {
        address: address.to_string(),
        queue_type: QueueType::Node,
        queue: queue.iter().map(|w| (*w).clone()).collect(),
        job_timeout: timeout,
    }
}

/// Canned runtime keyed by request path
#[derive(Default)]
pub struct MockRuntime {
    responses: HashMap<String, (u16, Vec<u8>)>,
    refuse: bool,
    pub calls: AtomicUsize,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runtime whose socket refuses every connection
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn with(mut self, path: &str, status: u16, body: impl Into<Vec<u8>>) -> Self {
        self.responses.insert(path.to_string(), (status, body.into()));
        self
    }

    pub fn with_listing(self, listing: serde_json::Value) -> Self {
        self.with("/containers/json", 200, listing.to_string())
    }

    pub fn with_key_file(self, container_id: &str, contents: &[u8]) -> Self {
        let path = format!(
            "/containers/{}/archive?path=%2Froot%2F.nosana%2Fnosana_key.json",
            container_id
        );
        self.with(&path, 200, tar_with_payload(contents))
    }
}

#[async_trait]
impl RuntimeApi for MockRuntime {
    async fn get(&self, path: &str) -> Result<RuntimeResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.refuse {
            return Err(TransportError::Timeout(std::time::Duration::from_secs(10)));
        }

        let (status, body) = self
            .responses
            .get(path)
            .cloned()
            .unwrap_or((404, b"{\"message\":\"not found\"}".to_vec()));
        Ok(RuntimeResponse { status, body })
    }
}

/// Configurable in-memory ledger
#[derive(Default)]
pub struct MockLedger {
    pub markets: Option<Vec<Market>>,
    pub names: Option<Vec<MarketListing>>,
    pub runs: HashMap<WalletAddress, Vec<RunRecord>>,
    pub failing_runs: bool,
    pub jobs: HashMap<String, JobRecord>,
    pub failing_jobs: bool,
    pub run_queries: Mutex<Vec<WalletAddress>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            markets: Some(Vec::new()),
            names: Some(Vec::new()),
            ..Self::default()
        }
    }

    pub fn with_market(mut self, market: Market) -> Self {
        self.markets.get_or_insert_with(Vec::new).push(market);
        self
    }

    pub fn with_run(mut self, wallet: &WalletAddress, job: &str, start: i64) -> Self {
        self.runs.entry(wallet.clone()).or_default().push(RunRecord {
            node: wallet.clone(),
            job: Some(job.to_string()),
            start_epoch_seconds: Some(start),
        });
        self
    }

    pub fn with_job(mut self, job: &str, market: &str) -> Self {
        self.jobs.insert(
            job.to_string(),
            JobRecord {
                market: Some(market.to_string()),
            },
        );
        self
    }
}

#[async_trait]
impl LedgerSource for MockLedger {
    async fn markets(&self) -> Result<Vec<Market>> {
        self.markets
            .clone()
            .ok_or_else(|| anyhow::anyhow!("markets unavailable"))
    }

    async fn runs_for_node(&self, node: &WalletAddress) -> Result<Vec<RunRecord>> {
        self.run_queries.lock().unwrap().push(node.clone());
        if self.failing_runs {
            anyhow::bail!("rpc connection reset");
        }
        Ok(self.runs.get(node).cloned().unwrap_or_default())
    }

    async fn job(&self, job: &str) -> Result<Option<JobRecord>> {
        if self.failing_jobs {
            anyhow::bail!("job account fetch failed");
        }
        Ok(self.jobs.get(job).cloned())
    }

    async fn market_names(&self) -> Result<Vec<MarketListing>> {
        self.names
            .clone()
            .ok_or_else(|| anyhow::anyhow!("market api unavailable"))
    }
}
