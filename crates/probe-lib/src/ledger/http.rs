//! HTTP client for the ledger gateway

use super::LedgerSource;
use crate::models::{JobRecord, Market, MarketListing, RunRecord, WalletAddress};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Configuration for the ledger client
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Gateway serving markets, runs and jobs
    pub ledger_endpoint: String,
    /// API serving market display names
    pub market_api_endpoint: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            ledger_endpoint: "http://localhost:8899".to_string(),
            market_api_endpoint: "https://dashboard.k8s.prd.nos.ci".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Ledger client reading JSON over HTTP
#[derive(Clone)]
pub struct HttpLedger {
    client: Client,
    ledger_url: Url,
    market_api_url: Url,
}

impl HttpLedger {
    /// Create a new ledger client
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let ledger_url = base_url(&config.ledger_endpoint).context("Invalid ledger endpoint")?;
        let market_api_url =
            base_url(&config.market_api_endpoint).context("Invalid market API endpoint")?;

        Ok(Self {
            client,
            ledger_url,
            market_api_url,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        debug!(url = %url, "Ledger request");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url.path()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("ledger error ({}): {}", status, body);
        }

        let value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url.path()))?;
        Ok(Some(value))
    }

    async fn get_list<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>> {
        let path = url.path().to_string();
        self.get_json(url)
            .await?
            .with_context(|| format!("{} not found", path))
    }
}

/// Parse `endpoint` so that relative joins append to its path
fn base_url(endpoint: &str) -> Result<Url> {
    let mut url = Url::parse(endpoint)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[async_trait]
impl LedgerSource for HttpLedger {
    async fn markets(&self) -> Result<Vec<Market>> {
        let url = self.ledger_url.join("markets")?;
        self.get_list(url).await
    }

    async fn runs_for_node(&self, node: &WalletAddress) -> Result<Vec<RunRecord>> {
        let mut url = self.ledger_url.join("runs")?;
        url.query_pairs_mut().append_pair("node", node.as_str());
        self.get_list(url).await
    }

    async fn job(&self, job: &str) -> Result<Option<JobRecord>> {
        let mut url = self.ledger_url.join("jobs/")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("ledger endpoint cannot be a base"))?
            .pop_if_empty()
            .push(job);
        self.get_json(url).await
    }

    async fn market_names(&self) -> Result<Vec<MarketListing>> {
        let url = self.market_api_url.join("api/markets")?;
        self.get_list(url).await
    }
}
