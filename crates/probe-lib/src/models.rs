//! Core data models for the node probe

use serde::{Deserialize, Serialize};
use std::fmt;

/// Public address derived from a node's signing keypair
///
/// Used as the join key between a container and ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A container matched by discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: String,
    pub display_name: String,
    pub image_ref: String,
}

/// Kind of waiting list a market maintains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum QueueType {
    /// Jobs waiting for nodes
    Job,
    /// Nodes waiting for jobs
    Node,
    Unknown(u8),
}

impl From<u8> for QueueType {
    fn from(value: u8) -> Self {
        match value {
            0 => QueueType::Job,
            1 => QueueType::Node,
            other => QueueType::Unknown(other),
        }
    }
}

impl From<QueueType> for u8 {
    fn from(value: QueueType) -> Self {
        match value {
            QueueType::Job => 0,
            QueueType::Node => 1,
            QueueType::Unknown(other) => other,
        }
    }
}

/// Market snapshot as returned by the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub address: String,
    pub queue_type: QueueType,
    #[serde(default)]
    pub queue: Vec<WalletAddress>,
    /// Maximum job duration in seconds (0 when unset)
    #[serde(default)]
    pub job_timeout: u64,
}

impl Market {
    /// Job timeout, treating zero as unknown
    pub fn max_duration(&self) -> Option<u64> {
        Some(self.job_timeout).filter(|t| *t > 0)
    }
}

/// An active run of a job on a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub node: WalletAddress,
    #[serde(default)]
    pub job: Option<String>,
    /// Run start as unix seconds
    #[serde(default, rename = "time")]
    pub start_epoch_seconds: Option<i64>,
}

/// The part of a job record the probe needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(default)]
    pub market: Option<String>,
}

/// Human-readable market metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketListing {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

impl MarketListing {
    /// Best display name: name, then slug, then the raw address
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.slug.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(&self.address)
    }
}

/// Normalized node status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    /// Not yet evaluated against the ledger
    Unknown,
    Idle,
    Queued,
    Running,
    Error,
}

impl ProbeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Unknown => "unknown",
            ProbeStatus::Idle => "idle",
            ProbeStatus::Queued => "queued",
            ProbeStatus::Running => "running",
            ProbeStatus::Error => "error",
        }
    }
}

/// Status record for one discovered node
///
/// Every field serializes, with `null` meaning unknown or not applicable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub container: String,
    pub wallet: Option<WalletAddress>,
    pub status: ProbeStatus,
    pub market: Option<String>,
    pub market_name: Option<String>,
    pub queue_position: Option<usize>,
    pub queue_length: Option<usize>,
    pub job: Option<String>,
    /// Seconds since the current run started
    pub duration: Option<i64>,
    /// Job timeout of the market, in seconds
    pub max_duration: Option<u64>,
    pub error: Option<String>,
}

impl NodeStatus {
    /// A fresh record for a container that has not been evaluated yet
    pub fn pending(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            wallet: None,
            status: ProbeStatus::Unknown,
            market: None,
            market_name: None,
            queue_position: None,
            queue_length: None,
            job: None,
            duration: None,
            max_duration: None,
            error: None,
        }
    }
}

/// Result of one probe run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub nodes: Vec<NodeStatus>,
    pub error: Option<String>,
}

impl ProbeReport {
    /// A report for a run that could not probe at all
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            nodes: Vec::new(),
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_status_serializes_nulls() {
        let node = NodeStatus::pending("nosana-node-1");
        let json = serde_json::to_value(&node).unwrap();

        assert_eq!(json["container"], "nosana-node-1");
        assert_eq!(json["status"], "unknown");
        for field in [
            "wallet",
            "market",
            "market_name",
            "queue_position",
            "queue_length",
            "job",
            "duration",
            "max_duration",
            "error",
        ] {
            assert!(json[field].is_null(), "{field} should be null");
            assert!(json.as_object().unwrap().contains_key(field));
        }
    }

    #[test]
    fn test_market_deserializes_camel_case() {
        let market: Market = serde_json::from_str(
            r#"{"address":"M1","queueType":1,"queue":["A","B"],"jobTimeout":3600}"#,
        )
        .unwrap();

        assert_eq!(market.queue_type, QueueType::Node);
        assert_eq!(market.queue.len(), 2);
        assert_eq!(market.max_duration(), Some(3600));
    }

    #[test]
    fn test_market_zero_timeout_is_unknown() {
        let market: Market =
            serde_json::from_str(r#"{"address":"M1","queueType":0}"#).unwrap();

        assert_eq!(market.queue_type, QueueType::Job);
        assert!(market.queue.is_empty());
        assert_eq!(market.max_duration(), None);
    }

    #[test]
    fn test_unknown_queue_type_is_preserved() {
        let market: Market = serde_json::from_str(r#"{"address":"M1","queueType":7}"#).unwrap();
        assert_eq!(market.queue_type, QueueType::Unknown(7));
    }

    #[test]
    fn test_market_listing_display_name_fallback() {
        let named = MarketListing {
            address: "Addr".to_string(),
            name: Some("RTX 4090".to_string()),
            slug: Some("rtx-4090".to_string()),
        };
        let slug_only = MarketListing {
            address: "Addr".to_string(),
            name: None,
            slug: Some("rtx-4090".to_string()),
        };
        let bare = MarketListing {
            address: "Addr".to_string(),
            name: Some(String::new()),
            slug: None,
        };

        assert_eq!(named.display_name(), "RTX 4090");
        assert_eq!(slug_only.display_name(), "rtx-4090");
        assert_eq!(bare.display_name(), "Addr");
    }

    #[test]
    fn test_failed_report() {
        let report = ProbeReport::failed("boom");
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(json, r#"{"nodes":[],"error":"boom"}"#);
    }
}
