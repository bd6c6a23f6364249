//! Node probe library for GPU compute hosts
//!
//! This crate provides the core functionality for:
//! - Discovering node containers through the container runtime socket
//! - Extracting each node's keypair and deriving its wallet address
//! - Merging ledger queue and run data into a per-node status
//! - Health checks and observability

pub mod health;
pub mod identity;
pub mod ledger;
pub mod models;
pub mod observability;
pub mod probe;
pub mod runtime;
pub mod status;

#[cfg(test)]
mod test_support;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use ledger::{HttpLedger, LedgerConfig, LedgerFactory, LedgerSource};
pub use models::*;
pub use observability::{ProbeMetrics, StructuredLogger};
pub use probe::{
    ProbeConfig, ProbeLoop, ProbeLoopConfig, ProbeState, ProbeStateHandle, Prober, ProberBuilder,
};
pub use runtime::{DockerClient, RuntimeApi};
