//! Container runtime access
//!
//! This module talks to the container runtime's control API over its
//! local socket. It provides container discovery and single-file
//! extraction from a container's filesystem.

mod archive;
mod client;
mod discovery;


pub use archive::{
    decode_single_file, extract_file, parse_size_field, ArchiveError, HEADER_BLOCK_SIZE,
    SIZE_FIELD_LEN, SIZE_FIELD_OFFSET,
};
pub use client::{DockerClient, DEFAULT_DOCKER_SOCKET};
pub use discovery::{
    container_display_name, filter_target_containers, list_target_containers, ListedContainer,
};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Raw response from the runtime control API
#[derive(Debug, Clone)]
pub struct RuntimeResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RuntimeResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Failure to complete a request against the control socket
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid request path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("{0}")]
    Request(#[from] hyper::Error),

    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

/// Read-only access to the container runtime's control API
#[async_trait]
pub trait RuntimeApi: Send + Sync {
    /// Issue a GET for `path` and return the status code and full body
    async fn get(&self, path: &str) -> Result<RuntimeResponse, TransportError>;
}
