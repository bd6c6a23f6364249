//! HTTP client for the Docker control socket

use super::{RuntimeApi, RuntimeResponse, TransportError};
use async_trait::async_trait;
use hyper::{body, client::Client, Body};
use hyperlocal::{UnixClientExt, UnixConnector};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default location of the Docker control socket
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Runtime client speaking HTTP/1.1 over a Unix socket
#[derive(Clone)]
pub struct DockerClient {
    client: Client<UnixConnector, Body>,
    socket_path: PathBuf,
    timeout: Duration,
}

impl DockerClient {
    /// Create a client for the socket at `socket_path`
    ///
    /// No connection is made until the first request.
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            client: Client::unix(),
            socket_path: socket_path.into(),
            timeout,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn send(&self, path: &str) -> Result<RuntimeResponse, TransportError> {
        let uri: hyper::Uri = hyperlocal::Uri::new(&self.socket_path, path).into();

        let response = self.client.get(uri).await?;
        let status = response.status().as_u16();
        let body = body::to_bytes(response.into_body()).await?;

        Ok(RuntimeResponse {
            status,
            body: body.to_vec(),
        })
    }
}

#[async_trait]
impl RuntimeApi for DockerClient {
    async fn get(&self, path: &str) -> Result<RuntimeResponse, TransportError> {
        if !path.starts_with('/') {
            return Err(TransportError::InvalidPath {
                path: path.to_string(),
                reason: "must be absolute".to_string(),
            });
        }

        // Dropping the future on timeout aborts the in-flight request
        let response = tokio::time::timeout(self.timeout, self.send(path))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))??;

        debug!(
            path = %path,
            status = response.status,
            bytes = response.body.len(),
            "Runtime request complete"
        );

        Ok(response)
    }
}
