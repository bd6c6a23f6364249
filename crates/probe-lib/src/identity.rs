//! Node identity resolution
//!
//! A node keeps its signing keypair as a JSON array of 64 byte values:
//! the 32-byte Ed25519 seed followed by the 32-byte public key. The
//! node's wallet address is the base58 encoding of that public key.

use crate::models::WalletAddress;
use crate::runtime::{extract_file, RuntimeApi, TransportError};
use ed25519_dalek::{SigningKey, KEYPAIR_LENGTH};
use tracing::debug;

/// Well-known location of the node's keypair inside its container
pub const DEFAULT_KEY_PATH: &str = "/root/.nosana/nosana_key.json";

/// Derive the wallet address from credential file contents
///
/// Returns `None` unless the contents are a JSON array of exactly 64
/// byte values forming a consistent keypair.
pub fn parse_credential(bytes: &[u8]) -> Option<WalletAddress> {
    let values: Vec<serde_json::Value> = match serde_json::from_slice(bytes) {
        Ok(serde_json::Value::Array(values)) => values,
        Ok(_) => {
            debug!("Credential is not an array");
            return None;
        }
        Err(e) => {
            debug!(error = %e, "Credential is not valid JSON");
            return None;
        }
    };

    if values.len() != KEYPAIR_LENGTH {
        debug!(len = values.len(), "Credential has wrong length");
        return None;
    }

    let mut keypair = [0u8; KEYPAIR_LENGTH];
    for (slot, value) in keypair.iter_mut().zip(&values) {
        *slot = value.as_u64().and_then(|v| u8::try_from(v).ok())?;
    }

    // Rejects keypairs whose public half does not match the seed
    let signing_key = match SigningKey::from_keypair_bytes(&keypair) {
        Ok(key) => key,
        Err(e) => {
            debug!(error = %e, "Credential is not a valid keypair");
            return None;
        }
    };

    let address = bs58::encode(signing_key.verifying_key().to_bytes()).into_string();
    Some(WalletAddress::new(address))
}

/// Resolve the wallet address of the node running in `container_id`
///
/// `Ok(None)` means the node cannot be identified. Transport failures are
/// returned as errors.
pub async fn resolve_wallet(
    runtime: &dyn RuntimeApi,
    container_id: &str,
    key_path: &str,
) -> Result<Option<WalletAddress>, TransportError> {
    let Some(bytes) = extract_file(runtime, container_id, key_path).await? else {
        return Ok(None);
    };

    Ok(parse_credential(&bytes))
}
