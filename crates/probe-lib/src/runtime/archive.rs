//! Single-file extraction from the runtime's archive endpoint
//!
//! The archive endpoint streams a tar archive. For the one small file
//! the probe needs, only the first header block is decoded:
//!
//! ```text
//!  0                124          136                 512          512+size
//!  +-----------------+------------+-------------------+--------------+
//!  | name, mode, ... | size (oct) | remaining header  | file payload |
//!  +-----------------+------------+-------------------+--------------+
//! ```
//!
//! Multiple entries, extended headers and anything else that does not
//! fit this shape are rejected rather than interpreted.

use super::{RuntimeApi, TransportError};
use thiserror::Error;
use tracing::debug;
use url::form_urlencoded;

/// Size of a tar header block
pub const HEADER_BLOCK_SIZE: usize = 512;
/// Byte offset of the size field within the header block
pub const SIZE_FIELD_OFFSET: usize = 124;
/// Width of the size field
pub const SIZE_FIELD_LEN: usize = 12;

/// Reasons an archive body is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchiveError {
    #[error("archive too short: {0} bytes")]
    TooShort(usize),

    #[error("invalid size field {0:?}")]
    InvalidSize(String),

    #[error("empty file entry")]
    EmptyEntry,

    #[error("declared size {declared} exceeds available {available} bytes")]
    Truncated { declared: u64, available: usize },
}

/// Parse the octal size field of a header block
///
/// NUL bytes are removed and surrounding whitespace trimmed before
/// parsing. Anything other than plain octal digits is rejected.
pub fn parse_size_field(header: &[u8]) -> Result<u64, ArchiveError> {
    if header.len() < HEADER_BLOCK_SIZE {
        return Err(ArchiveError::TooShort(header.len()));
    }

    let field = &header[SIZE_FIELD_OFFSET..SIZE_FIELD_OFFSET + SIZE_FIELD_LEN];
    let text: String = field
        .iter()
        .filter(|b| **b != 0)
        .map(|b| *b as char)
        .collect();
    let digits = text.trim();

    if digits.is_empty() || !digits.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
        return Err(ArchiveError::InvalidSize(text));
    }

    u64::from_str_radix(digits, 8).map_err(|_| ArchiveError::InvalidSize(text.clone()))
}

/// Slice the payload of the first and only entry out of an archive body
pub fn decode_single_file(body: &[u8]) -> Result<&[u8], ArchiveError> {
    let size = parse_size_field(body)?;
    if size == 0 {
        return Err(ArchiveError::EmptyEntry);
    }

    let end = usize::try_from(size)
        .ok()
        .and_then(|s| HEADER_BLOCK_SIZE.checked_add(s))
        .filter(|end| *end <= body.len())
        .ok_or(ArchiveError::Truncated {
            declared: size,
            available: body.len().saturating_sub(HEADER_BLOCK_SIZE),
        })?;

    Ok(&body[HEADER_BLOCK_SIZE..end])
}

/// Fetch `path` from inside a container
///
/// Returns `Ok(None)` when the runtime refuses the request or the archive
/// cannot be decoded.
pub async fn extract_file(
    runtime: &dyn RuntimeApi,
    container_id: &str,
    path: &str,
) -> Result<Option<Vec<u8>>, TransportError> {
    let encoded: String = form_urlencoded::byte_serialize(path.as_bytes()).collect();
    let request_path = format!("/containers/{}/archive?path={}", container_id, encoded);

    let response = runtime.get(&request_path).await?;
    if !response.is_ok() {
        debug!(
            container_id = %container_id,
            status = response.status,
            "Archive request returned non-success status"
        );
        return Ok(None);
    }

    match decode_single_file(&response.body) {
        Ok(payload) => Ok(Some(payload.to_vec())),
        Err(e) => {
            debug!(container_id = %container_id, error = %e, "Rejected archive");
            Ok(None)
        }
    }
}
