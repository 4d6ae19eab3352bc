//! Base64 transcoding for terminal bytes.
//!
//! The transport only carries text frames, so terminal output and input
//! travel as standard-alphabet base64 inside the envelope's `data` field.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use thiserror::Error;

/// Malformed base64 payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid base64 payload: {0}")]
pub struct DecodeError(#[from] base64::DecodeError);

/// Encode raw bytes for transport.
#[must_use]
pub fn to_wire(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Decode a transport payload back into raw bytes.
///
/// # Errors
/// Returns error if `text` is not valid padded base64. Nothing is returned
/// for a partially valid payload.
pub fn from_wire(text: &str) -> Result<Vec<u8>, DecodeError> {
    Ok(BASE64.decode(text)?)
}
