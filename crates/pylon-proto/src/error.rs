//! Error types for wire encoding and decoding.

use thiserror::Error;

/// Errors that can occur when encoding or decoding discovery payloads.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// The response could not be serialized to the wire encoding.
    #[error("failed to encode discovery response: {0}")]
    Encode(#[source] serde_json::Error),

    /// The payload is not a well-formed discovery response.
    #[error("malformed discovery payload: {0}")]
    Malformed(#[source] serde_json::Error),
}
