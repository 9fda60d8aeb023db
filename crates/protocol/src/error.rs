//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering all possible failure modes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Failed to serialize an event to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize an event from JSON.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// Event payload is not valid base64.
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            ProtocolError::Serialization(err.to_string())
        } else {
            ProtocolError::Deserialization(err.to_string())
        }
    }
}

impl From<base64::DecodeError> for ProtocolError {
    fn from(err: base64::DecodeError) -> Self {
        ProtocolError::InvalidBase64(err.to_string())
    }
}

/// Result type alias using [`ProtocolError`].
pub type Result<T> = std::result::Result<T, ProtocolError>;
