//! Error types for protocol decoding.

use thiserror::Error;

/// Errors that can occur while decoding wire payloads.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// The payload was not valid JSON, or did not have the event shape.
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// The `event` discriminant was missing.
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// The `data` payload did not match what the event requires.
    #[error("Invalid payload for event '{event}': {message}")]
    InvalidPayload { event: String, message: String },
}

impl ProtocolError {
    /// Create a new serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a new invalid payload error.
    pub fn invalid_payload(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            event: event.into(),
            message: message.into(),
        }
    }
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
