use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use thiserror::Error;

/// Body of a streaming response, chunk by chunk as the network delivers it.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Failures while talking to the agent service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Agent service is unreachable: {0}")]
    Unreachable(String),
    #[error("Request to agent service timed out")]
    Timeout,
    #[error("Agent service responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Response stream interrupted: {0}")]
    Stream(String),
    #[error("Invalid transport configuration: {0}")]
    Config(String),
}

/// Coarse bucket of a transport failure, used to pick a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Network,
    Timeout,
    HttpStatus(u16),
}

impl TransportError {
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            TransportError::Timeout => TransportErrorKind::Timeout,
            TransportError::Status { status, .. } => TransportErrorKind::HttpStatus(*status),
            TransportError::Unreachable(_)
            | TransportError::Stream(_)
            | TransportError::Config(_) => TransportErrorKind::Network,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return TransportError::Timeout;
        }

        if err.is_connect() {
            return TransportError::Unreachable(err.to_string());
        }

        if let Some(status) = err.status() {
            return TransportError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            };
        }

        if err.is_builder() {
            return TransportError::Config(err.to_string());
        }

        TransportError::Stream(err.to_string())
    }
}
