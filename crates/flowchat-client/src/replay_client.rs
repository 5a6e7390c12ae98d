use async_trait::async_trait;
use bytes::Bytes;
use flowchat_types::PredictionRequest;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

use crate::{ByteStream, ChatTransport, TransportError};

/// Transport that plays back a fixed response body.
///
/// Every request receives the same chunks in the same order. Requests are
/// recorded so callers can check what would have been sent.
#[derive(Clone, Default)]
pub struct ReplayTransport {
    chunks: Vec<Result<Bytes, TransportError>>,
    open_error: Option<TransportError>,
    stall_after_body: bool,
    recorded_requests: Arc<Mutex<Vec<PredictionRequest>>>,
}

impl ReplayTransport {
    pub fn new(chunks: Vec<Bytes>) -> Self {
        Self {
            chunks: chunks.into_iter().map(Ok).collect(),
            ..Self::default()
        }
    }

    /// Split `text` into chunks of `chunk_size` bytes, ignoring character
    /// boundaries the same way a network would.
    pub fn from_text(text: &str, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        let chunks = text
            .as_bytes()
            .chunks(chunk_size)
            .map(Bytes::copy_from_slice)
            .collect();
        Self::new(chunks)
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref();
        let body = tokio::fs::read(path).await.map_err(|e| {
            TransportError::Config(format!("cannot read replay file {}: {}", path.display(), e))
        })?;
        log::info!("Replaying {} byte(s) from {}", body.len(), path.display());
        Ok(Self::new(vec![Bytes::from(body)]))
    }

    /// A transport whose requests fail before any body arrives.
    pub fn failing(error: TransportError) -> Self {
        Self {
            open_error: Some(error),
            ..Self::default()
        }
    }

    /// End the body with a transport error instead of a normal close.
    pub fn with_stream_error(mut self, error: TransportError) -> Self {
        self.chunks.push(Err(error));
        self
    }

    /// Keep the body open forever after the last chunk.
    pub fn stalling(mut self) -> Self {
        self.stall_after_body = true;
        self
    }

    pub fn recorded_requests(&self) -> Vec<PredictionRequest> {
        self.recorded_requests.lock().clone()
    }
}

#[async_trait]
impl ChatTransport for ReplayTransport {
    async fn open_stream(&self, request: &PredictionRequest) -> Result<ByteStream, TransportError> {
        self.recorded_requests.lock().push(request.clone());

        if let Some(error) = &self.open_error {
            return Err(error.clone());
        }

        let chunks = self.chunks.clone();
        let stall = self.stall_after_body;
        let body = async_stream::stream! {
            for chunk in chunks {
                yield chunk;
            }
            if stall {
                futures_util::future::pending::<()>().await;
            }
        };

        Ok(Box::pin(body))
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        match &self.open_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
