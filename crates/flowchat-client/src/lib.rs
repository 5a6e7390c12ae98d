//! Streaming transport for the flowchat prediction protocol
//!
//! The engine never talks to the network directly. It asks a [`ChatTransport`]
//! for the raw response body of a prediction request and runs it through
//! [`decode_events`], which handles everything between bytes on the wire and
//! typed [`StreamEvent`]s: UTF-8 reassembly across chunk boundaries, frame
//! splitting, carrying partial frames over to the next chunk and repairing
//! truncated payloads.
//!
//! Two transports ship with the crate: [`http_client::HttpTransport`] for a
//! live agent service and [`replay_client::ReplayTransport`] which plays back
//! a recorded response body (used by tests and by `flowchat --replay`).

use async_trait::async_trait;
use flowchat_types::{PredictionRequest, StreamEvent};
use futures_util::{Stream, StreamExt};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub mod decode;
pub mod frames;
pub mod http_client;
pub mod repair;
pub mod replay_client;
pub mod types;

pub use decode::Utf8Decoder;
pub use frames::{parse_chunk, FrameDecoder};
pub use repair::repair_json;
pub use types::*;

/// Typed events decoded from one response body, in wire order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, TransportError>> + Send>>;

/// Source of streaming prediction responses.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a prediction request and return the response body once the
    /// response headers have arrived with a success status.
    async fn open_stream(&self, request: &PredictionRequest) -> Result<ByteStream, TransportError>;

    /// Check that the agent service is reachable.
    async fn health_check(&self) -> Result<(), TransportError>;
}

/// Decode a response body into events.
///
/// A transport error ends the stream: whatever was already decoded is flushed
/// first and the error is the last item.
pub fn decode_events(mut body: ByteStream) -> EventStream {
    let events = async_stream::stream! {
        let mut text_decoder = Utf8Decoder::new();
        let mut frame_decoder = FrameDecoder::new();

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    let text = text_decoder.decode(&bytes);
                    for event in frame_decoder.push(&text) {
                        yield Ok(event);
                    }
                }
                Err(err) => {
                    log::warn!("Response stream failed: {}", err);
                    let tail = text_decoder.finish();
                    for event in frame_decoder.push(&tail) {
                        yield Ok(event);
                    }
                    for event in frame_decoder.finish() {
                        yield Ok(event);
                    }
                    yield Err(err);
                    return;
                }
            }
        }

        let tail = text_decoder.finish();
        for event in frame_decoder.push(&tail) {
            yield Ok(event);
        }
        for event in frame_decoder.finish() {
            yield Ok(event);
        }

        if frame_decoder.dropped_frames() > 0 {
            log::warn!(
                "Dropped {} unparseable frame(s) from response stream",
                frame_decoder.dropped_frames()
            );
        }
    };

    Box::pin(events)
}

/// Factory for creating ChatTransport instances
pub struct TransportFactory;

impl TransportFactory {
    /// Create an HTTP transport for a live prediction endpoint
    pub fn create_http_transport(
        endpoint: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Arc<dyn ChatTransport> {
        Arc::new(
            http_client::HttpTransport::new(endpoint)
                .with_api_key(api_key)
                .with_timeout(timeout),
        )
    }

    /// Create a transport that replays a recorded response body from disk
    pub async fn create_replay_transport(
        path: impl AsRef<Path>,
    ) -> Result<Arc<dyn ChatTransport>, TransportError> {
        let transport = replay_client::ReplayTransport::from_file(path).await?;
        Ok(Arc::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use replay_client::ReplayTransport;

    async fn collect(transport: &ReplayTransport) -> Vec<Result<StreamEvent, TransportError>> {
        let body = transport
            .open_stream(&PredictionRequest::new("hi"))
            .await
            .unwrap();
        decode_events(body).collect().await
    }

    #[tokio::test]
    async fn test_decode_events_across_byte_chunks() {
        let body = "message:\ndata:{\"event\":\"token\",\"data\":\"Grüße\"}\n\nmessage:\ndata:{\"event\":\"end\",\"data\":\"[DONE]\"}\n\n";
        let transport = ReplayTransport::from_text(body, 3);

        let events: Vec<StreamEvent> = collect(&transport)
            .await
            .into_iter()
            .map(|event| event.unwrap())
            .collect();

        assert_eq!(
            events,
            vec![StreamEvent::Token("Grüße".to_string()), StreamEvent::done()]
        );
    }

    #[tokio::test]
    async fn test_truncated_body_is_flushed_at_close() {
        let transport = ReplayTransport::new(vec![Bytes::from_static(
            b"message:\ndata:{\"event\":\"token\",\"data\":\"cut sh",
        )]);

        let events = collect(&transport).await;
        assert_eq!(events, vec![Ok(StreamEvent::Token("cut sh".to_string()))]);
    }

    #[tokio::test]
    async fn test_stream_error_is_last_item() {
        let transport = ReplayTransport::new(vec![Bytes::from_static(
            b"message:\ndata:{\"event\":\"token\",\"data\":\"A\"}\n\n",
        )])
        .with_stream_error(TransportError::Stream("connection reset".to_string()));

        let events = collect(&transport).await;
        assert_eq!(
            events,
            vec![
                Ok(StreamEvent::Token("A".to_string())),
                Err(TransportError::Stream("connection reset".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_factory_replay_transport_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            b"message:\ndata:{\"event\":\"token\",\"data\":\"from disk\"}\n\n",
        )
        .unwrap();

        let transport = TransportFactory::create_replay_transport(file.path())
            .await
            .unwrap();
        let body = transport
            .open_stream(&PredictionRequest::new("hi"))
            .await
            .unwrap();
        let events: Vec<_> = decode_events(body).collect().await;

        assert_eq!(events, vec![Ok(StreamEvent::Token("from disk".to_string()))]);
    }

    #[tokio::test]
    async fn test_factory_replay_transport_missing_file() {
        let result = TransportFactory::create_replay_transport("/nonexistent/flowchat.replay").await;
        assert!(matches!(result, Err(TransportError::Config(_))));
    }
}
