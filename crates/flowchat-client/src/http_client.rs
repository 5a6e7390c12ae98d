use async_trait::async_trait;
use flowchat_types::PredictionRequest;
use futures_util::TryStreamExt;
use reqwest::Url;
use std::time::Duration;

use crate::{ByteStream, ChatTransport, TransportError};

const HEALTH_PATH: &str = "/api/v1/ping";
const MAX_ERROR_BODY_CHARS: usize = 512;

/// HTTP transport for a remote prediction endpoint
pub struct HttpTransport {
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(30),
            api_key: None,
        }
    }

    /// Bound on the wait for response headers. The body itself streams for as
    /// long as the server keeps it open.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn health_url(&self) -> Result<Url, TransportError> {
        let endpoint = Url::parse(&self.endpoint)
            .map_err(|e| TransportError::Config(format!("invalid endpoint '{}': {}", self.endpoint, e)))?;
        endpoint
            .join(HEALTH_PATH)
            .map_err(|e| TransportError::Config(e.to_string()))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

fn truncate_body(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    let cut: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    format!("{}...", cut)
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open_stream(&self, request: &PredictionRequest) -> Result<ByteStream, TransportError> {
        log::debug!(
            "POST {} (chatId: {:?}, sessionId: {:?})",
            self.endpoint,
            request.chat_id,
            request.session_id
        );

        let builder = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(request);

        let response = tokio::time::timeout(self.timeout, self.authorize(builder).send())
            .await
            .map_err(|_| TransportError::Timeout)??;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("Prediction endpoint returned {}: {}", status, body.trim());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let stream = response.bytes_stream().map_err(TransportError::from);
        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        let url = self.health_url()?;
        let response = tokio::time::timeout(self.timeout, self.authorize(self.client.get(url)).send())
            .await
            .map_err(|_| TransportError::Timeout)??;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: String::new(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_url_uses_endpoint_origin() {
        let transport = HttpTransport::new(
            "https://agents.example.com/api/v1/prediction/abc-123".to_string(),
        );
        assert_eq!(
            transport.health_url().unwrap().as_str(),
            "https://agents.example.com/api/v1/ping"
        );
    }

    #[test]
    fn test_invalid_endpoint_is_config_error() {
        let transport = HttpTransport::new("not a url".to_string());
        assert!(matches!(transport.health_url(), Err(TransportError::Config(_))));
    }

    #[test]
    fn test_blank_api_key_is_ignored() {
        let transport = HttpTransport::new("http://localhost".to_string())
            .with_api_key(Some("  ".to_string()));
        assert!(transport.api_key.is_none());
    }

    #[test]
    fn test_error_body_is_truncated() {
        let long = "x".repeat(MAX_ERROR_BODY_CHARS + 10);
        let truncated = truncate_body(&long);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), MAX_ERROR_BODY_CHARS + 3);
        assert_eq!(truncate_body(" short "), "short");
    }
}
