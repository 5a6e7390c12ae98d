use flowchat_client::TransportError;
use flowchat_client::TransportErrorKind;

/// User-facing bucket for a failed turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Timeout,
    HttpStatus(u16),
    Service,
}

const NETWORK_MARKERS: [&str; 5] = [
    "network",
    "failed to fetch",
    "econnrefused",
    "unreachable",
    "connection",
];
const TIMEOUT_MARKERS: [&str; 2] = ["timeout", "timed out"];

impl ErrorCategory {
    /// Classify a free-form error description from the wire.
    pub fn classify(detail: &str) -> ErrorCategory {
        let detail = detail.to_lowercase();

        if TIMEOUT_MARKERS.iter().any(|marker| detail.contains(marker)) {
            return ErrorCategory::Timeout;
        }
        if NETWORK_MARKERS.iter().any(|marker| detail.contains(marker)) {
            return ErrorCategory::Network;
        }

        ErrorCategory::Service
    }

    pub fn from_transport(err: &TransportError) -> ErrorCategory {
        match err.kind() {
            TransportErrorKind::Network => ErrorCategory::Network,
            TransportErrorKind::Timeout => ErrorCategory::Timeout,
            TransportErrorKind::HttpStatus(status) => ErrorCategory::HttpStatus(status),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            ErrorCategory::Network => {
                "Unable to reach the agent service. Please check your connection and try again."
                    .to_string()
            }
            ErrorCategory::Timeout => {
                "The agent service took too long to respond. Please try again.".to_string()
            }
            ErrorCategory::HttpStatus(status) => format!(
                "The agent service returned an error (HTTP {status}). Please try again later."
            ),
            ErrorCategory::Service => {
                "The agent service ran into a problem while answering. Please try again."
                    .to_string()
            }
        }
    }
}
