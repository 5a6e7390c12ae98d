//! Event types for the streaming prediction protocol.

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{Metadata, ReasoningStep, SourceDocument};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of the `end` event that marks a normally completed answer.
pub const DONE_SENTINEL: &str = "[DONE]";

/// The discriminant carried in the `event` field of a frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    /// The answer has started.
    Start,
    /// Cumulative answer text so far.
    Token,
    /// The answer is finished.
    End,
    /// The server failed to produce an answer.
    Error,
    /// Session identifiers for the conversation.
    Metadata,
    /// Documents cited by the answer.
    SourceDocuments,
    /// Intermediate reasoning of the agents.
    AgentReasoning,
    /// The agent that takes over next.
    NextAgent,
    /// Tools used while answering.
    UsedTools,
    /// Artifacts produced while answering.
    Artifacts,
}

impl EventType {
    /// Wire name of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Start => "start",
            EventType::Token => "token",
            EventType::End => "end",
            EventType::Error => "error",
            EventType::Metadata => "metadata",
            EventType::SourceDocuments => "sourceDocuments",
            EventType::AgentReasoning => "agentReasoning",
            EventType::NextAgent => "nextAgent",
            EventType::UsedTools => "usedTools",
            EventType::Artifacts => "artifacts",
        }
    }

    /// Parse a wire name, returning `None` for names this client does not know.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "start" => Some(EventType::Start),
            "token" => Some(EventType::Token),
            "end" => Some(EventType::End),
            "error" => Some(EventType::Error),
            "metadata" => Some(EventType::Metadata),
            "sourceDocuments" => Some(EventType::SourceDocuments),
            "agentReasoning" => Some(EventType::AgentReasoning),
            "nextAgent" => Some(EventType::NextAgent),
            "usedTools" => Some(EventType::UsedTools),
            "artifacts" => Some(EventType::Artifacts),
            _ => None,
        }
    }
}

/// The untyped shape of a frame payload: `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// The event discriminant.
    pub event: String,
    /// The payload; its shape depends on the discriminant.
    #[serde(default)]
    pub data: Value,
}

impl RawEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// A typed event decoded from one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Start(Value),
    /// Full answer text received so far (not a delta).
    Token(String),
    /// Usually carries [`DONE_SENTINEL`].
    End(Value),
    Error(String),
    Metadata(Metadata),
    SourceDocuments(Vec<SourceDocument>),
    AgentReasoning(Vec<ReasoningStep>),
    NextAgent(String),
    UsedTools(Value),
    Artifacts(Value),
    /// An event name this client does not handle.
    Unknown { name: String, data: Value },
}

impl StreamEvent {
    /// Get the event type, or `None` for unknown events.
    pub fn event_type(&self) -> Option<EventType> {
        match self {
            StreamEvent::Start(_) => Some(EventType::Start),
            StreamEvent::Token(_) => Some(EventType::Token),
            StreamEvent::End(_) => Some(EventType::End),
            StreamEvent::Error(_) => Some(EventType::Error),
            StreamEvent::Metadata(_) => Some(EventType::Metadata),
            StreamEvent::SourceDocuments(_) => Some(EventType::SourceDocuments),
            StreamEvent::AgentReasoning(_) => Some(EventType::AgentReasoning),
            StreamEvent::NextAgent(_) => Some(EventType::NextAgent),
            StreamEvent::UsedTools(_) => Some(EventType::UsedTools),
            StreamEvent::Artifacts(_) => Some(EventType::Artifacts),
            StreamEvent::Unknown { .. } => None,
        }
    }

    /// Wire name of the event.
    pub fn name(&self) -> &str {
        match self {
            StreamEvent::Unknown { name, .. } => name,
            other => other
                .event_type()
                .map(|event_type| event_type.as_str())
                .unwrap_or_default(),
        }
    }

    /// An `end` event carrying the completion sentinel.
    pub fn done() -> Self {
        StreamEvent::End(Value::String(DONE_SENTINEL.to_string()))
    }

    /// Whether this is an `end` event carrying the completion sentinel.
    pub fn is_done(&self) -> bool {
        matches!(self, StreamEvent::End(Value::String(s)) if s == DONE_SENTINEL)
    }

    /// Creates a `StreamEvent` from a frame's JSON payload.
    ///
    /// # Returns
    ///
    /// The typed event, or a `ProtocolError` when the payload is not JSON,
    /// has no `event` field, or its `data` cannot be read for that event.
    pub fn from_json(payload: &str) -> ProtocolResult<Self> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| ProtocolError::serialization(format!("Failed to parse frame payload: {}", e)))?;

        if value.get("event").and_then(Value::as_str).is_none() {
            return Err(ProtocolError::MissingField {
                field: "event".to_string(),
            });
        }

        let raw: RawEvent = serde_json::from_value(value)
            .map_err(|e| ProtocolError::serialization(format!("Failed to parse RawEvent: {}", e)))?;

        Self::from_raw(raw)
    }

    /// Creates a `StreamEvent` from an untyped payload.
    pub fn from_raw(raw: RawEvent) -> ProtocolResult<Self> {
        let RawEvent { event, data } = raw;

        let Some(event_type) = EventType::parse(&event) else {
            return Ok(StreamEvent::Unknown { name: event, data });
        };

        let parsed = match event_type {
            EventType::Start => StreamEvent::Start(data),
            EventType::Token => StreamEvent::Token(value_text(&data)),
            EventType::End => StreamEvent::End(data),
            EventType::Error => StreamEvent::Error(error_text(&data)),
            EventType::Metadata => {
                let metadata = serde_json::from_value::<Metadata>(unwrap_encoded(data))
                    .map_err(|e| ProtocolError::invalid_payload(&event, e.to_string()))?;
                StreamEvent::Metadata(metadata)
            }
            EventType::SourceDocuments => {
                StreamEvent::SourceDocuments(lenient_list(&event, unwrap_encoded(data))?)
            }
            EventType::AgentReasoning => {
                StreamEvent::AgentReasoning(lenient_list(&event, unwrap_encoded(data))?)
            }
            EventType::NextAgent => StreamEvent::NextAgent(value_text(&data)),
            EventType::UsedTools => StreamEvent::UsedTools(data),
            EventType::Artifacts => StreamEvent::Artifacts(data),
        };

        Ok(parsed)
    }

    /// Convert back into the untyped wire shape.
    pub fn to_raw(&self) -> RawEvent {
        let data = match self {
            StreamEvent::Start(data)
            | StreamEvent::End(data)
            | StreamEvent::UsedTools(data)
            | StreamEvent::Artifacts(data) => data.clone(),
            StreamEvent::Token(text) | StreamEvent::Error(text) | StreamEvent::NextAgent(text) => {
                Value::String(text.clone())
            }
            StreamEvent::Metadata(metadata) => serde_json::to_value(metadata).unwrap_or_default(),
            StreamEvent::SourceDocuments(documents) => {
                serde_json::to_value(documents).unwrap_or_default()
            }
            StreamEvent::AgentReasoning(steps) => serde_json::to_value(steps).unwrap_or_default(),
            StreamEvent::Unknown { data, .. } => data.clone(),
        };

        RawEvent::new(self.name(), data)
    }

    /// Serialize as a frame payload.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.to_raw()).unwrap_or_default()
    }
}

fn value_text(data: &Value) -> String {
    match data {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn error_text(data: &Value) -> String {
    data.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| value_text(data))
}

/// Some servers send structured payloads as JSON-encoded strings.
fn unwrap_encoded(data: Value) -> Value {
    if let Value::String(s) = &data {
        if let Ok(inner) = serde_json::from_str::<Value>(s) {
            if inner.is_object() || inner.is_array() {
                return inner;
            }
        }
    }
    data
}

/// Read a list payload, dropping entries that do not have the expected shape.
fn lenient_list<T: serde::de::DeserializeOwned>(event: &str, data: Value) -> ProtocolResult<Vec<T>> {
    let items = match data {
        Value::Array(items) => items,
        Value::Object(_) => vec![data],
        Value::Null => Vec::new(),
        other => {
            return Err(ProtocolError::invalid_payload(
                event,
                format!("expected an array, got {}", other),
            ))
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<T>(item).ok())
        .collect())
}
