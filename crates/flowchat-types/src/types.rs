//! Payload types carried by the prediction protocol.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const DEFAULT_DOCUMENT_TITLE: &str = "Source Document";
const UNKNOWN_AUTHOR: &str = "Unknown Author";
const SHORT_TITLE_WORDS: usize = 3;

/// Body of a streaming prediction request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRequest {
    /// The user's question.
    pub question: String,
    /// Correlation id of the remote conversation, when continuing one.
    #[serde(rename = "chatId", skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    /// Memory-session id of the remote agent, when continuing one.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Always true for this client.
    pub streaming: bool,
}

impl PredictionRequest {
    /// Create a new streaming request for a question.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            chat_id: None,
            session_id: None,
            streaming: true,
        }
    }

    /// Attach the correlation id, if any.
    pub fn with_chat_id(mut self, chat_id: Option<String>) -> Self {
        self.chat_id = chat_id;
        self
    }

    /// Attach the memory-session id, if any.
    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }
}

/// Payload of a `metadata` event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Server-assigned correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    /// Server-side id of the answer message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Server-assigned memory-session id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Echo of the question (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    /// Memory backend used by the agent (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_type: Option<String>,
}

/// An uninterpreted JSON payload stored for display and round-tripping only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpaqueBlob(Value);

impl OpaqueBlob {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// One unit of an agent's exposed intermediate reasoning.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningStep {
    /// Name of the agent that produced this step.
    #[serde(default)]
    pub agent_name: String,
    /// Free-text messages, in order.
    #[serde(default)]
    pub messages: Vec<String>,
    /// The agent that runs next (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    /// Instructions handed to the agent (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Tools used during this step (optional, opaque).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_tools: Option<Vec<OpaqueBlob>>,
    /// Documents consulted during this step (optional, opaque).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_documents: Option<Vec<OpaqueBlob>>,
    /// Artifacts produced during this step (optional, opaque).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<OpaqueBlob>>,
    /// Id of the flow node that produced this step (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
}

impl ReasoningStep {
    /// Create a new reasoning step with messages only.
    pub fn new(agent_name: impl Into<String>, messages: Vec<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            messages,
            ..Default::default()
        }
    }

    /// Step announcing that an agent has taken over processing.
    pub fn announcement(agent_name: &str) -> Self {
        Self::new(agent_name, vec![format!("{agent_name} is now processing")])
    }
}

/// A document the agent cited while answering.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDocument {
    /// Text body of the document excerpt.
    #[serde(default)]
    pub page_content: String,
    /// Metadata in insertion order. The first key doubles as the title and
    /// its value as the author.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub id: String,
}

impl SourceDocument {
    /// Create a new source document.
    pub fn new(id: impl Into<String>, page_content: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata,
            id: id.into(),
        }
    }

    fn title_key(&self) -> Option<&String> {
        self.metadata.keys().next()
    }

    /// The first metadata key, or a generic label.
    pub fn full_title(&self) -> String {
        self.title_key()
            .cloned()
            .unwrap_or_else(|| DEFAULT_DOCUMENT_TITLE.to_string())
    }

    /// The first three words of the title, with an ellipsis when cut.
    pub fn short_title(&self) -> String {
        let Some(title) = self.title_key() else {
            return DEFAULT_DOCUMENT_TITLE.to_string();
        };

        let words: Vec<&str> = title.split(' ').collect();
        if words.len() > SHORT_TITLE_WORDS {
            return format!("{}...", words[..SHORT_TITLE_WORDS].join(" "));
        }

        title.clone()
    }

    /// The value stored under the title key.
    pub fn author(&self) -> String {
        self.title_key()
            .and_then(|key| self.metadata.get(key))
            .filter(|value| is_truthy(value))
            .map(display_value)
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string())
    }

    /// Line range of the excerpt, from nested `loc.lines` or flattened keys.
    pub fn line_range(&self) -> Option<String> {
        let nested = self
            .metadata
            .get("loc")
            .and_then(|loc| loc.get("lines"))
            .and_then(|lines| Some((lines.get("from")?, lines.get("to")?)));

        let flat = || {
            Some((
                self.metadata.get("loc.lines.from")?,
                self.metadata.get("loc.lines.to")?,
            ))
        };

        let (from, to) = nested.or_else(flat)?;
        if from == to {
            return Some(format!("Line {}", display_value(from)));
        }

        Some(format!("Lines {} - {}", display_value(from), display_value(to)))
    }

    /// Pretty JSON of the metadata other than the title and line location.
    pub fn metadata_display(&self) -> Option<String> {
        if self.metadata.len() <= 1 {
            return None;
        }

        let rest: Map<String, Value> = self
            .metadata
            .iter()
            .skip(1)
            .filter(|(key, value)| match key.as_str() {
                "loc.lines.from" | "loc.lines.to" => false,
                "loc" => !value.get("lines").is_some_and(is_truthy),
                _ => true,
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        if rest.is_empty() {
            return None;
        }

        serde_json::to_string_pretty(&Value::Object(rest)).ok()
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
