use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ChunkKind {
    Start,
    Content,
    End,
    Error,
    Thinking,
    SourceDocuments,
    AgentReasoning,
    NextAgent,
}

/// Transient notification emitted while a turn streams. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamChunk {
    pub kind: ChunkKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Set on `end` chunks re-emitted after the turn's logical end.
    #[serde(default)]
    pub replayed: bool,
}

impl StreamChunk {
    pub fn new(kind: ChunkKind) -> StreamChunk {
        StreamChunk {
            kind,
            content: None,
            message_id: None,
            replayed: false,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> StreamChunk {
        self.content = Some(content.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> StreamChunk {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn replayed(mut self) -> StreamChunk {
        self.replayed = true;
        self
    }

    pub fn is_end(&self) -> bool {
        self.kind == ChunkKind::End
    }

    /// The first `end` of a turn.
    pub fn is_logical_end(&self) -> bool {
        self.is_end() && !self.replayed
    }
}
