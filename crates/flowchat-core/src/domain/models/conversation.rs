use chrono::DateTime;
use chrono::Utc;
use flowchat_types::ReasoningStep;
use flowchat_types::SourceDocument;
use serde::Deserialize;
use serde::Serialize;

use super::Message;

#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;

pub const DEFAULT_TITLE: &str = "New Chat";
const TITLE_MAX_CHARS: usize = 30;

/// A conversation as persisted in client storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Server-assigned correlation id (`chatId` on the wire).
    #[serde(rename = "flowChatId", default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    /// Server-assigned memory-session id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub reasoning_steps: Vec<ReasoningStep>,
    #[serde(default)]
    pub source_documents: Vec<SourceDocument>,
}

impl Default for Conversation {
    fn default() -> Self {
        Conversation::new()
    }
}

impl Conversation {
    pub fn new() -> Conversation {
        let now = Utc::now();
        Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            messages: vec![],
            created_at: now,
            updated_at: now,
            chat_id: None,
            session_id: None,
            reasoning_steps: vec![],
            source_documents: vec![],
        }
    }

    /// Title derived from the first user message.
    pub fn title_from(text: &str) -> String {
        let text = text.trim();
        if text.is_empty() {
            return DEFAULT_TITLE.to_string();
        }

        if text.chars().count() > TITLE_MAX_CHARS {
            let cut: String = text.chars().take(TITLE_MAX_CHARS).collect();
            return format!("{cut}...");
        }

        text.to_string()
    }

    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == message_id)
    }

    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .find(|message| message.id == message_id)
    }

    /// Most recent user message strictly before `message_id`, or the last user
    /// message overall when `message_id` is unknown.
    pub fn user_message_before(&self, message_id: &str) -> Option<&Message> {
        let end = self
            .messages
            .iter()
            .position(|message| message.id == message_id)
            .unwrap_or(self.messages.len());

        self.messages[..end]
            .iter()
            .rev()
            .find(|message| message.is_from_user())
    }

    pub fn has_user_messages(&self) -> bool {
        self.messages.iter().any(Message::is_from_user)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
