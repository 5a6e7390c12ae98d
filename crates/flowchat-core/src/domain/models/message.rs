use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;
use strum_macros::EnumString;

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Thinking,
}

fn complete_by_default() -> bool {
    true
}

/// One entry in a conversation.
///
/// Assistant messages start out incomplete and receive their content while the
/// response streams. Once `is_complete` is set the content is frozen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "complete_by_default")]
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: &str, is_complete: bool) -> Message {
        Message {
            id: Message::create_id(),
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
            is_complete,
            thinking: None,
        }
    }

    pub fn user(content: &str) -> Message {
        Message::new(Role::User, content, true)
    }

    /// Empty assistant message waiting for streamed content.
    pub fn pending_assistant() -> Message {
        Message::new(Role::Assistant, "", false)
    }

    pub fn system(content: &str) -> Message {
        Message::new(Role::System, content, true)
    }

    pub fn create_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn is_from_user(&self) -> bool {
        self.role == Role::User
    }
}
