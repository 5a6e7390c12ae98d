//! Error types for the conversation engine.
//!
//! Nothing here is fatal to a turn. Store and persistence errors surface to
//! the caller of a mutation; session errors are precondition failures
//! reported before a turn touches any state.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("Failed to read stored conversations: {0}")]
    Read(String),
    #[error("Failed to write stored conversations: {0}")]
    Write(String),
    #[error("Failed to encode conversations: {0}")]
    Encode(String),
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::Write(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Encode(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Conversation '{0}' not found")]
    ConversationNotFound(String),
    #[error("Message '{message_id}' not found in conversation '{conversation_id}'")]
    MessageNotFound {
        conversation_id: String,
        message_id: String,
    },
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl StoreError {
    pub fn message_not_found(conversation_id: &str, message_id: &str) -> Self {
        StoreError::MessageNotFound {
            conversation_id: conversation_id.to_string(),
            message_id: message_id.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Cannot send an empty message")]
    EmptyMessage,
    #[error("No active conversation")]
    NoActiveConversation,
    #[error("A response is still streaming for conversation '{0}'")]
    TurnInFlight(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type SessionResult<T> = Result<T, SessionError>;
