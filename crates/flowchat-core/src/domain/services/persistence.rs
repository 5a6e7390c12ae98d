use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

use crate::domain::models::Conversation;
use crate::errors::PersistenceError;

/// Storage key holding the JSON array of every conversation.
pub const STORAGE_KEY: &str = "ai-chat-data";

/// Durable home of the conversation list. `save` always receives the full
/// list and overwrites whatever was stored before.
pub trait ConversationRepository: Send + Sync {
    fn load(&self) -> Result<Vec<Conversation>, PersistenceError>;
    fn save(&self, conversations: &[Conversation]) -> Result<(), PersistenceError>;
}

pub fn encode_conversations(conversations: &[Conversation]) -> Result<String, PersistenceError> {
    Ok(serde_json::to_string(conversations)?)
}

/// Decode a stored conversation list, skipping records that do not fit the
/// current shape. Input that is not a JSON array yields an empty list.
pub fn decode_conversations(raw: &str) -> Vec<Conversation> {
    let records = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(records)) => records,
        Ok(other) => {
            log::warn!(
                "Stored conversations are not a list (found {}), starting empty",
                json_kind(&other)
            );
            return vec![];
        }
        Err(err) => {
            log::warn!("Stored conversations are unreadable, starting empty: {}", err);
            return vec![];
        }
    };

    let total = records.len();
    let conversations: Vec<Conversation> = records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value(record) {
            Ok(conversation) => Some(conversation),
            Err(err) => {
                log::warn!("Skipping stored conversation #{}: {}", index, err);
                None
            }
        })
        .collect();

    log::debug!("Loaded {} of {} stored conversation(s)", conversations.len(), total);
    conversations
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Key-value storage kept in memory, shaped like browser local storage.
#[derive(Default)]
pub struct InMemoryRepository {
    entries: Mutex<HashMap<String, String>>,
    fail_writes: bool,
    saves: Mutex<usize>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already stored value.
    pub fn with_raw(raw: &str) -> Self {
        let repository = Self::default();
        repository
            .entries
            .lock()
            .insert(STORAGE_KEY.to_string(), raw.to_string());
        repository
    }

    /// Every save fails, as a full or read-only disk would.
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn raw(&self) -> Option<String> {
        self.entries.lock().get(STORAGE_KEY).cloned()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl ConversationRepository for InMemoryRepository {
    fn load(&self) -> Result<Vec<Conversation>, PersistenceError> {
        Ok(self
            .entries
            .lock()
            .get(STORAGE_KEY)
            .map(|raw| decode_conversations(raw))
            .unwrap_or_default())
    }

    fn save(&self, conversations: &[Conversation]) -> Result<(), PersistenceError> {
        if self.fail_writes {
            return Err(PersistenceError::Write("storage is read-only".to_string()));
        }

        let raw = encode_conversations(conversations)?;
        self.entries.lock().insert(STORAGE_KEY.to_string(), raw);
        *self.saves.lock() += 1;
        Ok(())
    }
}
