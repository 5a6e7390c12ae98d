use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use flowchat_types::ReasoningStep;
use flowchat_types::SourceDocument;
use parking_lot::RwLock;

use super::ConversationRepository;
use crate::domain::models::Conversation;
use crate::domain::models::Message;
use crate::domain::models::DEFAULT_TITLE;
use crate::errors::StoreError;
use crate::errors::StoreResult;

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;

/// Prefix of correlation ids minted locally when the server never sent one.
pub const LOCAL_CHAT_ID_PREFIX: &str = "local-";

/// Snapshot of everything the store owns.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatState {
    pub conversations: Vec<Conversation>,
    pub active_id: Option<String>,
}

impl ChatState {
    pub fn active(&self) -> Option<&Conversation> {
        let active_id = self.active_id.as_deref()?;
        self.conversation(active_id)
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| conversation.id == conversation_id)
    }

    fn conversation_mut(&mut self, conversation_id: &str) -> StoreResult<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|conversation| conversation.id == conversation_id)
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))
    }

    fn active_id_or_err(&self) -> StoreResult<String> {
        self.active_id
            .clone()
            .ok_or_else(|| StoreError::ConversationNotFound("<active>".to_string()))
    }

    fn insert_default(&mut self) -> Conversation {
        let conversation = Conversation::new();
        self.conversations.insert(0, conversation.clone());
        self.active_id = Some(conversation.id.clone());
        conversation
    }
}

pub type ListenerId = u64;
type Listener = Arc<dyn Fn(&ChatState) + Send + Sync>;

/// Whether a mutation changed anything worth saving.
enum Applied<T> {
    Changed(T),
    Unchanged(T),
}

/// Owner of the conversation list and the active conversation.
///
/// Every mutation persists the full list through the repository while the
/// write lock is held, then notifies listeners with a fresh snapshot after
/// the lock is released. A failed save keeps the in-memory change and is
/// returned as [`StoreError::Persistence`].
pub struct ConversationStore {
    state: RwLock<ChatState>,
    repository: Arc<dyn ConversationRepository>,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_listener_id: AtomicU64,
}

impl ConversationStore {
    /// Rehydrate from the repository. The first stored conversation becomes
    /// active; an empty or unreadable store starts with one default
    /// conversation.
    pub fn new(repository: Arc<dyn ConversationRepository>) -> ConversationStore {
        let conversations = match repository.load() {
            Ok(conversations) => conversations,
            Err(err) => {
                log::warn!("Could not load conversations, starting empty: {}", err);
                vec![]
            }
        };

        let mut state = ChatState {
            active_id: conversations.first().map(|conversation| conversation.id.clone()),
            conversations,
        };

        if state.conversations.is_empty() {
            state.insert_default();
            if let Err(err) = repository.save(&state.conversations) {
                log::error!("Failed to persist default conversation: {}", err);
            }
        }

        log::info!(
            "Conversation store ready with {} conversation(s)",
            state.conversations.len()
        );

        ConversationStore {
            state: RwLock::new(state),
            repository,
            listeners: RwLock::new(vec![]),
            next_listener_id: AtomicU64::new(1),
        }
    }

    pub fn get_state(&self) -> ChatState {
        self.state.read().clone()
    }

    pub fn active_conversation(&self) -> Option<Conversation> {
        self.state.read().active().cloned()
    }

    pub fn active_id(&self) -> Option<String> {
        self.state.read().active_id.clone()
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.state.read().conversations.clone()
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.state.read().conversation(conversation_id).cloned()
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ChatState) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Prepend a fresh conversation and make it active.
    pub fn create_conversation(&self) -> StoreResult<Conversation> {
        self.mutate(|state| Ok(Applied::Changed(state.insert_default())))
    }

    pub fn set_active(&self, conversation_id: &str) -> StoreResult<()> {
        self.mutate(|state| {
            if state.conversation(conversation_id).is_none() {
                return Err(StoreError::ConversationNotFound(conversation_id.to_string()));
            }
            if state.active_id.as_deref() == Some(conversation_id) {
                return Ok(Applied::Unchanged(()));
            }
            state.active_id = Some(conversation_id.to_string());
            Ok(Applied::Changed(()))
        })
    }

    /// Append a message. The first user message of a conversation names it.
    pub fn append_message(&self, conversation_id: &str, message: Message) -> StoreResult<()> {
        self.mutate(|state| {
            let conversation = state.conversation_mut(conversation_id)?;
            if message.is_from_user() && !conversation.has_user_messages() {
                conversation.title = Conversation::title_from(&message.content);
            }
            conversation.messages.push(message);
            conversation.touch();
            Ok(Applied::Changed(()))
        })
    }

    /// Replace a message's content, optionally completing it. Completed
    /// messages are frozen: the call is a no-op and returns `false`.
    pub fn update_message_content(
        &self,
        conversation_id: &str,
        message_id: &str,
        content: &str,
        is_complete: bool,
    ) -> StoreResult<bool> {
        self.mutate(|state| {
            let conversation = state.conversation_mut(conversation_id)?;
            let message = conversation
                .message_mut(message_id)
                .ok_or_else(|| StoreError::message_not_found(conversation_id, message_id))?;

            if message.is_complete {
                log::debug!("Ignoring update to completed message {}", message_id);
                return Ok(Applied::Unchanged(false));
            }

            message.content = content.to_string();
            message.is_complete = is_complete;
            conversation.touch();
            Ok(Applied::Changed(true))
        })
    }

    /// Complete a message without touching its content. Returns `false` when
    /// it was already complete.
    pub fn complete_message(&self, conversation_id: &str, message_id: &str) -> StoreResult<bool> {
        self.mutate(|state| {
            let conversation = state.conversation_mut(conversation_id)?;
            let message = conversation
                .message_mut(message_id)
                .ok_or_else(|| StoreError::message_not_found(conversation_id, message_id))?;

            if message.is_complete {
                return Ok(Applied::Unchanged(false));
            }

            message.is_complete = true;
            conversation.touch();
            Ok(Applied::Changed(true))
        })
    }

    /// Remove a conversation. When it was active, the first remaining one
    /// becomes active, or a fresh default when none remain.
    pub fn delete_conversation(&self, conversation_id: &str) -> StoreResult<()> {
        self.mutate(|state| {
            let before = state.conversations.len();
            state
                .conversations
                .retain(|conversation| conversation.id != conversation_id);
            if state.conversations.len() == before {
                return Err(StoreError::ConversationNotFound(conversation_id.to_string()));
            }

            if state.active_id.as_deref() == Some(conversation_id) {
                let next_id = state.conversations.first().map(|next| next.id.clone());
                match next_id {
                    Some(next_id) => state.active_id = Some(next_id),
                    None => {
                        state.insert_default();
                    }
                }
            }
            Ok(Applied::Changed(()))
        })
    }

    /// Empty the active conversation, keeping its id and creation time.
    pub fn clear_current(&self) -> StoreResult<()> {
        self.mutate(|state| {
            let active_id = state.active_id_or_err()?;
            let conversation = state.conversation_mut(&active_id)?;
            conversation.title = DEFAULT_TITLE.to_string();
            conversation.messages.clear();
            conversation.reasoning_steps.clear();
            conversation.source_documents.clear();
            conversation.chat_id = None;
            conversation.session_id = None;
            conversation.touch();
            Ok(Applied::Changed(()))
        })
    }

    pub fn update_reasoning_trace(
        &self,
        conversation_id: &str,
        steps: Vec<ReasoningStep>,
    ) -> StoreResult<()> {
        self.mutate(|state| {
            let conversation = state.conversation_mut(conversation_id)?;
            conversation.reasoning_steps = steps;
            conversation.touch();
            Ok(Applied::Changed(()))
        })
    }

    pub fn append_reasoning_step(&self, conversation_id: &str, step: ReasoningStep) -> StoreResult<()> {
        self.mutate(|state| {
            let conversation = state.conversation_mut(conversation_id)?;
            conversation.reasoning_steps.push(step);
            conversation.touch();
            Ok(Applied::Changed(()))
        })
    }

    pub fn set_source_documents(
        &self,
        conversation_id: &str,
        documents: Vec<SourceDocument>,
    ) -> StoreResult<()> {
        self.mutate(|state| {
            let conversation = state.conversation_mut(conversation_id)?;
            conversation.source_documents = documents;
            conversation.touch();
            Ok(Applied::Changed(()))
        })
    }

    /// Store server-assigned ids. An absent id never clears a present one.
    pub fn merge_remote_ids(
        &self,
        conversation_id: &str,
        chat_id: Option<String>,
        session_id: Option<String>,
    ) -> StoreResult<()> {
        self.mutate(|state| {
            let conversation = state.conversation_mut(conversation_id)?;
            let mut changed = false;

            if let Some(chat_id) = chat_id.filter(|id| !id.is_empty()) {
                changed |= conversation.chat_id.as_deref() != Some(chat_id.as_str());
                conversation.chat_id = Some(chat_id);
            }
            if let Some(session_id) = session_id.filter(|id| !id.is_empty()) {
                changed |= conversation.session_id.as_deref() != Some(session_id.as_str());
                conversation.session_id = Some(session_id);
            }

            if !changed {
                return Ok(Applied::Unchanged(()));
            }
            conversation.touch();
            Ok(Applied::Changed(()))
        })
    }

    /// Return the conversation's correlation id, minting a local one first
    /// when it has none.
    pub fn ensure_correlation_id(&self, conversation_id: &str) -> StoreResult<String> {
        self.mutate(|state| {
            let conversation = state.conversation_mut(conversation_id)?;
            if let Some(chat_id) = &conversation.chat_id {
                return Ok(Applied::Unchanged(chat_id.clone()));
            }

            let chat_id = format!("{}{}", LOCAL_CHAT_ID_PREFIX, uuid::Uuid::new_v4());
            log::warn!(
                "Conversation {} has no correlation id, using {}",
                conversation_id,
                chat_id
            );
            conversation.chat_id = Some(chat_id.clone());
            conversation.touch();
            Ok(Applied::Changed(chat_id))
        })
    }

    fn mutate<T>(&self, apply: impl FnOnce(&mut ChatState) -> StoreResult<Applied<T>>) -> StoreResult<T> {
        let (value, snapshot, saved) = {
            let mut state = self.state.write();
            match apply(&mut *state)? {
                Applied::Unchanged(value) => return Ok(value),
                Applied::Changed(value) => {
                    let saved = self.repository.save(&state.conversations);
                    (value, state.clone(), saved)
                }
            }
        };

        self.notify(&snapshot);

        if let Err(err) = saved {
            log::error!("Failed to persist conversations: {}", err);
            return Err(err.into());
        }
        Ok(value)
    }

    fn notify(&self, snapshot: &ChatState) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener(snapshot);
        }
    }
}
