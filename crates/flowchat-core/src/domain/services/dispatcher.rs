use std::sync::Arc;
use std::time::Duration;

use flowchat_types::Metadata;
use flowchat_types::ReasoningStep;
use flowchat_types::SourceDocument;
use flowchat_types::StreamEvent;
use flowchat_types::DONE_SENTINEL;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::ConversationStore;
use super::Scheduler;
use crate::domain::models::ChunkKind;
use crate::domain::models::ErrorCategory;
use crate::domain::models::StreamChunk;
use crate::errors::StoreError;

#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod tests;

pub const EMPTY_RESPONSE_PLACEHOLDER: &str =
    "I received your message but didn't generate a response. Please try rephrasing your question.";

static LAST_QUESTION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)what\s+(was|is)\s+my\s+(last|previous)\s+question")
        .expect("LAST_QUESTION_PATTERN is valid")
});

fn asks_for_last_question(question: &str) -> bool {
    LAST_QUESTION_PATTERN.is_match(question)
}

/// One send/stream cycle: where its output goes and what it has seen so far.
#[derive(Clone, Debug, PartialEq)]
pub struct Turn {
    pub conversation_id: String,
    pub message_id: String,
    pub question: String,
    pub content_received: bool,
    pub metadata_received: bool,
    pub logical_end_sent: bool,
    pub failure: Option<ErrorCategory>,
}

impl Turn {
    pub fn new(conversation_id: &str, message_id: &str, question: &str) -> Turn {
        Turn {
            conversation_id: conversation_id.to_string(),
            message_id: message_id.to_string(),
            question: question.to_string(),
            content_received: false,
            metadata_received: false,
            logical_end_sent: false,
            failure: None,
        }
    }

    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

/// Applies decoded wire events to the store, one at a time, and reports each
/// transition as a [`StreamChunk`].
pub struct EventDispatcher {
    store: Arc<ConversationStore>,
    scheduler: Arc<dyn Scheduler>,
    chunk_tx: mpsc::UnboundedSender<StreamChunk>,
    stagger: Duration,
}

impl EventDispatcher {
    pub fn new(
        store: Arc<ConversationStore>,
        scheduler: Arc<dyn Scheduler>,
        chunk_tx: mpsc::UnboundedSender<StreamChunk>,
        stagger: Duration,
    ) -> EventDispatcher {
        EventDispatcher {
            store,
            scheduler,
            chunk_tx,
            stagger,
        }
    }

    pub async fn dispatch(&self, turn: &mut Turn, event: StreamEvent) {
        log::debug!(
            "Dispatching '{}' for conversation {}",
            event.name(),
            turn.conversation_id
        );

        match event {
            StreamEvent::Start(_) => {
                self.emit(StreamChunk::new(ChunkKind::Start).with_message_id(&turn.message_id));
            }
            StreamEvent::Token(text) => self.handle_token(turn, text),
            StreamEvent::End(data) => self.handle_end(turn, &data),
            StreamEvent::Error(detail) => {
                let category = ErrorCategory::classify(&detail);
                log::warn!("Agent service reported an error: {}", detail);
                self.fail(turn, category);
            }
            StreamEvent::Metadata(metadata) => self.handle_metadata(turn, metadata),
            StreamEvent::SourceDocuments(documents) => self.handle_source_documents(turn, documents),
            StreamEvent::AgentReasoning(steps) => self.handle_agent_reasoning(turn, steps).await,
            StreamEvent::NextAgent(agent) => self.handle_next_agent(turn, &agent),
            StreamEvent::UsedTools(_) | StreamEvent::Artifacts(_) => {
                log::debug!("Ignoring side-channel event for {}", turn.message_id);
            }
            StreamEvent::Unknown { name, .. } => {
                log::debug!("Ignoring unknown event '{}'", name);
            }
        }
    }

    /// Close out a turn that never produced its logical end, going through the
    /// same path as an explicit `end` so the empty-response placeholder applies.
    pub fn finish(&self, turn: &mut Turn) {
        if !turn.logical_end_sent {
            log::debug!("Stream closed without 'end', synthesising one");
            self.handle_end(turn, &Value::String(DONE_SENTINEL.to_string()));
        }
    }

    /// Delayed last-resort end signal. Completes the message if anything left
    /// it open.
    pub fn safety_end(&self, turn: &mut Turn) {
        match self.store.complete_message(&turn.conversation_id, &turn.message_id) {
            Ok(true) => log::warn!("Safety end completed message {}", turn.message_id),
            Ok(false) => {}
            Err(err) => self.log_store_error(turn, err),
        }

        let chunk = StreamChunk::new(ChunkKind::End).with_message_id(&turn.message_id);
        self.emit(if turn.logical_end_sent {
            chunk.replayed()
        } else {
            turn.logical_end_sent = true;
            chunk
        });
    }

    /// End the turn with a classified, user-readable error. A message that
    /// already completed keeps its answer and the turn keeps its outcome.
    pub fn fail(&self, turn: &mut Turn, category: ErrorCategory) {
        let text = category.user_message();

        match self
            .store
            .update_message_content(&turn.conversation_id, &turn.message_id, &text, true)
        {
            Ok(true) => turn.failure = Some(category),
            Ok(false) => log::warn!(
                "Error arrived after message {} completed, keeping its answer",
                turn.message_id
            ),
            Err(err) => {
                turn.failure = Some(category);
                self.log_store_error(turn, err);
            }
        }

        self.emit(
            StreamChunk::new(ChunkKind::Error)
                .with_message_id(&turn.message_id)
                .with_content(text),
        );
    }

    /// Wrap up a stream that closed normally. Missing metadata is reported,
    /// and a conversation still without a correlation id gets a local one so
    /// later turns carry it.
    pub fn stream_closed(&self, turn: &Turn) {
        if !turn.metadata_received {
            log::warn!(
                "Response for conversation {} carried no metadata",
                turn.conversation_id
            );
            self.emit(
                StreamChunk::new(ChunkKind::Error)
                    .with_message_id(&turn.message_id)
                    .with_content("The response did not include conversation metadata."),
            );
        }

        if let Err(err) = self.store.ensure_correlation_id(&turn.conversation_id) {
            self.log_store_error(turn, err);
        }
    }

    fn handle_token(&self, turn: &mut Turn, text: String) {
        match self.store.update_message_content(
            &turn.conversation_id,
            &turn.message_id,
            &text,
            false,
        ) {
            Ok(true) => {
                turn.content_received = true;
                self.emit(
                    StreamChunk::new(ChunkKind::Content)
                        .with_message_id(&turn.message_id)
                        .with_content(text),
                );
            }
            Ok(false) => log::debug!("Dropping token for completed message {}", turn.message_id),
            Err(err) => self.log_store_error(turn, err),
        }
    }

    fn handle_end(&self, turn: &mut Turn, data: &Value) {
        let Some(conversation) = self.store.conversation(&turn.conversation_id) else {
            log::debug!(
                "Conversation {} is gone, ignoring 'end'",
                turn.conversation_id
            );
            return;
        };
        let Some(message) = conversation.message(&turn.message_id) else {
            log::debug!("Message {} is gone, ignoring 'end'", turn.message_id);
            return;
        };

        let chunk = StreamChunk::new(ChunkKind::End).with_message_id(&turn.message_id);

        if message.is_complete {
            let chunk = chunk.with_content(message.content.clone());
            self.emit(if turn.logical_end_sent {
                chunk.replayed()
            } else {
                turn.logical_end_sent = true;
                chunk
            });
            return;
        }

        let content = if turn.content_received {
            message.content.clone()
        } else {
            match data {
                Value::String(text) if !text.trim().is_empty() && text != DONE_SENTINEL => text.clone(),
                _ => self.empty_response_text(turn, &conversation),
            }
        };

        if let Err(err) = self.store.update_message_content(
            &turn.conversation_id,
            &turn.message_id,
            &content,
            true,
        ) {
            self.log_store_error(turn, err);
        }

        turn.logical_end_sent = true;
        self.emit(chunk.with_content(content));
    }

    fn empty_response_text(
        &self,
        turn: &Turn,
        conversation: &crate::domain::models::Conversation,
    ) -> String {
        if !asks_for_last_question(&turn.question) {
            return EMPTY_RESPONSE_PLACEHOLDER.to_string();
        }

        let previous = conversation
            .user_message_before(&turn.message_id)
            .and_then(|current| conversation.user_message_before(&current.id));

        match previous {
            Some(message) => format!("Your last question was: \"{}\"", message.content.trim()),
            None => "I don't see an earlier question in this conversation yet.".to_string(),
        }
    }

    fn handle_metadata(&self, turn: &mut Turn, metadata: Metadata) {
        turn.metadata_received = true;
        if let Err(err) = self.store.merge_remote_ids(
            &turn.conversation_id,
            metadata.chat_id,
            metadata.session_id,
        ) {
            self.log_store_error(turn, err);
        }
    }

    fn handle_source_documents(&self, turn: &Turn, documents: Vec<SourceDocument>) {
        let content = serde_json::to_string(&documents).unwrap_or_default();
        match self
            .store
            .set_source_documents(&turn.conversation_id, documents)
        {
            Ok(()) => self.emit(StreamChunk::new(ChunkKind::SourceDocuments).with_content(content)),
            Err(err) => self.log_store_error(turn, err),
        }
    }

    async fn handle_agent_reasoning(&self, turn: &Turn, steps: Vec<ReasoningStep>) {
        if let Err(err) = self
            .store
            .update_reasoning_trace(&turn.conversation_id, steps.clone())
        {
            self.log_store_error(turn, err);
            return;
        }

        for (index, step) in steps.iter().enumerate() {
            if index > 0 {
                self.scheduler.delay(self.stagger).await;
            }
            let content = serde_json::to_string(step).unwrap_or_default();
            self.emit(
                StreamChunk::new(ChunkKind::AgentReasoning)
                    .with_message_id(&turn.message_id)
                    .with_content(content),
            );
        }
    }

    fn handle_next_agent(&self, turn: &Turn, agent: &str) {
        self.emit(
            StreamChunk::new(ChunkKind::NextAgent)
                .with_message_id(&turn.message_id)
                .with_content(agent),
        );

        let step = ReasoningStep::announcement(agent);
        let announcement = step.messages.join(" ");
        if let Err(err) = self.store.append_reasoning_step(&turn.conversation_id, step) {
            self.log_store_error(turn, err);
            return;
        }

        self.emit(
            StreamChunk::new(ChunkKind::Thinking)
                .with_message_id(&turn.message_id)
                .with_content(announcement),
        );
    }

    fn emit(&self, chunk: StreamChunk) {
        if self.chunk_tx.send(chunk).is_err() {
            log::debug!("Chunk receiver dropped, discarding chunk");
        }
    }

    fn log_store_error(&self, turn: &Turn, err: StoreError) {
        match err {
            StoreError::ConversationNotFound(_) | StoreError::MessageNotFound { .. } => {
                log::debug!(
                    "Dropping update for message {}: {}",
                    turn.message_id,
                    err
                );
            }
            StoreError::Persistence(_) => log::error!("{}", err),
        }
    }
}
