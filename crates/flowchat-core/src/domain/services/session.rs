use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use flowchat_client::decode_events;
use flowchat_client::ChatTransport;
use flowchat_types::PredictionRequest;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use super::ConversationStore;
use super::EventDispatcher;
use super::Scheduler;
use super::Turn;
use crate::domain::models::ErrorCategory;
use crate::domain::models::Message;
use crate::domain::models::StreamChunk;
use crate::errors::SessionError;
use crate::errors::SessionResult;
use crate::errors::StoreError;
use crate::errors::StoreResult;

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Pause between successive reasoning-step chunks.
    pub stagger: Duration,
    /// Wait before the unconditional safety end signal.
    pub safety_delay: Duration,
    /// Longest silence tolerated between two decoded events.
    pub chunk_timeout: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        ControllerOptions {
            stagger: Duration::from_millis(300),
            safety_delay: Duration::from_millis(500),
            chunk_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnStatus {
    Completed,
    Failed(ErrorCategory),
}

/// How a turn ended, with the assistant message as it was left.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnOutcome {
    pub conversation_id: String,
    pub message_id: String,
    pub status: TurnStatus,
    pub content: String,
}

/// Removes the conversation from the in-flight set however the turn exits.
struct InFlightGuard<'a> {
    in_flight: &'a DashSet<String>,
    conversation_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.conversation_id);
    }
}

/// A failed save leaves the change in memory; the turn carries on.
fn tolerate_persistence(result: StoreResult<()>) -> SessionResult<()> {
    match result {
        Err(StoreError::Persistence(err)) => {
            log::error!("Continuing turn without persisting: {}", err);
            Ok(())
        }
        other => other.map_err(SessionError::from),
    }
}

/// Drives one turn at a time per conversation: request, stream, terminal
/// signals.
pub struct SessionController {
    store: Arc<ConversationStore>,
    transport: Arc<dyn ChatTransport>,
    scheduler: Arc<dyn Scheduler>,
    options: ControllerOptions,
    in_flight: DashSet<String>,
}

impl SessionController {
    pub fn new(
        store: Arc<ConversationStore>,
        transport: Arc<dyn ChatTransport>,
        scheduler: Arc<dyn Scheduler>,
        options: ControllerOptions,
    ) -> SessionController {
        SessionController {
            store,
            transport,
            scheduler,
            options,
            in_flight: DashSet::new(),
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn is_in_flight(&self, conversation_id: &str) -> bool {
        self.in_flight.contains(conversation_id)
    }

    /// Send `text` on the active conversation and stream the answer,
    /// reporting progress on `chunk_tx`.
    pub async fn send_message(
        &self,
        text: &str,
        chunk_tx: &mpsc::UnboundedSender<StreamChunk>,
    ) -> SessionResult<TurnOutcome> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let conversation_id = self
            .store
            .active_id()
            .ok_or(SessionError::NoActiveConversation)?;

        self.send_to(&conversation_id, text, chunk_tx).await
    }

    /// Send `text` on a specific conversation. Transport and stream failures
    /// end the turn with an error message; only precondition failures are
    /// returned as errors.
    pub async fn send_to(
        &self,
        conversation_id: &str,
        text: &str,
        chunk_tx: &mpsc::UnboundedSender<StreamChunk>,
    ) -> SessionResult<TurnOutcome> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        if self.store.conversation(conversation_id).is_none() {
            return Err(SessionError::NoActiveConversation);
        }
        if !self.in_flight.insert(conversation_id.to_string()) {
            return Err(SessionError::TurnInFlight(conversation_id.to_string()));
        }
        let _guard = InFlightGuard {
            in_flight: &self.in_flight,
            conversation_id: conversation_id.to_string(),
        };

        // Requesting
        tolerate_persistence(self.store.append_message(conversation_id, Message::user(text)))?;
        let assistant = Message::pending_assistant();
        let mut turn = Turn::new(conversation_id, &assistant.id, text);
        tolerate_persistence(self.store.append_message(conversation_id, assistant))?;

        let request = self.build_request(conversation_id, text);
        let dispatcher = EventDispatcher::new(
            self.store.clone(),
            self.scheduler.clone(),
            chunk_tx.clone(),
            self.options.stagger,
        );

        log::info!(
            "Sending turn for conversation {} (chatId: {:?})",
            conversation_id,
            request.chat_id
        );

        match self.transport.open_stream(&request).await {
            Ok(body) => {
                // Streaming
                if self.stream(&dispatcher, &mut turn, body).await {
                    dispatcher.stream_closed(&turn);
                }
            }
            Err(err) => {
                log::warn!("Prediction request failed: {}", err);
                dispatcher.fail(&mut turn, ErrorCategory::from_transport(&err));
            }
        }

        // Completed or Failed
        dispatcher.finish(&mut turn);
        self.scheduler.delay(self.options.safety_delay).await;
        dispatcher.safety_end(&mut turn);

        Ok(self.outcome(&turn))
    }

    fn build_request(&self, conversation_id: &str, text: &str) -> PredictionRequest {
        let conversation = self.store.conversation(conversation_id);
        PredictionRequest::new(text)
            .with_chat_id(conversation.as_ref().and_then(|c| c.chat_id.clone()))
            .with_session_id(conversation.as_ref().and_then(|c| c.session_id.clone()))
    }

    /// Pump decoded events through the dispatcher. Returns `false` when the
    /// stream broke off at the transport level.
    async fn stream(
        &self,
        dispatcher: &EventDispatcher,
        turn: &mut Turn,
        body: flowchat_client::ByteStream,
    ) -> bool {
        let mut events = decode_events(body);

        loop {
            match tokio::time::timeout(self.options.chunk_timeout, events.next()).await {
                Ok(Some(Ok(event))) => dispatcher.dispatch(turn, event).await,
                Ok(Some(Err(err))) => {
                    log::warn!("Response stream failed: {}", err);
                    dispatcher.fail(turn, ErrorCategory::from_transport(&err));
                    return false;
                }
                Ok(None) => return true,
                Err(_) => {
                    log::warn!(
                        "No data from agent service for {:?}, giving up",
                        self.options.chunk_timeout
                    );
                    dispatcher.fail(turn, ErrorCategory::Timeout);
                    return false;
                }
            }
        }
    }

    fn outcome(&self, turn: &Turn) -> TurnOutcome {
        let content = self
            .store
            .conversation(&turn.conversation_id)
            .and_then(|conversation| {
                conversation
                    .message(&turn.message_id)
                    .map(|message| message.content.clone())
            })
            .unwrap_or_default();

        TurnOutcome {
            conversation_id: turn.conversation_id.clone(),
            message_id: turn.message_id.clone(),
            status: match turn.failure {
                Some(category) => TurnStatus::Failed(category),
                None => TurnStatus::Completed,
            },
            content,
        }
    }
}
