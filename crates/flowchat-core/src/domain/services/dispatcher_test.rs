use std::sync::Arc;
use std::time::Duration;

use flowchat_types::Metadata;
use flowchat_types::ReasoningStep;
use flowchat_types::SourceDocument;
use flowchat_types::StreamEvent;
use serde_json::json;
use serde_json::Value;
use tokio::sync::mpsc;

use super::*;
use crate::domain::models::Message;
use crate::domain::models::Role;
use crate::domain::services::ImmediateScheduler;
use crate::domain::services::InMemoryRepository;

const STAGGER: Duration = Duration::from_millis(300);

struct Harness {
    store: Arc<ConversationStore>,
    scheduler: Arc<ImmediateScheduler>,
    dispatcher: EventDispatcher,
    chunks: mpsc::UnboundedReceiver<StreamChunk>,
    turn: Turn,
}

impl Harness {
    fn new(question: &str) -> Harness {
        Harness::with_history(&[], question)
    }

    fn with_history(earlier_questions: &[&str], question: &str) -> Harness {
        let store = Arc::new(ConversationStore::new(Arc::new(InMemoryRepository::new())));
        let conversation_id = store.active_id().unwrap();

        for earlier in earlier_questions {
            store
                .append_message(&conversation_id, Message::user(earlier))
                .unwrap();
            store
                .append_message(&conversation_id, Message::new(Role::Assistant, "answer", true))
                .unwrap();
        }

        store
            .append_message(&conversation_id, Message::user(question))
            .unwrap();
        let assistant = Message::pending_assistant();
        let turn = Turn::new(&conversation_id, &assistant.id, question);
        store.append_message(&conversation_id, assistant).unwrap();

        let scheduler = Arc::new(ImmediateScheduler::new());
        let (chunk_tx, chunks) = mpsc::unbounded_channel();
        let dispatcher = EventDispatcher::new(store.clone(), scheduler.clone(), chunk_tx, STAGGER);

        Harness {
            store,
            scheduler,
            dispatcher,
            chunks,
            turn,
        }
    }

    async fn dispatch_all(&mut self, events: Vec<StreamEvent>) {
        for event in events {
            self.dispatcher.dispatch(&mut self.turn, event).await;
        }
    }

    fn drain(&mut self) -> Vec<StreamChunk> {
        let mut chunks = vec![];
        while let Ok(chunk) = self.chunks.try_recv() {
            chunks.push(chunk);
        }
        chunks
    }

    fn message(&self) -> Message {
        self.store
            .conversation(&self.turn.conversation_id)
            .and_then(|conversation| conversation.message(&self.turn.message_id).cloned())
            .unwrap()
    }
}

fn kinds(chunks: &[StreamChunk]) -> Vec<ChunkKind> {
    chunks.iter().map(|chunk| chunk.kind).collect()
}

fn token(text: &str) -> StreamEvent {
    StreamEvent::Token(text.to_string())
}

fn step(agent: &str, message: &str) -> ReasoningStep {
    ReasoningStep::new(agent, vec![message.to_string()])
}

#[tokio::test]
async fn test_chunks_mirror_wire_order() {
    let mut harness = Harness::new("Tell me about Rust");
    let document = SourceDocument::new("d1", "Rust is...", serde_json::Map::new());

    harness
        .dispatch_all(vec![
            StreamEvent::Start(Value::Null),
            token("Rust"),
            token("Rust is fast"),
            StreamEvent::SourceDocuments(vec![document]),
            StreamEvent::AgentReasoning(vec![step("Supervisor", "route"), step("Writer", "draft")]),
            StreamEvent::NextAgent("Writer".to_string()),
            StreamEvent::done(),
        ])
        .await;

    let chunks = harness.drain();
    assert_eq!(
        kinds(&chunks),
        vec![
            ChunkKind::Start,
            ChunkKind::Content,
            ChunkKind::Content,
            ChunkKind::SourceDocuments,
            ChunkKind::AgentReasoning,
            ChunkKind::AgentReasoning,
            ChunkKind::NextAgent,
            ChunkKind::Thinking,
            ChunkKind::End,
        ]
    );
    assert!(chunks[3].message_id.is_none());
    assert_eq!(chunks[7].content.as_deref(), Some("Writer is now processing"));
    assert!(chunks[8].is_logical_end());
    assert_eq!(harness.scheduler.requested_delays(), vec![STAGGER]);
}

#[tokio::test]
async fn test_tokens_replace_content() {
    let mut harness = Harness::new("Spell it");
    harness
        .dispatch_all(vec![token("AB"), token("ABC")])
        .await;

    let message = harness.message();
    assert_eq!(message.content, "ABC");
    assert!(!message.is_complete);
    assert!(harness.turn.content_received);
}

#[tokio::test]
async fn test_token_then_done() {
    let mut harness = Harness::new("Greet me");
    harness
        .dispatch_all(vec![token("Hello"), StreamEvent::done()])
        .await;

    let message = harness.message();
    assert_eq!(message.content, "Hello");
    assert!(message.is_complete);

    let chunks = harness.drain();
    assert_eq!(kinds(&chunks), vec![ChunkKind::Content, ChunkKind::End]);
    assert_eq!(chunks[1].content.as_deref(), Some("Hello"));
}

#[tokio::test]
async fn test_done_without_content_uses_placeholder() {
    let mut harness = Harness::new("Anything?");
    harness.dispatch_all(vec![StreamEvent::done()]).await;

    let message = harness.message();
    assert_eq!(message.content, EMPTY_RESPONSE_PLACEHOLDER);
    assert!(message.is_complete);
}

#[tokio::test]
async fn test_end_with_text_becomes_the_body() {
    let mut harness = Harness::new("Short answer please");
    harness
        .dispatch_all(vec![StreamEvent::End(json!("Final answer"))])
        .await;

    assert_eq!(harness.message().content, "Final answer");
}

#[tokio::test]
async fn test_end_text_does_not_override_streamed_content() {
    let mut harness = Harness::new("q");
    harness
        .dispatch_all(vec![token("streamed"), StreamEvent::End(json!("other"))])
        .await;

    assert_eq!(harness.message().content, "streamed");
}

#[tokio::test]
async fn test_last_question_is_quoted() {
    let mut harness = Harness::with_history(
        &["How big is the sun?", "And the moon?"],
        "What was my last question?",
    );
    harness.dispatch_all(vec![StreamEvent::done()]).await;

    assert_eq!(
        harness.message().content,
        "Your last question was: \"And the moon?\""
    );
}

#[tokio::test]
async fn test_last_question_without_history() {
    let mut harness = Harness::new("what is my previous   question");
    harness.dispatch_all(vec![StreamEvent::done()]).await;

    assert_eq!(
        harness.message().content,
        "I don't see an earlier question in this conversation yet."
    );
}

#[tokio::test]
async fn test_error_event_fails_the_turn() {
    let mut harness = Harness::new("q");
    harness
        .dispatch_all(vec![
            token("partial"),
            StreamEvent::Error("connect ECONNREFUSED 10.0.0.2:3000".to_string()),
            token("late token"),
        ])
        .await;

    let message = harness.message();
    assert_eq!(message.content, ErrorCategory::Network.user_message());
    assert!(message.is_complete);
    assert_eq!(harness.turn.failure, Some(ErrorCategory::Network));

    let chunks = harness.drain();
    assert_eq!(kinds(&chunks), vec![ChunkKind::Content, ChunkKind::Error]);
    assert!(!chunks[1].content.as_deref().unwrap_or_default().contains("ECONNREFUSED"));
}

#[tokio::test]
async fn test_error_after_end_keeps_the_answer() {
    let mut harness = Harness::new("q");
    harness
        .dispatch_all(vec![
            token("Answer"),
            StreamEvent::done(),
            StreamEvent::Error("late failure".to_string()),
        ])
        .await;

    assert_eq!(harness.message().content, "Answer");
    assert!(harness.message().is_complete);
    assert_eq!(harness.turn.failure, None);
    assert!(!harness.turn.failed());

    let chunks = harness.drain();
    assert_eq!(
        kinds(&chunks),
        vec![ChunkKind::Content, ChunkKind::End, ChunkKind::Error]
    );
}

#[test]
fn test_last_question_pattern() {
    assert!(LAST_QUESTION_PATTERN.is_match("What was my last question?"));
    assert!(LAST_QUESTION_PATTERN.is_match("so WHAT IS MY PREVIOUS QUESTION"));
    assert!(!asks_for_last_question("What was the last answer?"));
}

#[tokio::test]
async fn test_metadata_merges_ids() {
    let mut harness = Harness::new("q");
    harness
        .dispatch_all(vec![
            StreamEvent::Metadata(Metadata {
                chat_id: Some("c1".to_string()),
                session_id: Some("s1".to_string()),
                ..Default::default()
            }),
            StreamEvent::Metadata(Metadata::default()),
        ])
        .await;

    let conversation = harness.store.conversation(&harness.turn.conversation_id).unwrap();
    assert_eq!(conversation.chat_id.as_deref(), Some("c1"));
    assert_eq!(conversation.session_id.as_deref(), Some("s1"));
    assert!(harness.turn.metadata_received);
    assert!(harness.drain().is_empty());
}

#[tokio::test]
async fn test_repeated_end_is_replayed() {
    let mut harness = Harness::new("q");
    harness
        .dispatch_all(vec![token("done"), StreamEvent::done(), StreamEvent::done()])
        .await;

    let ends: Vec<StreamChunk> = harness.drain().into_iter().filter(StreamChunk::is_end).collect();
    assert_eq!(ends.len(), 2);
    assert!(ends[0].is_logical_end());
    assert!(ends[1].replayed);
    assert_eq!(harness.message().content, "done");
}

#[tokio::test]
async fn test_end_after_error_is_the_logical_end() {
    let mut harness = Harness::new("q");
    harness
        .dispatch_all(vec![StreamEvent::Error("Request timed out".to_string()), StreamEvent::done()])
        .await;

    let chunks = harness.drain();
    assert_eq!(kinds(&chunks), vec![ChunkKind::Error, ChunkKind::End]);
    assert!(chunks[1].is_logical_end());
    assert_eq!(harness.message().content, ErrorCategory::Timeout.user_message());
}

#[tokio::test]
async fn test_updates_target_the_turn_conversation() {
    let mut harness = Harness::new("q");
    let other = harness.store.create_conversation().unwrap();
    assert_eq!(harness.store.active_id(), Some(other.id.clone()));

    harness
        .dispatch_all(vec![token("for the original"), StreamEvent::done()])
        .await;

    assert_eq!(harness.message().content, "for the original");
    assert!(harness.store.conversation(&other.id).unwrap().messages.is_empty());
}

#[tokio::test]
async fn test_deleted_conversation_updates_are_dropped() {
    let mut harness = Harness::new("q");
    harness
        .store
        .delete_conversation(&harness.turn.conversation_id)
        .unwrap();

    harness
        .dispatch_all(vec![
            token("lost"),
            StreamEvent::Metadata(Metadata {
                chat_id: Some("c1".to_string()),
                ..Default::default()
            }),
            StreamEvent::done(),
        ])
        .await;

    assert!(harness.drain().is_empty());
    let state = harness.store.get_state();
    assert_eq!(state.conversations.len(), 1);
    assert!(state.conversations[0].chat_id.is_none());
}

#[tokio::test]
async fn test_agent_reasoning_replaces_trace() {
    let mut harness = Harness::new("q");
    harness
        .dispatch_all(vec![
            StreamEvent::AgentReasoning(vec![step("Supervisor", "route")]),
            StreamEvent::AgentReasoning(vec![step("Supervisor", "route"), step("Researcher", "read")]),
        ])
        .await;

    let trace = harness
        .store
        .conversation(&harness.turn.conversation_id)
        .unwrap()
        .reasoning_steps;
    assert_eq!(trace.len(), 2);
    assert_eq!(trace[1].agent_name, "Researcher");

    let chunks = harness.drain();
    assert_eq!(chunks.len(), 3);
    let emitted: ReasoningStep =
        serde_json::from_str(chunks[2].content.as_deref().unwrap()).unwrap();
    assert_eq!(emitted, step("Researcher", "read"));
}

#[tokio::test]
async fn test_next_agent_appends_announcement() {
    let mut harness = Harness::new("q");
    harness
        .dispatch_all(vec![
            StreamEvent::AgentReasoning(vec![step("Supervisor", "route")]),
            StreamEvent::NextAgent("Researcher".to_string()),
        ])
        .await;

    let trace = harness
        .store
        .conversation(&harness.turn.conversation_id)
        .unwrap()
        .reasoning_steps;
    assert_eq!(trace.len(), 2);
    assert_eq!(trace[1], ReasoningStep::announcement("Researcher"));
}

#[tokio::test]
async fn test_side_channel_and_unknown_events_are_ignored() {
    let mut harness = Harness::new("q");
    harness
        .dispatch_all(vec![
            StreamEvent::UsedTools(json!([{"tool": "search"}])),
            StreamEvent::Artifacts(json!([])),
            StreamEvent::Unknown {
                name: "usage".to_string(),
                data: json!({"tokens": 3}),
            },
        ])
        .await;

    assert!(harness.drain().is_empty());
    assert!(!harness.message().is_complete);
}

#[tokio::test]
async fn test_finish_synthesises_a_single_end() {
    let mut harness = Harness::new("q");
    harness
        .dispatch_all(vec![StreamEvent::Start(Value::Null), token("Hi")])
        .await;

    harness.dispatcher.finish(&mut harness.turn);
    harness.dispatcher.finish(&mut harness.turn);

    let chunks = harness.drain();
    assert_eq!(
        kinds(&chunks),
        vec![ChunkKind::Start, ChunkKind::Content, ChunkKind::End]
    );
    assert!(harness.message().is_complete);
    assert_eq!(harness.message().content, "Hi");
}

#[tokio::test]
async fn test_safety_end_completes_open_message() {
    let mut harness = Harness::new("q");
    harness.dispatch_all(vec![token("half")]).await;

    harness.dispatcher.safety_end(&mut harness.turn);
    harness.dispatcher.safety_end(&mut harness.turn);

    let chunks = harness.drain();
    assert_eq!(kinds(&chunks), vec![ChunkKind::Content, ChunkKind::End, ChunkKind::End]);
    assert!(chunks[1].is_logical_end());
    assert!(chunks[2].replayed);
    assert!(harness.message().is_complete);
}

#[tokio::test]
async fn test_missing_metadata_mints_local_id() {
    let mut harness = Harness::new("q");
    harness.dispatch_all(vec![token("x")]).await;
    harness.drain();

    harness.dispatcher.stream_closed(&harness.turn);

    let chunks = harness.drain();
    assert_eq!(kinds(&chunks), vec![ChunkKind::Error]);
    let chat_id = harness
        .store
        .conversation(&harness.turn.conversation_id)
        .unwrap()
        .chat_id
        .unwrap();
    assert!(chat_id.starts_with(crate::domain::services::LOCAL_CHAT_ID_PREFIX));
}

#[tokio::test]
async fn test_metadata_without_chat_id_mints_local_id() {
    let mut harness = Harness::new("q");
    harness
        .dispatch_all(vec![
            StreamEvent::Metadata(Metadata {
                session_id: Some("s1".to_string()),
                ..Default::default()
            }),
            token("x"),
        ])
        .await;
    harness.drain();

    harness.dispatcher.stream_closed(&harness.turn);

    assert!(harness.drain().is_empty());
    let conversation = harness.store.conversation(&harness.turn.conversation_id).unwrap();
    assert_eq!(conversation.session_id.as_deref(), Some("s1"));
    assert!(conversation
        .chat_id
        .unwrap()
        .starts_with(crate::domain::services::LOCAL_CHAT_ID_PREFIX));
}

#[tokio::test]
async fn test_stream_closed_keeps_remote_chat_id() {
    let mut harness = Harness::new("q");
    harness
        .dispatch_all(vec![StreamEvent::Metadata(Metadata {
            chat_id: Some("c1".to_string()),
            ..Default::default()
        })])
        .await;

    harness.dispatcher.stream_closed(&harness.turn);

    assert!(harness.drain().is_empty());
    let conversation = harness.store.conversation(&harness.turn.conversation_id).unwrap();
    assert_eq!(conversation.chat_id.as_deref(), Some("c1"));
}
