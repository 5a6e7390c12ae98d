use std::sync::Arc;
use std::time::Duration;

use flowchat_client::replay_client::ReplayTransport;
use flowchat_core::{
    ChunkKind, ControllerOptions, ConversationStore, FileRepository, SessionController,
    StreamChunk, TokioScheduler, TurnStatus,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

const RESPONSE: &str = concat!(
    "message:\ndata:{\"event\":\"start\",\"data\":\"\"}\n\n",
    "message:\ndata:{\"event\":\"agentReasoning\",\"data\":[{\"agentName\":\"Supervisor\",\"messages\":[\"Routing to Researcher\"],\"next\":\"Researcher\"},{\"agentName\":\"Researcher\",\"messages\":[\"Reading the book\"],\"usedTools\":[{\"tool\":\"retriever\"}]}]}\n\n",
    "message:\ndata:{\"event\":\"nextAgent\",\"data\":\"Writer\"}\n\n",
    "message:\ndata:{\"event\":\"token\",\"data\":\"Ownership\"}\n\n",
    "message:\ndata:{\"event\":\"token\",\"data\":\"Ownership means one owner.\"}\n\n",
    "message:\ndata:{\"event\":\"sourceDocuments\",\"data\":[{\"pageContent\":\"Each value has an owner\",\"metadata\":{\"The Rust Programming Language\":\"Klabnik\",\"loc\":{\"lines\":{\"from\":10,\"to\":12}}},\"id\":\"doc-1\"},\"not a document\"]}\n\n",
    "message:\ndata:{\"event\":\"metadata\",\"data\":{\"chatId\":\"chat-9\",\"sessionId\":\"sess-9\",\"messageId\":\"msg-1\"}}\n\n",
    "message:\ndata:{\"event\":\"end\",\"data\":\"[DONE]\"}\n\n",
);

fn options() -> ControllerOptions {
    ControllerOptions {
        stagger: Duration::from_millis(5),
        safety_delay: Duration::from_millis(5),
        chunk_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn test_turn_is_streamed_persisted_and_restored() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ConversationStore::new(Arc::new(FileRepository::in_dir(dir.path()))));

    let notifications = Arc::new(Mutex::new(0usize));
    let counter = notifications.clone();
    store.subscribe(move |_| *counter.lock() += 1);

    let transport = ReplayTransport::from_text(RESPONSE, 23);
    let controller = SessionController::new(
        store.clone(),
        Arc::new(transport.clone()),
        Arc::new(TokioScheduler),
        options(),
    );

    let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<StreamChunk>();
    let outcome = controller
        .send_message("What is ownership in Rust?", &chunk_tx)
        .await
        .unwrap();
    drop(chunk_tx);

    let mut kinds = vec![];
    while let Some(chunk) = chunk_rx.recv().await {
        kinds.push(chunk.kind);
    }

    assert_eq!(outcome.status, TurnStatus::Completed);
    assert_eq!(outcome.content, "Ownership means one owner.");
    assert_eq!(
        kinds,
        vec![
            ChunkKind::Start,
            ChunkKind::AgentReasoning,
            ChunkKind::AgentReasoning,
            ChunkKind::NextAgent,
            ChunkKind::Thinking,
            ChunkKind::Content,
            ChunkKind::Content,
            ChunkKind::SourceDocuments,
            ChunkKind::End,
            ChunkKind::End,
        ]
    );
    assert!(*notifications.lock() > 0);

    // A fresh store over the same file sees the same conversation.
    let restored = ConversationStore::new(Arc::new(FileRepository::in_dir(dir.path())));
    assert_eq!(restored.get_state(), store.get_state());

    let conversation = restored.active_conversation().unwrap();
    assert_eq!(conversation.title, "What is ownership in Rust?");
    assert_eq!(conversation.chat_id.as_deref(), Some("chat-9"));
    assert_eq!(conversation.session_id.as_deref(), Some("sess-9"));
    assert_eq!(conversation.reasoning_steps.len(), 3);
    assert_eq!(
        conversation.reasoning_steps[2].messages,
        vec!["Writer is now processing".to_string()]
    );
    assert_eq!(conversation.source_documents.len(), 1);
    assert_eq!(conversation.source_documents[0].author(), "Klabnik");
    assert_eq!(
        conversation.source_documents[0].line_range().as_deref(),
        Some("Lines 10 - 12")
    );
    assert!(conversation.messages.iter().all(|message| message.is_complete));
}

#[tokio::test]
async fn test_follow_up_turn_reuses_remote_ids_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ReplayTransport::from_text(RESPONSE, 512);

    {
        let store = Arc::new(ConversationStore::new(Arc::new(FileRepository::in_dir(dir.path()))));
        let controller = SessionController::new(
            store,
            Arc::new(transport.clone()),
            Arc::new(TokioScheduler),
            options(),
        );
        let (chunk_tx, _chunk_rx) = mpsc::unbounded_channel();
        controller.send_message("first", &chunk_tx).await.unwrap();
    }

    let store = Arc::new(ConversationStore::new(Arc::new(FileRepository::in_dir(dir.path()))));
    let controller = SessionController::new(
        store,
        Arc::new(transport.clone()),
        Arc::new(TokioScheduler),
        options(),
    );
    let (chunk_tx, _chunk_rx) = mpsc::unbounded_channel();
    controller.send_message("second", &chunk_tx).await.unwrap();

    let requests = transport.recorded_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].chat_id.as_deref(), Some("chat-9"));
    assert_eq!(requests[1].session_id.as_deref(), Some("sess-9"));
}
