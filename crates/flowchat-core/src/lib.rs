//! Conversation engine for the flowchat client.
//!
//! Owns the conversation list and turns decoded stream events into state:
//! the [`ConversationStore`] holds and persists conversations, the
//! [`EventDispatcher`] applies one wire event at a time to a turn, and the
//! [`SessionController`] runs a full send/stream/terminal cycle against a
//! [`flowchat_client::ChatTransport`].

pub mod domain;
pub mod errors;
pub mod infrastructure;

pub use domain::models::{
    AuthProvider, ChunkKind, Conversation, ErrorCategory, Message, Role, StreamChunk, ThemeMode,
    ThemeProvider,
};
pub use domain::services::{
    ChatState, ControllerOptions, ConversationRepository, ConversationStore, EventDispatcher,
    ImmediateScheduler, InMemoryRepository, Scheduler, SessionController, TokioScheduler, Turn,
    TurnOutcome, TurnStatus,
};
pub use errors::{PersistenceError, SessionError, StoreError};
pub use infrastructure::collaborators::{StaticAuth, StaticTheme};
pub use infrastructure::storage::FileRepository;
