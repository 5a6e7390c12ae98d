//! Type definitions for the flowchat streaming prediction protocol
//!
//! This crate is the shared contract between the transport, which turns bytes
//! into frames, and the conversation engine, which turns frames into state.
//! Keeping the wire shapes in one place means both sides agree on field names
//! (the server speaks camelCase) and on how lenient decoding is.
//!
//! ## Features
//!
//! - **Events**: typed view of every `event` discriminant the server sends
//! - **Requests**: the streaming prediction request body
//! - **Payloads**: metadata, source documents and agent reasoning steps
//! - **Opaque blobs**: tool and artifact payloads kept as uninterpreted JSON
//!
//! ## Example
//!
//! ```rust
//! use flowchat_types::StreamEvent;
//!
//! let event = StreamEvent::from_json(r#"{"event":"token","data":"Hello"}"#).unwrap();
//! assert_eq!(event, StreamEvent::Token("Hello".to_string()));
//! ```

pub mod error;
pub mod events;
pub mod types;

pub use error::*;
pub use events::*;
pub use types::*;
