//! Terminal front end for the flowchat engine.
//!
//! Provides the `flowchat` binary's configuration layer and its line-based
//! chat interface: streamed answers, conversation management through slash
//! commands, and a one-shot `ask` mode.

pub mod application;
pub mod configuration;

pub use application::repl::{ChatApp, Flow};
pub use configuration::{Config, ConfigKey};
