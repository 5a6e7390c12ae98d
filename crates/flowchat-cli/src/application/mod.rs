//! Application layer of the terminal client.
//!
//! Command-line parsing, slash commands, chunk rendering and the chat loop,
//! plus the wiring that turns resolved configuration into engine components.

pub mod cli;
pub mod commands;
pub mod render;
pub mod repl;
pub mod setup;
