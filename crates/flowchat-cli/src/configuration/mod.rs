//! Configuration management for the terminal client.
//!
//! Values are resolved once at startup from built-in defaults, then the TOML
//! config file, then command line flags, and read from anywhere afterwards
//! through [`Config::get`].

mod config;

pub use config::*;
