//! Conversation domain: the persisted model and the services that keep it
//! consistent while responses stream in.

pub mod models;
pub mod services;
