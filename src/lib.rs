//! localchat-rs: client adapter for a local Ollama daemon
//!
//! This library turns conversations into Ollama chat or completion payloads,
//! sends them over HTTP, normalizes the two response envelopes into one
//! shape and strips `<think>` reasoning blocks from the answer.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::too_many_lines)]

pub mod cli;
pub mod config;
pub mod error;
pub mod messages;
pub mod reasoning;
pub mod services;

// Re-exports for convenience
pub use config::AdapterConfig;
pub use error::{ChatError, Result, TransportErrorKind};
pub use messages::{ConversationMessage, Role};
pub use services::{GenerationRequest, GenerationResponse, OllamaAdapter, PayloadMode};
