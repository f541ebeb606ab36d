//! Knowbot Core - Streaming RAG Chat Engine
//!
//! This crate provides the headless core of knowbot: a conversational
//! front-end that submits questions to a retrieval-augmented completion
//! service and renders the streamed answer with cited sources. It has no
//! terminal or UI dependencies and can drive any surface.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          UI Surface                              │
//! │        submit(text)  │                 ▲  Delta / Completed /    │
//! │                      ▼                 │  Failed events          │
//! └──────────────────────┼─────────────────┼─────────────────────────┘
//!                        │                 │
//! ┌──────────────────────┼─────────────────┼─────────────────────────┐
//! │                 ChatSession (orchestrator)                       │
//! │  ┌───────────────────┴──────┐   ┌──────┴────────────────────────┐│
//! │  │    ConversationStore     │   │       StreamController        ││
//! │  │  history + pending input │◄──│  one in-flight stream,        ││
//! │  │  set_input/commit/reset  │   │  generation-tagged chunks     ││
//! │  └──────────────────────────┘   └──────┬────────────────────────┘│
//! └─────────────────────────────────────────┼────────────────────────┘
//!                                           │ CompletionBackend
//!                                  ┌────────┴────────┐
//!                                  │   HttpBackend   │ POST, NDJSON body
//!                                  └─────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ChatSession`]: Wires the store to the controller; the type surfaces use
//! - [`StreamController`]: Owns the single network stream and its buffer
//! - [`ConversationStore`]: Reducer holding history and the pending query
//! - [`CompletionBackend`]: Transport seam; [`HttpBackend`] in production
//! - [`AppConfig`]: Startup configuration, shared immutably
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use knowbot_core::{load_config, ChatSession, HttpBackend, StreamEvent};
//!
//! let config = Arc::new(load_config()?);
//! let backend = Arc::new(HttpBackend::from_config(&config.service)?);
//! let mut session = ChatSession::new(backend, config);
//!
//! session.submit("How do I install it?");
//! while session.is_streaming() {
//!     for event in session.next_events().await {
//!         match event {
//!             StreamEvent::Delta(text) => print!("{text}"),
//!             StreamEvent::Completed { metadata, .. } => println!("\n{} sources", metadata.sources.len()),
//!             StreamEvent::Failed { error, .. } => eprintln!("\n{error}"),
//!         }
//!     }
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: Completion transport trait, HTTP implementation, scripted test backend
//! - [`config`]: TOML/env/CLI configuration loading
//! - [`conversation`]: Conversation state machine
//! - [`error`]: Stream and frame errors
//! - [`messages`]: Shared conversation types
//! - [`session`]: Orchestration of store and controller
//! - [`stream`]: Wire codec and stream controller

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod conversation;
pub mod error;
pub mod messages;
pub mod session;
pub mod stream;

// Re-exports for convenience
pub use backend::{
    ByteStream, CompletionBackend, CompletionConfig, CompletionRequest, HistoryEntry, HttpBackend,
};
pub use conversation::{
    ConversationAction, ConversationPhase, ConversationStore, RejectReason, StreamGate, Transition,
};
pub use error::{FrameError, StreamError};
pub use messages::{Conversation, Interaction, Metadata, SessionId, Source};
pub use session::ChatSession;
pub use stream::{StreamController, StreamControllerConfig, StreamEvent, StreamState, StreamStats};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, AppConfig, ConfigError,
    ConfigOverrides, ConfigSource, KnowbotToml, ServiceConfig, UiConfig,
};
