//! Tutor Chat
//!
//! A browser chat front-end for a hosted conversational model, set up as a
//! patient tutor for kids. Children can upload PDFs, images, text and CSV
//! files and talk about them, or just chat; the page keeps a running count
//! of tokens used.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP server rendering the chat page and a JSON API
//! - **Interaction pass**: one explicit pass per user action over a session
//! - **Model API**: provider-agnostic drivers for Gemini and Chat Completions
//!
//! # Modules
//!
//! - [`llm`]: model drivers, model handles and conversations
//! - [`file_processing`]: per-format providers for uploaded files
//! - [`ingest`]: turns uploads into fragments with a token cost
//! - [`session`]: per-session state and the session store
//! - [`chat`]: model binding, conversation bootstrap and chat turns
//! - [`interaction`]: the interaction pass and its render view

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::assigning_clones)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::unused_async)]

pub mod chat;
pub mod config;
pub mod file_processing;
pub mod ingest;
pub mod interaction;
pub mod llm;
pub mod page;
pub mod server;
pub mod session;

use crate::config::AppConfig;

use interaction::ChatService;
use session::SessionStore;
use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Session store for per-session chat state.
    pub sessions: SessionStore,
    /// Runs interaction passes against the model service.
    pub chat: Arc<ChatService>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}
