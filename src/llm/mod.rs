//! LLM driver traits and implementations.
//!
//! This module provides provider-agnostic abstractions for talking to a hosted
//! conversational model: counting tokens and generating a reply for a
//! multi-turn history whose user turns may mix text and media.
//!
//! # Overview
//!
//! The [`LlmDriver`] trait is the wire-level seam. [`ModelApi`] binds a driver
//! to a [`ModelConfig`] and hands out [`ModelHandle`]s, which in turn start
//! [`Conversation`]s that keep their own history.
//!
//! # Drivers
//!
//! - [`GeminiDriver`]: Gemini `generateContent` / `countTokens` REST API
//! - [`ChatCompletionsDriver`]: `OpenAI`-compatible `/v1/chat/completions`
//! - [`ScriptedDriver`]: deterministic in-process driver for tests and offline demos
//!
//! # Example
//!
//! ```rust,ignore
//! use tutor_chat::llm::{ModelApi, ModelConfig, Part};
//!
//! let api = ModelApi::from_settings(&settings)?;
//! let model = api.create_model(ModelConfig::new("gemini-2.0-flash", 0.55, 8192));
//! let mut conversation = model.start_conversation(Vec::new());
//! let reply = conversation.send_message(vec![Part::text("Hi!")]).await?;
//! ```

pub mod chat_completions;
pub mod gemini;
pub mod model;
pub mod provider;
pub mod scripted;
pub mod tokens;

use std::sync::Arc;

pub use chat_completions::ChatCompletionsDriver;
pub use gemini::GeminiDriver;
pub use model::{Conversation, ModelApi, ModelConfig, ModelHandle};
pub use provider::Provider;
pub use scripted::ScriptedDriver;
pub use tokens::TokenService;

/// LLM connection settings.
#[derive(Clone)]
pub struct LlmSettings {
    /// Base URL for the LLM API (e.g., `https://generativelanguage.googleapis.com`).
    pub base_url: String,
    /// API credential.
    pub api_key: String,
    /// Provider type (auto-detected from `base_url` unless overridden).
    pub provider: Provider,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("provider", &self.provider)
            .finish()
    }
}

/// Role of a conversation turn as the model service sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The child (or the bootstrap system instruction).
    User,
    /// The assistant.
    Model,
}

/// One piece of outbound content: plain text or a media payload.
#[derive(Clone, PartialEq, Eq)]
pub enum Part {
    /// Text content.
    Text(String),
    /// Raw bytes with their declared MIME type.
    Media {
        /// MIME type (e.g., `image/png`).
        mime_type: String,
        /// Shared payload, cheap to re-attach on every turn.
        data: Arc<[u8]>,
    },
}

impl Part {
    /// Create a text part.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Create a media part.
    #[must_use]
    pub fn media(mime_type: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self::Media {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Text of this part, if it is a text part.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Media { .. } => None,
        }
    }
}

impl std::fmt::Debug for Part {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Media { mime_type, data } => f
                .debug_struct("Media")
                .field("mime_type", mime_type)
                .field("len", &data.len())
                .finish(),
        }
    }
}

/// A turn in the history sent to the model service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    /// Author of the turn.
    pub role: Role,
    /// Ordered parts of the turn.
    pub parts: Vec<Part>,
}

impl Content {
    /// A single-text-part turn.
    #[must_use]
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part::text(text)],
        }
    }

    /// Concatenated text of all text parts.
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Trait for model service drivers.
///
/// Implementations are stateless with respect to conversations: the full
/// history is passed on every call, the way the hosted chat APIs expect it.
#[async_trait::async_trait]
pub trait LlmDriver: Send + Sync {
    /// Count tokens for the given parts under the given model.
    ///
    /// # Errors
    ///
    /// Returns an error if the counting request fails.
    async fn count_tokens(&self, config: &ModelConfig, parts: &[Part]) -> anyhow::Result<u32>;

    /// Generate the next model reply for `history`.
    ///
    /// The last entry of `history` is the new user turn.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the service returns no text.
    async fn generate(&self, config: &ModelConfig, history: &[Content]) -> anyhow::Result<String>;

    /// Whether [`LlmDriver::count_tokens`] gives a real figure for media parts.
    fn measures_media(&self) -> bool {
        false
    }

    /// Provider name for logging.
    fn provider_name(&self) -> &'static str;
}
