//! Conversation management for one session.
//!
//! - [`model_session`]: binds a session to a model configuration and seeds
//!   new conversations with the tutoring instruction and a greeting
//! - [`turn`]: runs one user turn against the bound conversation

pub mod model_session;
pub mod turn;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::SettingsError;

pub use model_session::{SYSTEM_INSTRUCTION, ensure_conversation, ensure_model};
pub use turn::submit;

/// What the chat is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Free conversation.
    Converse,
    /// Chat grounded in the uploaded files; where a fresh session starts.
    #[default]
    Files,
}

impl ChatMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Converse => "converse",
            Self::Files => "files",
        }
    }

    /// Whether accumulated file fragments go out with each turn.
    #[must_use]
    pub fn attaches_files(self) -> bool {
        self == Self::Files
    }

    /// Canned model turn that opens a conversation.
    #[must_use]
    pub fn greeting(self) -> &'static str {
        match self {
            Self::Converse => "Understood! How can I assist you?",
            Self::Files => "Understood! How can I assist you with your files?",
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatMode {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "converse" | "conversation" => Ok(Self::Converse),
            "files" | "file" => Ok(Self::Files),
            other => Err(SettingsError::UnknownMode(other.to_string())),
        }
    }
}
