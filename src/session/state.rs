//! State of one chat session.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::chat::ChatMode;
use crate::ingest::Fragment;
use crate::llm::{Conversation, ModelConfig, ModelHandle};

/// Author of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

/// One entry of the visible transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            content: content.into(),
        }
    }
}

/// Where a session is in its chat lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Fresh; no chat slots yet.
    Uninitialized,
    /// Slots present, no conversation.
    Initialized,
    /// A conversation is bound to the current model configuration.
    Active,
}

/// Slots created by [`SessionState::initialize_if_absent`].
#[derive(Debug, Clone, Default)]
pub struct ChatState {
    pub transcript: Vec<Turn>,
    /// Insertion order is processing order.
    pub fragments: Vec<Fragment>,
    pub processed_file_names: BTreeSet<String>,
}

/// Everything one session remembers between interactions.
///
/// `processed_file_names` always equals the set of fragment source names,
/// and `token_total` only grows until [`SessionState::reset`].
#[derive(Debug)]
pub struct SessionState {
    id: String,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    /// Last selected chat mode; survives a reset like any other widget value.
    pub mode: ChatMode,
    chat: Option<ChatState>,
    token_total: u64,
    model: Option<ModelHandle>,
    conversation: Option<Conversation>,
}

impl SessionState {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            last_activity: now,
            mode: ChatMode::default(),
            chat: None,
            token_total: 0,
            model: None,
            conversation: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// Create the empty chat slots unless they already exist.
    pub fn initialize_if_absent(&mut self) {
        if self.chat.is_none() {
            tracing::debug!(session_id = %self.id, "Session initialized");
        }
        self.chat.get_or_insert_with(ChatState::default);
    }

    /// Drop the conversation, transcript, files and model binding, leaving
    /// empty slots behind ([`Lifecycle::Initialized`]).
    pub fn reset(&mut self) {
        self.chat = Some(ChatState::default());
        self.conversation = None;
        self.model = None;
        self.token_total = 0;
        self.touch();
        tracing::info!(name: "session.reset", session_id = %self.id, "Session reset");
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        match (&self.chat, &self.conversation) {
            (None, _) => Lifecycle::Uninitialized,
            (Some(_), None) => Lifecycle::Initialized,
            (Some(_), Some(_)) => Lifecycle::Active,
        }
    }

    #[must_use]
    pub fn transcript(&self) -> &[Turn] {
        self.chat
            .as_ref()
            .map(|c| c.transcript.as_slice())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn fragments(&self) -> &[Fragment] {
        self.chat
            .as_ref()
            .map(|c| c.fragments.as_slice())
            .unwrap_or_default()
    }

    /// Processed file names in sorted order.
    pub fn processed_file_names(&self) -> impl Iterator<Item = &str> {
        self.chat
            .iter()
            .flat_map(|c| c.processed_file_names.iter().map(String::as_str))
    }

    #[must_use]
    pub fn is_processed(&self, file_name: &str) -> bool {
        self.chat
            .as_ref()
            .is_some_and(|c| c.processed_file_names.contains(file_name))
    }

    #[must_use]
    pub fn token_total(&self) -> u64 {
        self.token_total
    }

    pub fn add_tokens(&mut self, tokens: u64) {
        self.token_total = self.token_total.saturating_add(tokens);
    }

    /// Append a turn to the transcript.
    pub fn push_turn(&mut self, turn: Turn) {
        self.chat_mut().transcript.push(turn);
        self.touch();
    }

    /// Store the fragments of a newly ingested file and charge its cost.
    ///
    /// Returns `false` without changing anything when the name was already
    /// processed.
    pub fn record_file(
        &mut self,
        file_name: &str,
        fragments: Vec<Fragment>,
        token_cost: u64,
    ) -> bool {
        let chat = self.chat_mut();
        if !chat.processed_file_names.insert(file_name.to_string()) {
            return false;
        }
        chat.fragments.extend(fragments);
        self.add_tokens(token_cost);
        self.touch();
        true
    }

    #[must_use]
    pub fn model(&self) -> Option<&ModelHandle> {
        self.model.as_ref()
    }

    #[must_use]
    pub fn model_config(&self) -> Option<&ModelConfig> {
        self.model.as_ref().map(ModelHandle::config)
    }

    /// Bind a new model; any existing conversation is destroyed.
    pub fn bind_model(&mut self, model: ModelHandle) {
        if let Some(old) = self.conversation.take() {
            tracing::info!(
                session_id = %self.id,
                conversation_id = %old.id(),
                "Conversation invalidated by model change"
            );
        }
        self.model = Some(model);
    }

    #[must_use]
    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub fn conversation_mut(&mut self) -> Option<&mut Conversation> {
        self.conversation.as_mut()
    }

    pub fn set_conversation(&mut self, conversation: Conversation) {
        self.conversation = Some(conversation);
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Whether the session has been idle for longer than `timeout`.
    #[must_use]
    pub fn is_expired_with_timeout(&self, timeout: Duration) -> bool {
        // Negative means clock skew; treat as fresh.
        (Utc::now() - self.last_activity)
            .to_std()
            .is_ok_and(|idle| idle > timeout)
    }

    fn chat_mut(&mut self) -> &mut ChatState {
        self.chat.get_or_insert_with(ChatState::default)
    }

    #[cfg(test)]
    pub(crate) fn set_last_activity(&mut self, at: DateTime<Utc>) {
        self.last_activity = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::FragmentBody;
    use crate::llm::{LlmDriver, ModelApi, ScriptedDriver};
    use std::sync::Arc;

    fn fragment(name: &str) -> Fragment {
        Fragment {
            source_file_name: name.to_string(),
            source_mime_type: "text/plain".to_string(),
            body: FragmentBody::Text(format!("Text file '{name}' content: x")),
        }
    }

    fn model(temperature: f32) -> ModelHandle {
        let driver: Arc<dyn LlmDriver> = Arc::new(ScriptedDriver::new());
        ModelApi::new(driver).create_model(ModelConfig::new("scripted", temperature, 100))
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let mut session = SessionState::new("s1");
        assert_eq!(session.lifecycle(), Lifecycle::Uninitialized);

        session.initialize_if_absent();
        session.push_turn(Turn::user("hi"));
        session.initialize_if_absent();

        assert_eq!(session.lifecycle(), Lifecycle::Initialized);
        assert_eq!(session.transcript().len(), 1);
    }

    #[test]
    fn test_record_file_dedups_by_name() {
        let mut session = SessionState::new("s1");
        session.initialize_if_absent();

        assert!(session.record_file("a.txt", vec![fragment("a.txt")], 4));
        assert!(!session.record_file("a.txt", vec![fragment("a.txt")], 4));
        assert!(session.record_file("b.txt", vec![fragment("b.txt")], 3));

        assert_eq!(session.fragments().len(), 2);
        assert_eq!(
            session.processed_file_names().collect::<Vec<_>>(),
            vec!["a.txt", "b.txt"]
        );
        assert_eq!(session.token_total(), 7);
    }

    #[test]
    fn test_reset_clears_everything_but_mode() {
        let mut session = SessionState::new("s1");
        session.mode = ChatMode::Files;
        session.initialize_if_absent();
        session.push_turn(Turn::user("hi"));
        session.record_file("a.txt", vec![fragment("a.txt")], 4);
        let handle = model(0.5);
        session.bind_model(handle.clone());
        session.set_conversation(handle.start_conversation(Vec::new()));
        assert_eq!(session.lifecycle(), Lifecycle::Active);

        session.reset();

        assert_eq!(session.lifecycle(), Lifecycle::Initialized);
        assert!(session.transcript().is_empty());
        assert!(session.fragments().is_empty());
        assert_eq!(session.processed_file_names().count(), 0);
        assert_eq!(session.token_total(), 0);
        assert!(session.model().is_none());
        assert!(session.conversation().is_none());
        assert_eq!(session.mode, ChatMode::Files);
    }

    #[test]
    fn test_bind_model_drops_conversation() {
        let mut session = SessionState::new("s1");
        session.initialize_if_absent();
        let first = model(0.5);
        session.bind_model(first.clone());
        session.set_conversation(first.start_conversation(Vec::new()));

        session.bind_model(model(0.6));

        assert!(session.conversation().is_none());
        assert_eq!(session.lifecycle(), Lifecycle::Initialized);
    }

    #[test]
    fn test_expiry() {
        let mut session = SessionState::new("s1");
        assert!(!session.is_expired_with_timeout(Duration::from_secs(60)));

        session.set_last_activity(Utc::now() - chrono::Duration::seconds(120));
        assert!(session.is_expired_with_timeout(Duration::from_secs(60)));
    }
}
