//! Deterministic in-process driver.
//!
//! Used by the test suites and selectable at runtime with
//! `LLM_PROVIDER=scripted` for demos without network access. Tokens are
//! counted as whitespace-separated words; media parts cost one token per
//! started kilobyte.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::{Content, LlmDriver, ModelConfig, Part};

/// A queued reply: text, or a failure message.
type Scripted = Result<String, String>;

/// Driver that answers from a queue and records every request.
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    replies: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<Vec<Content>>>,
    fail_counting: Mutex<Option<String>>,
}

impl ScriptedDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn push_reply(&self, text: impl Into<String>) {
        lock(&self.replies).push_back(Ok(text.into()));
    }

    /// Queue a failed generate call.
    pub fn push_failure(&self, message: impl Into<String>) {
        lock(&self.replies).push_back(Err(message.into()));
    }

    /// Make every count call fail (or succeed again with `None`).
    pub fn fail_counting(&self, message: Option<&str>) {
        *lock(&self.fail_counting) = message.map(ToString::to_string);
    }

    /// Histories received by `generate`, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<Vec<Content>> {
        lock(&self.requests).clone()
    }

    /// Token count this driver reports for a text.
    #[must_use]
    pub fn count_text(text: &str) -> u32 {
        u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
    }

    fn count_part(part: &Part) -> u32 {
        match part {
            Part::Text(text) => Self::count_text(text),
            Part::Media { data, .. } => u32::try_from(data.len().div_ceil(1024)).unwrap_or(u32::MAX),
        }
    }

    /// Reply used when nothing is queued: walk the child through it, never answer.
    fn default_reply(history: &[Content]) -> String {
        let question = history.last().map(Content::joined_text).unwrap_or_default();
        let question = question.lines().next().unwrap_or_default();
        format!("Let's work on \"{question}\" together, one small step at a time. Now you try the last step!")
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait::async_trait]
impl LlmDriver for ScriptedDriver {
    async fn count_tokens(&self, _config: &ModelConfig, parts: &[Part]) -> anyhow::Result<u32> {
        if let Some(message) = lock(&self.fail_counting).clone() {
            anyhow::bail!(message);
        }
        Ok(parts.iter().map(Self::count_part).sum())
    }

    async fn generate(&self, _config: &ModelConfig, history: &[Content]) -> anyhow::Result<String> {
        lock(&self.requests).push(history.to_vec());
        match lock(&self.replies).pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => anyhow::bail!(message),
            None => Ok(Self::default_reply(history)),
        }
    }

    fn measures_media(&self) -> bool {
        true
    }

    fn provider_name(&self) -> &'static str {
        "Scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    fn config() -> ModelConfig {
        ModelConfig::new("scripted", 0.5, 100)
    }

    #[tokio::test]
    async fn test_counts_words_and_kilobytes() {
        let driver = ScriptedDriver::new();
        let parts = vec![
            Part::text("one two three"),
            Part::media("image/png", vec![0u8; 1500]),
        ];
        assert_eq!(driver.count_tokens(&config(), &parts).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_queue_then_default_reply() {
        let driver = ScriptedDriver::new();
        driver.push_reply("first");
        let history = vec![Content::text(Role::User, "what is 4+4?")];

        assert_eq!(driver.generate(&config(), &history).await.unwrap(), "first");
        let fallback = driver.generate(&config(), &history).await.unwrap();
        assert!(fallback.contains("what is 4+4?"));
        assert_eq!(driver.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_counting_failure() {
        let driver = ScriptedDriver::new();
        driver.fail_counting(Some("quota exceeded"));
        let err = driver
            .count_tokens(&config(), &[Part::text("hi")])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "quota exceeded");
    }
}
