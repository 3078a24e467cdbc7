//! Model handles and conversations bound to a generation configuration.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    ChatCompletionsDriver, Content, GeminiDriver, LlmDriver, LlmSettings, Part, Provider, Role,
    ScriptedDriver,
};

/// Generation settings a conversation is bound to.
///
/// Equality is field-wise; any difference means a fresh model and conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier (e.g., `gemini-2.0-flash`).
    pub model: String,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f32,
    /// Upper bound on generated tokens per reply.
    pub max_output_tokens: u32,
}

impl ModelConfig {
    #[must_use]
    pub fn new(model: impl Into<String>, temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            model: model.into(),
            temperature,
            max_output_tokens,
        }
    }
}

/// Entry point to the hosted model service.
#[derive(Clone)]
pub struct ModelApi {
    driver: Arc<dyn LlmDriver>,
}

impl std::fmt::Debug for ModelApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelApi")
            .field("provider", &self.driver.provider_name())
            .finish()
    }
}

impl ModelApi {
    /// Wrap an existing driver.
    #[must_use]
    pub fn new(driver: Arc<dyn LlmDriver>) -> Self {
        Self { driver }
    }

    /// Pick the driver for the configured provider.
    #[must_use]
    pub fn from_settings(settings: &LlmSettings) -> Self {
        let driver: Arc<dyn LlmDriver> = match settings.provider {
            Provider::Gemini => Arc::new(GeminiDriver::new(settings.clone())),
            Provider::Scripted => Arc::new(ScriptedDriver::new()),
            Provider::OpenAI | Provider::OpenRouter | Provider::Groq | Provider::Generic => {
                Arc::new(ChatCompletionsDriver::new(settings.clone()))
            }
        };
        Self { driver }
    }

    /// Build a model handle bound to `config`.
    #[must_use]
    pub fn create_model(&self, config: ModelConfig) -> ModelHandle {
        let handle = ModelHandle {
            id: Uuid::new_v4(),
            config,
            driver: Arc::clone(&self.driver),
        };
        tracing::info!(
            name: "model.created",
            model_id = %handle.id,
            model = %handle.config.model,
            temperature = handle.config.temperature,
            max_output_tokens = handle.config.max_output_tokens,
            provider = self.driver.provider_name(),
            "Model handle created"
        );
        handle
    }
}

/// A model bound to one [`ModelConfig`].
#[derive(Clone)]
pub struct ModelHandle {
    id: Uuid,
    config: ModelConfig,
    driver: Arc<dyn LlmDriver>,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish()
    }
}

impl ModelHandle {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Count tokens of a text.
    pub async fn count_tokens(&self, text: &str) -> anyhow::Result<u32> {
        self.driver
            .count_tokens(&self.config, &[Part::text(text)])
            .await
    }

    /// Count tokens of arbitrary parts, media included.
    pub async fn count_parts(&self, parts: &[Part]) -> anyhow::Result<u32> {
        self.driver.count_tokens(&self.config, parts).await
    }

    /// Whether media parts can be counted for real.
    #[must_use]
    pub fn measures_media(&self) -> bool {
        self.driver.measures_media()
    }

    /// Start a conversation seeded with `history`.
    #[must_use]
    pub fn start_conversation(&self, history: Vec<Content>) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            model: self.clone(),
            history,
        }
    }
}

/// An ongoing multi-turn context bound to one model.
#[derive(Debug, Clone)]
pub struct Conversation {
    id: Uuid,
    model: ModelHandle,
    history: Vec<Content>,
}

impl Conversation {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    #[must_use]
    pub fn history(&self) -> &[Content] {
        &self.history
    }

    /// Send a user turn and return the reply text.
    ///
    /// History is only extended when the service answers, so a failed call
    /// leaves the conversation exactly as it was.
    pub async fn send_message(&mut self, parts: Vec<Part>) -> anyhow::Result<String> {
        let mut request = self.history.clone();
        request.push(Content {
            role: Role::User,
            parts,
        });

        let reply = self
            .model
            .driver
            .generate(&self.model.config, &request)
            .await?;

        tracing::debug!(
            conversation_id = %self.id,
            history_len = request.len(),
            reply_length = reply.len(),
            "Model replied"
        );

        request.push(Content::text(Role::Model, reply.clone()));
        self.history = request;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_with(driver: &Arc<ScriptedDriver>) -> ModelApi {
        ModelApi::new(Arc::clone(driver) as Arc<dyn LlmDriver>)
    }

    #[test]
    fn test_config_equality_is_field_wise() {
        let base = ModelConfig::new("gemini-2.0-flash", 0.55, 8192);
        assert_eq!(base, ModelConfig::new("gemini-2.0-flash", 0.55, 8192));
        assert_ne!(base, ModelConfig::new("gemini-2.0-flash", 0.56, 8192));
        assert_ne!(base, ModelConfig::new("gemini-2.0-flash", 0.55, 8142));
        assert_ne!(base, ModelConfig::new("gemini-1.5-pro", 0.55, 8192));
    }

    #[tokio::test]
    async fn test_send_message_extends_history() {
        let driver = Arc::new(ScriptedDriver::new());
        driver.push_reply("Now you try!");
        let model = api_with(&driver).create_model(ModelConfig::new("m", 0.5, 100));

        let mut conversation = model.start_conversation(vec![
            Content::text(Role::User, "instruction"),
            Content::text(Role::Model, "greeting"),
        ]);
        let reply = conversation
            .send_message(vec![Part::text("what is 2+2?")])
            .await
            .unwrap();

        assert_eq!(reply, "Now you try!");
        assert_eq!(conversation.history().len(), 4);
        assert_eq!(conversation.history()[3].role, Role::Model);
    }

    #[tokio::test]
    async fn test_failed_send_keeps_history() {
        let driver = Arc::new(ScriptedDriver::new());
        driver.push_failure("service unavailable");
        let model = api_with(&driver).create_model(ModelConfig::new("m", 0.5, 100));

        let mut conversation = model.start_conversation(vec![Content::text(Role::User, "hi")]);
        let result = conversation.send_message(vec![Part::text("again")]).await;

        assert!(result.is_err());
        assert_eq!(conversation.history().len(), 1);
    }
}
