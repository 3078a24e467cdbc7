//! OpenAI-compatible Chat Completions API driver.
//!
//! This module implements the [`LlmDriver`] trait for `/v1/chat/completions`.
//! These providers expose no counting endpoint, so token counts come from the
//! local [`TokenService`] estimate.

use base64::Engine;
use serde::Serialize;

use super::{Content, LlmDriver, LlmSettings, ModelConfig, Part, Role, TokenService};

/// Driver for OpenAI-compatible Chat Completions APIs.
#[derive(Clone)]
pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsDriver")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ChatCompletionsDriver {
    /// Create a new Chat Completions driver with the given settings.
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }
}

#[async_trait::async_trait]
impl LlmDriver for ChatCompletionsDriver {
    async fn count_tokens(&self, _config: &ModelConfig, parts: &[Part]) -> anyhow::Result<u32> {
        let mut total = 0usize;
        for part in parts {
            if let Part::Text(text) = part {
                total += TokenService::estimate_string(text)?;
            }
        }
        Ok(u32::try_from(total).unwrap_or(u32::MAX))
    }

    async fn generate(&self, config: &ModelConfig, history: &[Content]) -> anyhow::Result<String> {
        let url = self.settings.provider.build_chat_url(&self.settings.base_url);

        let body = serde_json::json!({
            "model": config.model,
            "stream": false,
            "temperature": config.temperature,
            "max_tokens": config.max_output_tokens,
            "messages": history.iter().map(ChatMessage::from).collect::<Vec<_>>(),
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let v: serde_json::Value = resp.json().await?;
        let choice = &v["choices"][0];
        match choice["message"]["content"].as_str() {
            Some(text) if !text.is_empty() => Ok(text.to_string()),
            _ => {
                let reason = choice["finish_reason"].as_str().unwrap_or("unknown");
                anyhow::bail!("model returned an empty reply (finish reason: {reason})")
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "ChatCompletions"
    }
}

/// A chat message on the wire.
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

/// Message content - either simple text or multimodal parts.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

impl From<&Content> for ChatMessage {
    fn from(content: &Content) -> Self {
        let role = match content.role {
            Role::User => "user",
            Role::Model => "assistant",
        };

        let content = match content.parts.as_slice() {
            [Part::Text(text)] => MessageContent::Text(text.clone()),
            parts => MessageContent::Parts(
                parts
                    .iter()
                    .map(|p| match p {
                        Part::Text(text) => ContentPart::Text { text: text.clone() },
                        Part::Media { mime_type, data } => ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: format!(
                                    "data:{mime_type};base64,{}",
                                    base64::engine::general_purpose::STANDARD.encode(data)
                                ),
                            },
                        },
                    })
                    .collect(),
            ),
        };

        Self { role, content }
    }
}
