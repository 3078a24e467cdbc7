//! Gemini REST API driver.
//!
//! Implements [`LlmDriver`] against `models/{model}:generateContent` and
//! `models/{model}:countTokens`. Media parts travel as base64 `inlineData`.

use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{Content, LlmDriver, LlmSettings, ModelConfig, Part, Provider, Role};

/// Driver for the Gemini API.
#[derive(Clone)]
pub struct GeminiDriver {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for GeminiDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiDriver")
            .field("settings", &self.settings)
            .finish()
    }
}

impl GeminiDriver {
    /// Create a new Gemini driver with the given settings.
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned + Send>(
        &self,
        model: &str,
        method: &str,
        body: &B,
    ) -> anyhow::Result<R> {
        let url = Provider::build_gemini_url(&self.settings.base_url, model, method);
        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.settings.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error ({status}): {}", error_message(&text));
        }

        Ok(resp.json::<R>().await?)
    }
}

#[async_trait::async_trait]
impl LlmDriver for GeminiDriver {
    async fn count_tokens(&self, config: &ModelConfig, parts: &[Part]) -> anyhow::Result<u32> {
        let body = CountTokensRequest {
            contents: vec![WireContent::from_parts(Role::User, parts)],
        };
        let resp: CountTokensResponse = self.post(&config.model, "countTokens", &body).await?;
        Ok(resp.total_tokens)
    }

    async fn generate(&self, config: &ModelConfig, history: &[Content]) -> anyhow::Result<String> {
        let body = GenerateRequest {
            contents: history.iter().map(WireContent::from_content).collect(),
            generation_config: GenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
            },
        };

        tracing::debug!(
            model = %config.model,
            turns = body.contents.len(),
            "Sending generateContent request"
        );

        let resp: GenerateResponse = self.post(&config.model, "generateContent", &body).await?;
        resp.into_text()
    }

    fn measures_media(&self) -> bool {
        true
    }

    fn provider_name(&self) -> &'static str {
        "Gemini"
    }
}

/// Pull `error.message` out of a Gemini error body, or fall back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(ToString::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<WireContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct CountTokensRequest {
    contents: Vec<WireContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountTokensResponse {
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<WirePart>,
}

impl WireContent {
    fn from_content(content: &Content) -> Self {
        Self::from_parts(content.role, &content.parts)
    }

    fn from_parts(role: Role, parts: &[Part]) -> Self {
        let role = match role {
            Role::User => "user",
            Role::Model => "model",
        };
        Self {
            role: role.to_string(),
            parts: parts.iter().map(WirePart::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum WirePart {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl From<&Part> for WirePart {
    fn from(part: &Part) -> Self {
        match part {
            Part::Text(text) => Self::Text { text: text.clone() },
            Part::Media { mime_type, data } => Self::Inline {
                inline_data: InlineData {
                    mime_type: mime_type.clone(),
                    data: base64::engine::general_purpose::STANDARD.encode(data),
                },
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateResponse {
    fn into_text(self) -> anyhow::Result<String> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            let reason = self
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "unknown".to_string());
            anyhow::bail!("Gemini returned no candidates (block reason: {reason})");
        };

        let text: String = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| match p {
                WirePart::Text { text } => Some(text),
                WirePart::Inline { .. } => None,
            })
            .collect();

        if text.is_empty() {
            let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
            anyhow::bail!("Gemini returned an empty reply (finish reason: {reason})");
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_request_body_shape() {
        let history = vec![
            Content::text(Role::User, "instruction"),
            Content::text(Role::Model, "greeting"),
            Content {
                role: Role::User,
                parts: vec![
                    Part::text("what is this?"),
                    Part::media("image/png", Arc::<[u8]>::from(&b"\x89PNG"[..])),
                ],
            },
        ];
        let body = GenerateRequest {
            contents: history.iter().map(WireContent::from_content).collect(),
            generation_config: GenerationConfig {
                temperature: 0.5,
                max_output_tokens: 256,
            },
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][2]["parts"][0]["text"], "what is this?");
        assert_eq!(
            json["contents"][2]["parts"][1]["inlineData"]["mimeType"],
            "image/png"
        );
        assert_eq!(json["contents"][2]["parts"][1]["inlineData"]["data"], "iVBORw==");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn test_reply_text_is_concatenated() {
        let resp: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Let's "},{"text":"count!"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(resp.into_text().unwrap(), "Let's count!");
    }

    #[test]
    fn test_blocked_prompt_is_an_error() {
        let resp: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        let err = resp.into_text().unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_count_tokens_response() {
        let resp: CountTokensResponse = serde_json::from_str(r#"{"totalTokens": 42}"#).unwrap();
        assert_eq!(resp.total_tokens, 42);
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(error_message(body), "API key not valid.");
        assert_eq!(error_message("bad gateway\n"), "bad gateway");
    }
}
