use crate::llm::provider::GEMINI_BASE_URL;
use crate::llm::{LlmSettings, ModelConfig, Provider};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;

/// Environment variable holding the model API credential.
pub const API_KEY_VAR: &str = "GOOGLE_API_KEY";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelSection,
    pub uploads: UploadConfig,
    pub sessions: SessionConfig,
    pub pdf: PdfConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// How image fragments are costed.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageCosting {
    /// Count a fixed `Placeholder for <name>` string.
    #[default]
    Placeholder,
    /// Ask the service to count the media part itself, when it can.
    Measured,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelSection {
    pub allowed_models: Vec<String>,
    pub default_model: String,
    pub default_temperature: f32,
    pub default_max_output_tokens: u32,
    pub min_output_tokens: u32,
    pub max_output_tokens: u32,
    pub image_costing: ImageCosting,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    /// Maximum size of one file in bytes.
    pub max_file_size: usize,
    /// Maximum size of all files in one interaction.
    pub max_total_size: usize,
    /// Maximum number of files per interaction.
    pub max_files: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Idle sessions older than this are dropped; 0 keeps them forever.
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PdfConfig {
    pub ocr_enabled: bool,
    pub ocr_backend: String,
    pub ocr_language: String,
    pub force_ocr: bool,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            ocr_enabled: false,
            ocr_backend: "tesseract".to_string(),
            ocr_language: "eng".to_string(),
            force_ocr: false,
        }
    }
}

/// Model settings as delivered by one interaction; unset fields fall back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestedSettings {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

/// Rejected model settings.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SettingsError {
    #[error("Unknown model '{0}'")]
    UnknownModel(String),
    #[error("Temperature {0} is outside 0.0..=1.0")]
    TemperatureOutOfRange(f32),
    #[error("Max output tokens {value} is outside {min}..={max}")]
    MaxTokensOutOfRange { value: u32, min: u32, max: u32 },
    #[error("Unknown chat mode '{0}'")]
    UnknownMode(String),
}

impl ModelSection {
    /// The configuration a fresh session starts with.
    #[must_use]
    pub fn default_config(&self) -> ModelConfig {
        ModelConfig::new(
            self.default_model.clone(),
            self.default_temperature,
            self.default_max_output_tokens,
        )
    }

    /// Validate requested settings, filling gaps from `fallback`.
    pub fn resolve(
        &self,
        requested: &RequestedSettings,
        fallback: &ModelConfig,
    ) -> Result<ModelConfig, SettingsError> {
        let model = requested
            .model
            .clone()
            .unwrap_or_else(|| fallback.model.clone());
        if !self.allowed_models.iter().any(|m| *m == model) {
            return Err(SettingsError::UnknownModel(model));
        }

        let temperature = requested.temperature.unwrap_or(fallback.temperature);
        if !(0.0..=1.0).contains(&temperature) {
            return Err(SettingsError::TemperatureOutOfRange(temperature));
        }

        let max_output_tokens = requested
            .max_output_tokens
            .unwrap_or(fallback.max_output_tokens);
        if !(self.min_output_tokens..=self.max_output_tokens).contains(&max_output_tokens) {
            return Err(SettingsError::MaxTokensOutOfRange {
                value: max_output_tokens,
                min: self.min_output_tokens,
                max: self.max_output_tokens,
            });
        }

        Ok(ModelConfig::new(model, temperature, max_output_tokens))
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 8501)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("model.allowed_models", vec!["gemini-2.0-flash"])?
            .set_default("model.default_model", "gemini-2.0-flash")?
            .set_default("model.default_temperature", 0.55)?
            .set_default("model.default_max_output_tokens", 8192)?
            .set_default("model.min_output_tokens", 50)?
            .set_default("model.max_output_tokens", 8192)?
            .set_default("model.image_costing", "placeholder")?
            .set_default("uploads.max_file_size", 50 * 1024 * 1024)?
            .set_default("uploads.max_total_size", 100 * 1024 * 1024)?
            .set_default("uploads.max_files", 10)?
            .set_default("sessions.idle_timeout_secs", 4 * 60 * 60)?
            .set_default("pdf.ocr_enabled", false)?
            .set_default("pdf.ocr_backend", "tesseract")?
            .set_default("pdf.ocr_language", "eng")?
            .set_default("pdf.force_ocr", false)?;

        // 2. Config file: explicit path must exist, ./config.yaml is optional
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // 3. Environment variables (prefixed with TUTOR_), e.g. TUTOR_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("TUTOR")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("model.allowed_models")
                .try_parsing(true),
        );

        // 4. CLI flags (and their plain env aliases) win
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        let m = &self.model;
        if m.allowed_models.is_empty() {
            return Err(config::ConfigError::Message(
                "model.allowed_models cannot be empty".to_string(),
            ));
        }
        m.resolve(&RequestedSettings::default(), &m.default_config())
            .map(|_| ())
            .map_err(|e| config::ConfigError::Message(format!("invalid model defaults: {e}")))
    }
}

pub fn load_llm_settings() -> Result<LlmSettings, String> {
    let api_key = env::var(API_KEY_VAR)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| format!("Please set the {API_KEY_VAR} environment variable."))?;

    let base_url = env::var("LLM_BASE_URL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| GEMINI_BASE_URL.to_string());

    // Auto-detect provider from base URL unless named explicitly
    let provider = match env::var("LLM_PROVIDER") {
        Ok(name) if !name.trim().is_empty() => {
            Provider::parse(&name).ok_or_else(|| format!("Unknown LLM_PROVIDER: {name}"))?
        }
        _ => Provider::detect_from_url(&base_url),
    };

    Ok(LlmSettings {
        base_url,
        api_key,
        provider,
    })
}
