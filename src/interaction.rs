//! One interaction pass over a session.
//!
//! Every user action (sending a message, uploading files, changing a setting,
//! starting over) runs [`ChatService::run_pass`] once with the current control
//! values. The pass brings the session up to date and returns a
//! [`RenderView`] describing what to show.

use serde::Serialize;

use crate::chat::{self, ChatMode};
use crate::config::{ModelSection, RequestedSettings, SettingsError};
use crate::file_processing::UploadedFile;
use crate::ingest::{FileIngestor, FragmentKind};
use crate::llm::{ModelApi, ModelConfig, ModelHandle};
use crate::session::{Lifecycle, SessionState, Turn};

/// Control values delivered by one interaction.
#[derive(Debug, Clone, Default)]
pub struct Interaction {
    /// Selected mode; `None` keeps the session's current one.
    pub mode: Option<ChatMode>,
    /// "Start new session" was pressed.
    pub new_session: bool,
    pub files: Vec<UploadedFile>,
    pub settings: RequestedSettings,
    /// Submitted chat message, if any.
    pub message: Option<String>,
}

/// A file delivered with this pass.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedFileView {
    pub name: String,
    pub size_bytes: usize,
}

/// One row of the file contents listing.
#[derive(Debug, Clone, Serialize)]
pub struct FileContentView {
    pub file_name: String,
    pub kind: FragmentKind,
    pub mime_type: String,
    pub size_mb: f64,
}

/// Everything needed to render the page after a pass.
#[derive(Debug, Clone, Serialize)]
pub struct RenderView {
    pub session_id: String,
    pub lifecycle: Lifecycle,
    pub mode: ChatMode,
    pub transcript: Vec<Turn>,
    pub uploaded_files: Vec<UploadedFileView>,
    pub processed_file_names: Vec<String>,
    pub file_contents: Vec<FileContentView>,
    pub token_total: u64,
    pub model_config: Option<ModelConfig>,
    /// User-visible failure of the model service during this pass.
    pub error: Option<String>,
}

impl RenderView {
    /// Snapshot the session without running a pass.
    #[must_use]
    pub fn snapshot(session: &SessionState) -> Self {
        Self::build(session, Vec::new(), None)
    }

    fn build(
        session: &SessionState,
        uploaded_files: Vec<UploadedFileView>,
        error: Option<String>,
    ) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let file_contents = session
            .fragments()
            .iter()
            .map(|f| FileContentView {
                file_name: f.source_file_name.clone(),
                kind: f.kind(),
                mime_type: f.source_mime_type.clone(),
                size_mb: f.size_bytes() as f64 / (1024.0 * 1024.0),
            })
            .collect();

        Self {
            session_id: session.id().to_string(),
            lifecycle: session.lifecycle(),
            mode: session.mode,
            transcript: session.transcript().to_vec(),
            uploaded_files,
            processed_file_names: session
                .processed_file_names()
                .map(ToString::to_string)
                .collect(),
            file_contents,
            token_total: session.token_total(),
            model_config: session.model_config().cloned(),
            error,
        }
    }
}

/// Runs interaction passes against the model service.
#[derive(Debug)]
pub struct ChatService {
    api: ModelApi,
    ingestor: FileIngestor,
    models: ModelSection,
}

impl ChatService {
    #[must_use]
    pub fn new(api: ModelApi, ingestor: FileIngestor, models: ModelSection) -> Self {
        Self {
            api,
            ingestor,
            models,
        }
    }

    #[must_use]
    pub fn models(&self) -> &ModelSection {
        &self.models
    }

    /// Run one pass: validate, reset if asked, initialize, bind the model,
    /// ensure the conversation, ingest new files, then answer the message.
    ///
    /// Invalid settings are rejected before the session is touched. A model
    /// service failure stops the pass, keeps everything recorded so far and
    /// is reported in [`RenderView::error`].
    pub async fn run_pass(
        &self,
        session: &mut SessionState,
        interaction: Interaction,
    ) -> Result<RenderView, SettingsError> {
        // A reset pass starts again from the configured defaults.
        let fallback = match session.model_config() {
            Some(config) if !interaction.new_session => config.clone(),
            _ => self.models.default_config(),
        };
        let config = self.models.resolve(&interaction.settings, &fallback)?;
        let mode = interaction.mode.unwrap_or(session.mode);

        if interaction.new_session {
            session.reset();
        }
        session.mode = mode;
        session.initialize_if_absent();
        session.touch();

        let files = if mode.attaches_files() {
            interaction.files
        } else {
            if !interaction.files.is_empty() {
                tracing::debug!(
                    session_id = %session.id(),
                    count = interaction.files.len(),
                    "Ignoring uploads outside file mode"
                );
            }
            Vec::new()
        };
        let uploaded = files
            .iter()
            .map(|f| UploadedFileView {
                name: f.name.clone(),
                size_bytes: f.size(),
            })
            .collect();

        let model = chat::ensure_model(session, &self.api, &config);
        let error = self
            .advance(session, &model, mode, &files, interaction.message.as_deref())
            .await
            .err()
            .map(|e| {
                tracing::error!(
                    name: "pass.failed",
                    session_id = %session.id(),
                    error = %e,
                    "Interaction pass failed"
                );
                format!("{e:#}")
            });

        Ok(RenderView::build(session, uploaded, error))
    }

    async fn advance(
        &self,
        session: &mut SessionState,
        model: &ModelHandle,
        mode: ChatMode,
        files: &[UploadedFile],
        message: Option<&str>,
    ) -> anyhow::Result<()> {
        chat::ensure_conversation(session, model, mode).await?;

        for file in files {
            if session.is_processed(&file.name) {
                tracing::debug!(file = %file.name, "File already processed");
                continue;
            }
            let ingested = self.ingestor.ingest(file, model).await?;
            session.record_file(&file.name, ingested.fragments, ingested.token_cost);
        }

        if let Some(text) = message.map(str::trim).filter(|t| !t.is_empty()) {
            chat::submit(session, model, text, mode.attaches_files()).await?;
        }
        Ok(())
    }
}
