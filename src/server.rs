use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::config::{AppConfig, RequestedSettings, SettingsError, UploadConfig};
use crate::file_processing::UploadedFile;
use crate::ingest::FileIngestor;
use crate::interaction::{ChatService, Interaction, RenderView};
use crate::llm::{LlmSettings, ModelApi};
use crate::page;
use crate::session::{Lifecycle, SessionStore};

/// Headroom for the non-file form fields on top of the upload limit.
const FORM_OVERHEAD: usize = 1024 * 1024;

/// Build the application state from configuration and a model API.
#[must_use]
pub fn build_state(config: Arc<AppConfig>, api: ModelApi) -> AppState {
    let ingestor = FileIngestor::new(config.pdf.clone(), config.model.image_costing);
    let chat = Arc::new(ChatService::new(api, ingestor, config.model.clone()));

    let idle_timeout = match config.sessions.idle_timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    AppState {
        sessions: SessionStore::with_idle_timeout(idle_timeout),
        chat,
        config,
    }
}

/// Build the router with all routes and layers.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state
        .config
        .uploads
        .max_total_size
        .saturating_add(FORM_OVERHEAD);

    Router::new()
        // HTML pages
        .route("/", get(index_handler))
        .route("/chat/{id}", get(chat_page).post(chat_submit))
        // API routes
        .route("/api/sessions", get(api_list_sessions).post(api_create_session))
        .route(
            "/api/sessions/{id}",
            get(api_get_session).delete(api_delete_session),
        )
        .route("/api/sessions/{id}/interact", post(api_interact))
        .route("/healthz", get(healthz))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>, settings: LlmSettings) -> anyhow::Result<()> {
    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        provider = ?settings.provider,
        "LLM configuration loaded"
    );

    let api = ModelApi::from_settings(&settings);
    let state = build_state(Arc::clone(&config), api);
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Request-level failures, mapped to status codes.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    InvalidSettings(#[from] SettingsError),

    #[error("Invalid value for '{field}': {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Multipart(#[from] MultipartError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidSettings(_) | Self::InvalidField { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Multipart(e) => e.status(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(status = %status, error = %self, "Request rejected");
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Form decoding
// ─────────────────────────────────────────────────────────────────────────────

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_field<T: std::str::FromStr>(
    field: &'static str,
    value: String,
) -> Result<Option<T>, ApiError> {
    non_empty(value)
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| ApiError::InvalidField { field, value: v })
        })
        .transpose()
}

/// Decode one interaction form, enforcing the upload limits.
async fn read_interaction(
    mut multipart: Multipart,
    limits: &UploadConfig,
) -> Result<Interaction, ApiError> {
    let mut interaction = Interaction::default();
    let mut settings = RequestedSettings::default();
    let mut total = 0usize;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                // Browsers send an empty part when no file was picked.
                if file_name.is_empty() && data.is_empty() {
                    continue;
                }
                if data.len() > limits.max_file_size {
                    return Err(ApiError::PayloadTooLarge(format!(
                        "File '{file_name}' exceeds {} bytes",
                        limits.max_file_size
                    )));
                }
                total += data.len();
                if total > limits.max_total_size {
                    return Err(ApiError::PayloadTooLarge(format!(
                        "Uploads exceed {} bytes in total",
                        limits.max_total_size
                    )));
                }
                if interaction.files.len() >= limits.max_files {
                    return Err(ApiError::BadRequest(format!(
                        "At most {} files per request",
                        limits.max_files
                    )));
                }
                interaction
                    .files
                    .push(UploadedFile::new(file_name, &content_type, data.to_vec()));
            }
            "mode" => {
                if let Some(mode) = non_empty(field.text().await?) {
                    interaction.mode = Some(mode.parse().map_err(ApiError::InvalidSettings)?);
                }
            }
            "new_session" => interaction.new_session = truthy(&field.text().await?),
            "message" => interaction.message = non_empty(field.text().await?),
            "model" => settings.model = non_empty(field.text().await?),
            "temperature" => settings.temperature = parse_field("temperature", field.text().await?)?,
            "max_output_tokens" => {
                settings.max_output_tokens = parse_field("max_output_tokens", field.text().await?)?;
            }
            other => tracing::debug!(field = %other, "Ignoring unknown form field"),
        }
    }

    interaction.settings = settings;
    Ok(interaction)
}

// ─────────────────────────────────────────────────────────────────────────────
// HTML Page Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET / - Start a session and send the browser to its page.
async fn index_handler(State(state): State<AppState>) -> Redirect {
    let (id, _) = state.sessions.create();
    Redirect::to(&format!("/chat/{id}"))
}

async fn run_page_pass(
    state: &AppState,
    id: &str,
    interaction: Interaction,
) -> Result<Html<String>, ApiError> {
    let handle = state.sessions.get_or_create(id);
    let mut session = handle.lock().await;
    let view = state.chat.run_pass(&mut session, interaction).await?;
    Ok(Html(page::render(&view, state.chat.models())))
}

/// GET /chat/:id - Render the chat page.
async fn chat_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Html<String>, ApiError> {
    run_page_pass(&state, &id, Interaction::default()).await
}

/// POST /chat/:id - Apply a form submission and render the chat page.
async fn chat_submit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Html<String>, ApiError> {
    let interaction = read_interaction(multipart, &state.config.uploads).await?;
    run_page_pass(&state, &id, interaction).await
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Session summary for API responses.
///
/// A session locked by a running pass is reported as `busy` without its counters.
#[derive(Debug, Serialize)]
struct SessionInfo {
    id: String,
    busy: bool,
    #[serde(flatten)]
    stats: Option<SessionStats>,
}

#[derive(Debug, Serialize)]
struct SessionStats {
    lifecycle: Lifecycle,
    turn_count: usize,
    token_total: u64,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl SessionInfo {
    fn of(session: &crate::session::SessionState) -> Self {
        Self {
            id: session.id().to_string(),
            busy: false,
            stats: Some(SessionStats {
                lifecycle: session.lifecycle(),
                turn_count: session.transcript().len(),
                token_total: session.token_total(),
                created_at: session.created_at(),
                last_activity: session.last_activity(),
            }),
        }
    }

    fn busy(id: String) -> Self {
        Self {
            id,
            busy: true,
            stats: None,
        }
    }
}

/// GET /api/sessions - List all sessions.
async fn api_list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    let sessions = state
        .sessions
        .list_ids()
        .into_iter()
        .filter_map(|id| {
            let handle = state.sessions.get(&id)?;
            // Never wait on a session that is mid-pass.
            Some(match handle.try_lock() {
                Ok(session) => SessionInfo::of(&session),
                Err(_) => SessionInfo::busy(id),
            })
        })
        .collect();
    Json(sessions)
}

/// POST /api/sessions - Create a new session.
async fn api_create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionInfo>) {
    let (_, handle) = state.sessions.create();
    let info = SessionInfo::of(&*handle.lock().await);
    (StatusCode::CREATED, Json(info))
}

/// GET /api/sessions/:id - Current view of a session, without running a pass.
async fn api_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RenderView>, ApiError> {
    let handle = state
        .sessions
        .get(&id)
        .ok_or(ApiError::SessionNotFound(id))?;
    let session = handle.lock().await;
    Ok(Json(RenderView::snapshot(&session)))
}

/// DELETE /api/sessions/:id - Delete a session.
async fn api_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> StatusCode {
    match state.sessions.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

/// POST /api/sessions/:id/interact - Run one interaction pass.
///
/// A model service failure still returns the view, with status 502.
async fn api_interact(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<RenderView>), ApiError> {
    let handle = state
        .sessions
        .get(&id)
        .ok_or(ApiError::SessionNotFound(id))?;
    let interaction = read_interaction(multipart, &state.config.uploads).await?;

    let mut session = handle.lock().await;
    let view = state.chat.run_pass(&mut session, interaction).await?;
    let status = if view.error.is_some() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };
    Ok((status, Json(view)))
}

/// GET /healthz
async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": state.sessions.len(),
    }))
}
