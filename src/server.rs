//! HTTP API the CMS calls to trigger translation runs.

use axum::{
    body::Bytes,
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::engine::TranslationSyncEngine;
use crate::error::JobError;
use crate::reporter::RunSummary;
use crate::security::{is_authorized, API_KEY_HEADER};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TranslationSyncEngine>,
    /// Required in `x-api-key` when set
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(engine: Arc<TranslationSyncEngine>, api_key: Option<String>) -> Self {
        Self {
            engine,
            api_key: api_key.map(Arc::from),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ForceBody {
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LanguagesBody {
    #[serde(default)]
    post_ids: Option<Vec<i64>>,
    language_codes: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Maps request and job failures onto HTTP statuses; store details stay in
/// the logs.
enum ApiError {
    BadRequest(String),
    Job(JobError),
}

impl From<JobError> for ApiError {
    fn from(error: JobError) -> Self {
        Self::Job(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => error_response(StatusCode::BAD_REQUEST, message),
            ApiError::Job(JobError::Planning(e)) => {
                error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
            ApiError::Job(JobError::Store(e)) => {
                error!("Translation run failed to load content: {}", e);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/translations/posts/:id", post(translate_post))
        .route("/api/translations/all", post(translate_all))
        .route("/api/translations/missing", post(translate_missing))
        .route("/api/translations/languages", post(translate_languages))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    let authorized = is_authorized(state.api_key.as_deref(), provided);

    if !authorized {
        warn!("Rejected request to {} with missing or invalid API key", request.uri().path());
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized");
    }
    next.run(request).await
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// An empty body means `force = false`; anything else must parse.
fn force_of(body: &Bytes) -> Result<bool, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(false);
    }
    serde_json::from_slice::<ForceBody>(body)
        .map(|body| body.force)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))
}

async fn translate_post(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    body: Bytes,
) -> Result<Json<RunSummary>, ApiError> {
    let force = force_of(&body)?;
    let summary = state.engine.auto_translate_post(post_id, force).await?;
    Ok(Json(summary))
}

async fn translate_all(State(state): State<AppState>, body: Bytes) -> Result<Json<RunSummary>, ApiError> {
    let force = force_of(&body)?;
    let summary = state.engine.auto_translate_all_posts(force).await?;
    Ok(Json(summary))
}

async fn translate_missing(State(state): State<AppState>) -> Result<Json<RunSummary>, ApiError> {
    let summary = state.engine.translate_missing_languages().await?;
    Ok(Json(summary))
}

async fn translate_languages(
    State(state): State<AppState>,
    Json(body): Json<LanguagesBody>,
) -> Result<Json<RunSummary>, ApiError> {
    let summary = state
        .engine
        .force_translate_languages(body.post_ids, body.language_codes)
        .await?;
    Ok(Json(summary))
}
