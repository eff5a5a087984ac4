//! HTTP handlers for answering, session management and generation.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{error, info};

use crate::api::models::{
    error_codes, AnswerRequest, AnswerResponse, ApiError, CreateSessionRequest, GenerateRequest,
    GenerateResponse, UploadParams,
};
use crate::engine::orchestrator::AnswerError;
use crate::engine::synthesizer::SynthesisError;
use crate::engine::AnswerEngine;
use crate::error::EngineError;
use crate::metrics::METRICS;
use crate::progress::{GenerationProgress, ProgressHandle, ProgressTracker};
use crate::service::GenerationService;
use crate::store::{FileRef, StudySession};

type HandlerError = (StatusCode, Json<ApiError>);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AnswerEngine>,
    pub service: Arc<GenerationService>,
    pub progress: Arc<ProgressTracker>,
    /// When set, /api/v1/generate requires this key.
    pub api_key: Option<SecretString>,
}

fn api_error(status: StatusCode, code: &str, message: impl Into<String>) -> HandlerError {
    (status, Json(ApiError::new(code, message)))
}

fn internal_error(context: &str, error: &EngineError) -> HandlerError {
    error!("{context}: {error}");
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        error_codes::INTERNAL_ERROR,
        context,
    )
}

/// Answer a question over inline context
///
/// POST /api/v1/answer
pub async fn answer(
    State(state): State<AppState>,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, HandlerError> {
    if request.query.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            error_codes::VALIDATION_ERROR,
            "query cannot be empty",
        ));
    }

    info!(query_chars = request.query.len(), context_chars = request.context.len(), "answer request");

    let progress = ProgressHandle::disabled();
    let result = match request.generation_reserve {
        Some(reserve) => {
            state
                .engine
                .answer_with_reserve(&request.query, &request.context, reserve, &progress)
                .await
        }
        None => {
            state
                .engine
                .answer(&request.query, &request.context, &progress)
                .await
        }
    };

    match result {
        Ok(answer) => Ok(Json(AnswerResponse {
            answer: answer.text,
            chunks_planned: answer.chunks_planned,
            chunks_answered: answer.chunks_answered,
            compressed: answer.compressed,
            low_budget: answer.low_budget,
        })),
        Err(e) => Err(answer_error(e)),
    }
}

fn answer_error(error: AnswerError) -> HandlerError {
    match &error {
        AnswerError::Budget(_) => api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            error_codes::BUDGET_EXCEEDED,
            error.to_string(),
        ),
        AnswerError::Synthesis(SynthesisError::PromptTooLong { .. }) => api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            error_codes::BUDGET_EXCEEDED,
            error.to_string(),
        ),
        AnswerError::NoAnswerProduced { .. } => {
            error!("answer request produced nothing: {error}");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::GENERATION_FAILED,
                error.to_string(),
            )
        }
        _ => {
            error!("answer request failed: {error}");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::INTERNAL_ERROR,
                "text generation failed",
            )
        }
    }
}

/// Create a study session
///
/// POST /api/v1/sessions
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<StudySession>), HandlerError> {
    if request.name.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            error_codes::VALIDATION_ERROR,
            "session name cannot be empty",
        ));
    }

    match state
        .service
        .create_session(
            request.name,
            request.description,
            request.instructions,
            request.generation_list,
            request.config_map,
        )
        .await
    {
        Ok(session) => {
            info!(session_id = %session.id, "created session");
            Ok((StatusCode::CREATED, Json(session)))
        }
        Err(e) => Err(internal_error("failed to create session", &e)),
    }
}

/// Fetch a session with its files and artifacts
///
/// GET /api/v1/sessions/:session_id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<StudySession>, HandlerError> {
    match state.service.session(&session_id).await {
        Ok(session) => Ok(Json(session)),
        Err(EngineError::Store(_)) => Err(api_error(
            StatusCode::NOT_FOUND,
            error_codes::NOT_FOUND,
            format!("session {session_id} not found"),
        )),
        Err(e) => Err(internal_error("failed to load session", &e)),
    }
}

/// Attach an uploaded file to a session
///
/// POST /api/v1/sessions/:session_id/files?fileName=...
pub async fn upload_file(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<FileRef>), HandlerError> {
    if body.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            error_codes::VALIDATION_ERROR,
            "file body cannot be empty",
        ));
    }

    let content_type = params
        .content_type
        .or_else(|| {
            headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    match state
        .service
        .attach_file(&session_id, params.file_name, content_type, body)
        .await
    {
        Ok(file) => {
            info!(session_id = %session_id, file = %file.file_name, "attached file");
            Ok((StatusCode::CREATED, Json(file)))
        }
        Err(EngineError::Store(_)) => Err(api_error(
            StatusCode::NOT_FOUND,
            error_codes::NOT_FOUND,
            format!("session {session_id} not found"),
        )),
        Err(e) => Err(internal_error("failed to attach file", &e)),
    }
}

/// Start generation for a stored session
///
/// POST /api/v1/generate
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<GenerateResponse>), HandlerError> {
    if let Some(expected) = &state.api_key {
        let supplied = request.api_key.as_deref().unwrap_or("").trim();
        if supplied != expected.expose_secret().trim() {
            return Err(api_error(
                StatusCode::UNAUTHORIZED,
                error_codes::UNAUTHORIZED,
                "invalid api key",
            ));
        }
    }

    let session = match state.service.session(&request.session_id).await {
        Ok(session) => session,
        Err(EngineError::Store(_)) => {
            return Err(api_error(
                StatusCode::NOT_FOUND,
                error_codes::NOT_FOUND,
                format!("session {} not found", request.session_id),
            ))
        }
        Err(e) => return Err(internal_error("failed to load session", &e)),
    };

    info!(session_id = %session.id, "generation queued");
    let progress = state.progress.start(session.id.clone());
    let service = Arc::clone(&state.service);
    tokio::spawn(async move {
        let session_id = progress.session_id().to_string();
        if let Err(e) = service.run_session(&session_id, &progress).await {
            error!(session_id = %session_id, "session generation failed: {e}");
            progress.fail(&e.to_string());
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateResponse {
            session_id: request.session_id,
            status: "queued".to_string(),
        }),
    ))
}

/// Poll generation progress
///
/// GET /api/v1/progress/:session_id
pub async fn session_progress(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<GenerationProgress>, HandlerError> {
    match state.progress.get(&session_id) {
        Some(progress) => Ok(Json(progress)),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            error_codes::NOT_FOUND,
            format!("no generation tracked for session {session_id}"),
        )),
    }
}

/// Download a generated artifact by blob id
///
/// GET /api/v1/artifacts/:blob_id
pub async fn download_artifact(
    State(state): State<AppState>,
    Path(blob_id): Path<String>,
) -> Result<Response, HandlerError> {
    match state.service.artifact_bytes(&blob_id).await {
        Ok(bytes) => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/pdf")],
            bytes,
        )
            .into_response()),
        Err(EngineError::Store(_)) => Err(api_error(
            StatusCode::NOT_FOUND,
            error_codes::NOT_FOUND,
            format!("artifact {blob_id} not found"),
        )),
        Err(e) => Err(internal_error("failed to load artifact", &e)),
    }
}

/// Health check
///
/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Prometheus metrics export
///
/// GET /metrics
pub async fn metrics() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_prometheus(),
    )
        .into_response()
}
