//! Route configuration

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers::{self, AppState};

/// Build the application router
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/api/v1/answer", post(handlers::answer))
        .route("/api/v1/sessions", post(handlers::create_session))
        .route("/api/v1/sessions/:session_id", get(handlers::get_session))
        .route(
            "/api/v1/sessions/:session_id/files",
            post(handlers::upload_file),
        )
        .route("/api/v1/generate", post(handlers::generate))
        .route(
            "/api/v1/progress/:session_id",
            get(handlers::session_progress),
        )
        .route(
            "/api/v1/artifacts/:blob_id",
            get(handlers::download_artifact),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(max_body_bytes))
                .layer(RequestBodyLimitLayer::new(max_body_bytes)),
        )
        .with_state(state)
}
