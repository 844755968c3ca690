pub mod health;

use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    extract::DefaultBodyLimit,
    routing::{get, post},
    BoxError, Router,
};
use tower::{timeout::error::Elapsed, timeout::TimeoutLayer, ServiceBuilder};

use crate::errors::AppError;

use crate::curation::handlers as curation;
use crate::input::handlers::{self as input, MAX_UPLOAD_BYTES};
use crate::sessions::handlers as sessions;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Stateless API: the client carries the conversation
        .route("/api/resume/upload", post(input::handle_upload_resume))
        .route("/api/jd/fetch", post(input::handle_fetch_job))
        .route(
            "/api/questions/generate",
            post(curation::handle_generate_questions),
        )
        .route(
            "/api/questions/followup",
            post(curation::handle_follow_up_questions),
        )
        .route(
            "/api/suggestions/generate",
            post(curation::handle_generate_suggestions),
        )
        .route("/api/generate", post(curation::handle_generate_resume))
        // Session API: the server drives the conversation
        .route("/api/sessions", post(sessions::handle_create_session))
        .route(
            "/api/sessions/:id",
            get(sessions::handle_get_session).delete(sessions::handle_delete_session),
        )
        .route("/api/sessions/:id/resume", post(sessions::handle_session_resume))
        .route("/api/sessions/:id/job", post(sessions::handle_session_job))
        .route(
            "/api/sessions/:id/questions",
            post(sessions::handle_session_questions),
        )
        .route("/api/sessions/:id/answers", post(sessions::handle_session_answer))
        .route("/api/sessions/:id/skip", post(sessions::handle_session_skip))
        .route(
            "/api/sessions/:id/suggestions",
            post(sessions::handle_session_suggestions),
        )
        .route(
            "/api/sessions/:id/suggestions/:sid/accept",
            post(sessions::handle_accept_suggestion),
        )
        .route(
            "/api/sessions/:id/suggestions/:sid/reject",
            post(sessions::handle_reject_suggestion),
        )
        .route(
            "/api/sessions/:id/generate",
            post(sessions::handle_session_generate),
        )
        .route("/api/sessions/:id/back", post(sessions::handle_session_back))
        .route("/api/sessions/:id/advance", post(sessions::handle_session_advance))
        .route("/api/sessions/:id/reset", post(sessions::handle_session_reset))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Caps whole requests at `timeout`; an elapsed request gets the regular
/// error envelope.
pub fn with_request_timeout(router: Router, timeout: Duration) -> Router {
    let secs = timeout.as_secs();
    router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(move |err: BoxError| async move {
                if err.is::<Elapsed>() {
                    AppError::RequestTimeout(secs)
                } else {
                    AppError::Internal(anyhow::anyhow!(err.to_string()))
                }
            }))
            .layer(TimeoutLayer::new(timeout)),
    )
}
