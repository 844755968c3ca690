//! Axum route handlers for the session API.
//!
//! Every mutating route returns the full conversation state after the action,
//! including whatever the model produced on the way.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::curation::conversation::ConversationState;
use crate::curation::models::JobDescription;
use crate::errors::AppError;
use crate::input::handlers::{fetch_job, read_resume_upload};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request types
// ────────────────────────────────────────────────────────────────────────────

/// Either a URL to fetch or the posting text pasted directly.
#[derive(Debug, Deserialize)]
pub struct JobRequest {
    pub url: Option<String>,
    pub text: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub question_id: String,
    pub answer: String,
}

type StateResult = Result<Json<ConversationState>, AppError>;

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<ConversationState>) {
    let created = state.sessions.create(&state.engine).await;
    (StatusCode::CREATED, Json(created))
}

/// GET /api/sessions/:id
pub async fn handle_get_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> StateResult {
    let session = state.sessions.get(id).await?;
    let snapshot = session.lock().await.clone();
    Ok(Json(snapshot))
}

/// DELETE /api/sessions/:id
pub async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.sessions.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/sessions/:id/resume (multipart `file`)
pub async fn handle_session_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> StateResult {
    let session = state.sessions.get(id).await?;
    let resume = read_resume_upload(multipart).await?;
    Ok(Json(state.engine.attach_resume(&session, resume).await?))
}

/// POST /api/sessions/:id/job
///
/// Pasted text wins over a URL when both are present.
pub async fn handle_session_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<JobRequest>,
) -> StateResult {
    let session = state.sessions.get(id).await?;

    let pasted = request.text.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let job = match pasted {
        Some(text) => JobDescription {
            url: request.url.clone().unwrap_or_default(),
            text: text.to_string(),
            title: request.title.clone(),
            company: request.company.clone(),
            fetched_at: Utc::now(),
        },
        None if request.url.is_some() => fetch_job(&state, request.url.as_deref()).await?,
        None => {
            return Err(AppError::Validation(
                "Provide a job posting url or its text".to_string(),
            ))
        }
    };

    Ok(Json(state.engine.attach_job_description(&session, job).await?))
}

/// POST /api/sessions/:id/questions
pub async fn handle_session_questions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> StateResult {
    let session = state.sessions.get(id).await?;
    Ok(Json(state.engine.regenerate_questions(&session).await?))
}

/// POST /api/sessions/:id/answers
pub async fn handle_session_answer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AnswerRequest>,
) -> StateResult {
    let session = state.sessions.get(id).await?;
    Ok(Json(
        state
            .engine
            .submit_answer(&session, &request.question_id, &request.answer)
            .await?,
    ))
}

/// POST /api/sessions/:id/skip
pub async fn handle_session_skip(State(state): State<AppState>, Path(id): Path<Uuid>) -> StateResult {
    let session = state.sessions.get(id).await?;
    Ok(Json(state.engine.skip_to_suggestions(&session).await?))
}

/// POST /api/sessions/:id/suggestions
pub async fn handle_session_suggestions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> StateResult {
    let session = state.sessions.get(id).await?;
    Ok(Json(state.engine.regenerate_suggestions(&session).await?))
}

/// POST /api/sessions/:id/suggestions/:sid/accept
pub async fn handle_accept_suggestion(
    State(state): State<AppState>,
    Path((id, suggestion_id)): Path<(Uuid, String)>,
) -> StateResult {
    let session = state.sessions.get(id).await?;
    Ok(Json(
        state
            .engine
            .accept_suggestion(&session, &suggestion_id)
            .await?,
    ))
}

/// POST /api/sessions/:id/suggestions/:sid/reject
pub async fn handle_reject_suggestion(
    State(state): State<AppState>,
    Path((id, suggestion_id)): Path<(Uuid, String)>,
) -> StateResult {
    let session = state.sessions.get(id).await?;
    Ok(Json(
        state
            .engine
            .reject_suggestion(&session, &suggestion_id)
            .await?,
    ))
}

/// POST /api/sessions/:id/generate
pub async fn handle_session_generate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> StateResult {
    let session = state.sessions.get(id).await?;
    Ok(Json(state.engine.generate(&session).await?))
}

/// POST /api/sessions/:id/back
pub async fn handle_session_back(State(state): State<AppState>, Path(id): Path<Uuid>) -> StateResult {
    let session = state.sessions.get(id).await?;
    Ok(Json(state.engine.back(&session).await?))
}

/// POST /api/sessions/:id/advance
pub async fn handle_session_advance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> StateResult {
    let session = state.sessions.get(id).await?;
    Ok(Json(state.engine.advance(&session).await?))
}

/// POST /api/sessions/:id/reset
pub async fn handle_session_reset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> StateResult {
    let session = state.sessions.get(id).await?;
    Ok(Json(state.engine.reset(&session).await))
}
