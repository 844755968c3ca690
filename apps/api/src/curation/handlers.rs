//! Stateless curation endpoints. The client carries the conversation and
//! sends whatever each step needs.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::curation::curator::ClarifyFocus;
use crate::curation::models::{Answer, Brief, Question, Suggestion, Transcript};
use crate::errors::AppError;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionsRequest {
    pub resume: Option<String>,
    pub job_description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpRequest {
    pub resume: Option<String>,
    pub job_description: Option<String>,
    pub answers: Option<Vec<Answer>>,
    /// Lets the prompt quote question text instead of ids.
    #[serde(default)]
    pub questions: Vec<Question>,
    pub question_text: Option<String>,
    pub selected_answer: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionsRequest {
    pub resume: Option<String>,
    pub job_description: Option<String>,
    pub answers: Option<Vec<Answer>>,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub resume: Option<String>,
    pub job_description: Option<String>,
    /// Already filtered to the accepted ones.
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    #[serde(default)]
    pub answers: Vec<Answer>,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Serialize)]
pub struct QuestionsResponse {
    pub questions: Vec<Question>,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub resume: String,
    pub suggestions_applied: usize,
}

fn brief<'a>(
    resume: &'a Option<String>,
    job: &'a Option<String>,
    message: &str,
) -> Result<Brief<'a>, AppError> {
    match (non_blank(resume), non_blank(job)) {
        (Some(resume), Some(job)) => Ok(Brief { resume, job }),
        _ => Err(AppError::Validation(message.to_string())),
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

const BRIEF_REQUIRED: &str = "Resume and job description are required";
const ANSWERS_REQUIRED: &str = "Resume, job description, and answers are required";

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/questions/generate
pub async fn handle_generate_questions(
    State(state): State<AppState>,
    Json(request): Json<QuestionsRequest>,
) -> Result<Json<QuestionsResponse>, AppError> {
    let brief = brief(&request.resume, &request.job_description, BRIEF_REQUIRED)?;
    let questions = state.curator.generate_initial_questions(brief).await?;
    Ok(Json(QuestionsResponse { questions }))
}

/// POST /api/questions/followup
///
/// Answer-specific when both `questionText` and `selectedAnswer` are given.
/// Always succeeds once the request is valid; model failures yield no questions.
pub async fn handle_follow_up_questions(
    State(state): State<AppState>,
    Json(request): Json<FollowUpRequest>,
) -> Result<Json<QuestionsResponse>, AppError> {
    let brief = brief(&request.resume, &request.job_description, ANSWERS_REQUIRED)?;
    let answers = request
        .answers
        .as_deref()
        .ok_or_else(|| AppError::Validation(ANSWERS_REQUIRED.to_string()))?;

    let focus = match (
        non_blank(&request.question_text),
        non_blank(&request.selected_answer),
    ) {
        (Some(question_text), Some(selected_answer)) => Some(ClarifyFocus {
            question_text,
            selected_answer,
        }),
        _ => None,
    };

    let questions = state
        .curator
        .generate_clarifying_questions(brief, Transcript::new(&request.questions, answers), focus)
        .await;
    Ok(Json(QuestionsResponse { questions }))
}

/// POST /api/suggestions/generate
pub async fn handle_generate_suggestions(
    State(state): State<AppState>,
    Json(request): Json<SuggestionsRequest>,
) -> Result<Json<SuggestionsResponse>, AppError> {
    let brief = brief(&request.resume, &request.job_description, ANSWERS_REQUIRED)?;
    let answers = request
        .answers
        .as_deref()
        .ok_or_else(|| AppError::Validation(ANSWERS_REQUIRED.to_string()))?;

    let suggestions = state
        .curator
        .generate_suggestions(brief, Transcript::new(&request.questions, answers))
        .await?;
    Ok(Json(SuggestionsResponse { suggestions }))
}

/// POST /api/generate
pub async fn handle_generate_resume(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    let brief = brief(&request.resume, &request.job_description, BRIEF_REQUIRED)?;

    let resume = state
        .curator
        .generate_final_resume(
            brief,
            &request.suggestions,
            Transcript::new(&request.questions, &request.answers),
        )
        .await?;

    Ok(Json(GenerateResponse {
        resume,
        suggestions_applied: request.suggestions.len(),
    }))
}
