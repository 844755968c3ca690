//! The four curation operations: prompt, call, normalize.
//!
//! All LLM calls go through `LlmClient`. Optional operations (clarifying and
//! follow-up questions) swallow their failures and return nothing.

use tracing::{info, warn};

use crate::curation::conversation::Limits;
use crate::curation::models::{Brief, Question, Suggestion, Transcript};
use crate::curation::normalizer::{normalize_questions, normalize_suggestions, Fallback};
use crate::curation::prompts;
use crate::errors::AppError;
use crate::llm_client::{LlmClient, QUESTION_MAX_TOKENS, SUGGESTION_MAX_TOKENS};

/// The question/answer pair an answer-specific clarification is about.
#[derive(Debug, Clone, Copy)]
pub struct ClarifyFocus<'a> {
    pub question_text: &'a str,
    pub selected_answer: &'a str,
}

#[derive(Clone)]
pub struct Curator {
    llm: LlmClient,
    limits: Limits,
}

impl Curator {
    pub fn new(llm: LlmClient, limits: Limits) -> Self {
        Self { llm, limits }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn llm(&self) -> &LlmClient {
        &self.llm
    }

    pub async fn generate_initial_questions(
        &self,
        brief: Brief<'_>,
    ) -> Result<Vec<Question>, AppError> {
        let prompt = prompts::initial_questions(&brief, self.limits.initial_questions);
        let raw = self.llm.complete(&prompt, QUESTION_MAX_TOKENS).await?;

        let mut questions = normalize_questions(&raw, Fallback::Fail)?;
        questions.truncate(self.limits.initial_questions);
        info!("Generated {} initial question(s)", questions.len());
        Ok(questions)
    }

    /// Answer-specific clarification when `focus` is given, a generic
    /// follow-up otherwise. Never fails.
    pub async fn generate_clarifying_questions(
        &self,
        brief: Brief<'_>,
        transcript: Transcript<'_>,
        focus: Option<ClarifyFocus<'_>>,
    ) -> Vec<Question> {
        let (prompt, cap) = match focus {
            Some(focus) => (
                prompts::clarifying_questions(
                    &brief,
                    focus.question_text,
                    focus.selected_answer,
                    self.limits.max_clarifying_per_answer,
                ),
                self.limits.max_clarifying_per_answer,
            ),
            None => (
                prompts::follow_up_questions(&brief, &transcript),
                self.limits.max_follow_up_questions,
            ),
        };

        let raw = match self.llm.complete(&prompt, QUESTION_MAX_TOKENS).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Follow-up question generation failed, continuing without: {e}");
                return Vec::new();
            }
        };

        // Fallback::Empty never returns an error.
        let mut questions = normalize_questions(&raw, Fallback::Empty).unwrap_or_default();
        questions.truncate(cap);
        questions
    }

    pub async fn generate_suggestions(
        &self,
        brief: Brief<'_>,
        transcript: Transcript<'_>,
    ) -> Result<Vec<Suggestion>, AppError> {
        let prompt = prompts::suggestions(&brief, &transcript);
        let raw = self.llm.complete(&prompt, SUGGESTION_MAX_TOKENS).await?;

        let suggestions = normalize_suggestions(&raw)?;
        info!(
            "Generated {} suggestion(s) from {} answer(s)",
            suggestions.len(),
            transcript.answers.len()
        );
        Ok(suggestions)
    }

    pub async fn generate_final_resume(
        &self,
        brief: Brief<'_>,
        accepted: &[Suggestion],
        transcript: Transcript<'_>,
    ) -> Result<String, AppError> {
        info!(
            "Generating resume: resume_chars={} job_chars={} suggestions={} answers={}",
            brief.resume.chars().count(),
            brief.job.chars().count(),
            accepted.len(),
            transcript.answers.len()
        );

        let prompt = prompts::final_resume(&brief, accepted, &transcript);
        let text = self
            .llm
            .complete(&prompt, self.llm.resume_max_tokens())
            .await?;

        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::InvalidModelOutput(
                "The AI returned an empty resume".to_string(),
            ));
        }
        Ok(text.to_string())
    }
}
