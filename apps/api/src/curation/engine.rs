//! Drives a session's `ConversationState` through model calls.
//!
//! A session lock is never held across an LLM call: inputs and the revision
//! are snapshotted, the lock is released, and the result is applied only if
//! the revision is unchanged. Late results are discarded.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::curation::conversation::{
    ConversationState, CurationInputs, NextStep, Phase, QuestionStage,
};
use crate::curation::curator::{ClarifyFocus, Curator};
use crate::curation::models::{JobDescription, Question, Resume};
use crate::errors::AppError;

pub type Session = Arc<Mutex<ConversationState>>;

#[derive(Clone)]
pub struct ConversationEngine {
    curator: Curator,
}

impl ConversationEngine {
    pub fn new(curator: Curator) -> Self {
        Self { curator }
    }

    pub fn new_session(&self) -> Session {
        Arc::new(Mutex::new(ConversationState::new(
            uuid::Uuid::new_v4(),
            self.curator.limits(),
        )))
    }

    pub async fn attach_resume(
        &self,
        session: &Session,
        resume: Resume,
    ) -> Result<ConversationState, AppError> {
        let mut state = session.lock().await;
        state.attach_resume(resume)?;
        Ok(state.clone())
    }

    /// Stores the job description and requests the initial questions.
    pub async fn attach_job_description(
        &self,
        session: &Session,
        job: JobDescription,
    ) -> Result<ConversationState, AppError> {
        session.lock().await.attach_job_description(job)?;
        self.drive(session).await
    }

    pub async fn regenerate_questions(&self, session: &Session) -> Result<ConversationState, AppError> {
        session.lock().await.reset_questions()?;
        self.drive(session).await
    }

    /// Records an answer and, once the current round is complete, moves the
    /// questions phase along.
    pub async fn submit_answer(
        &self,
        session: &Session,
        question_id: &str,
        answer: &str,
    ) -> Result<ConversationState, AppError> {
        session.lock().await.record_answer(question_id, answer)?;
        self.drive(session).await
    }

    pub async fn skip_to_suggestions(&self, session: &Session) -> Result<ConversationState, AppError> {
        session.lock().await.skip_to_suggestions()?;
        self.request_suggestions(session).await
    }

    pub async fn regenerate_suggestions(
        &self,
        session: &Session,
    ) -> Result<ConversationState, AppError> {
        {
            let state = session.lock().await;
            if state.phase() != Phase::Suggestions {
                return Err(AppError::InvalidTransition(format!(
                    "Cannot regenerate suggestions during the {} phase",
                    state.phase()
                )));
            }
        }
        self.request_suggestions(session).await
    }

    pub async fn accept_suggestion(
        &self,
        session: &Session,
        suggestion_id: &str,
    ) -> Result<ConversationState, AppError> {
        let mut state = session.lock().await;
        state.accept_suggestion(suggestion_id)?;
        Ok(state.clone())
    }

    pub async fn reject_suggestion(
        &self,
        session: &Session,
        suggestion_id: &str,
    ) -> Result<ConversationState, AppError> {
        let mut state = session.lock().await;
        state.reject_suggestion(suggestion_id)?;
        Ok(state.clone())
    }

    /// Enters `generate` with the accepted suggestions and synthesizes the résumé.
    pub async fn generate(&self, session: &Session) -> Result<ConversationState, AppError> {
        let (inputs, accepted, revision) = {
            let mut state = session.lock().await;
            state.enter_generate()?;
            (state.inputs()?, state.accepted_suggestions(), state.revision())
        };

        let text = self
            .curator
            .generate_final_resume(inputs.brief(), &accepted, inputs.transcript())
            .await?;

        let mut state = session.lock().await;
        if !is_current(&state, revision, "final resume") {
            return Ok(state.clone());
        }
        state.set_final_resume(text)?;
        Ok(state.clone())
    }

    pub async fn back(&self, session: &Session) -> Result<ConversationState, AppError> {
        let mut state = session.lock().await;
        state.back()?;
        Ok(state.clone())
    }

    /// Moves forward one phase with retained data, generating whatever that
    /// phase is missing.
    ///
    /// In `questions` with a model round still owed (an earlier request was
    /// cut off after its answer was stored), the round is run instead.
    pub async fn advance(&self, session: &Session) -> Result<ConversationState, AppError> {
        let pending = !matches!(
            session.lock().await.next_step(),
            NextStep::Idle | NextStep::AwaitAnswers
        );
        if pending {
            return self.drive(session).await;
        }

        let (phase, needs_suggestions, needs_resume) = {
            let mut state = session.lock().await;
            let phase = state.advance()?;
            (
                phase,
                state.suggestions().is_empty(),
                state.final_resume().is_none(),
            )
        };

        match phase {
            Phase::Questions => self.drive(session).await,
            Phase::Suggestions if needs_suggestions => self.request_suggestions(session).await,
            Phase::Generate if needs_resume => self.generate(session).await,
            _ => Ok(session.lock().await.clone()),
        }
    }

    pub async fn reset(&self, session: &Session) -> ConversationState {
        let mut state = session.lock().await;
        state.start_over();
        state.clone()
    }

    /// Runs model calls until the conversation needs the user again.
    ///
    /// Every iteration either returns or applies a transition that sets new
    /// questions, opens a round, or leaves the questions phase, so the loop
    /// calls the model at most `max_follow_up_rounds + 1` times between user
    /// actions.
    async fn drive(&self, session: &Session) -> Result<ConversationState, AppError> {
        loop {
            let (step, inputs, revision) = {
                let state = session.lock().await;
                match state.next_step() {
                    NextStep::Idle | NextStep::AwaitAnswers => return Ok(state.clone()),
                    step => (step, state.inputs()?, state.revision()),
                }
            };

            let round = match step {
                NextStep::RequestInitialQuestions => {
                    let questions = self
                        .curator
                        .generate_initial_questions(inputs.brief())
                        .await?;
                    if questions.is_empty() {
                        return Err(AppError::InvalidModelOutput(
                            "No questions were generated".to_string(),
                        ));
                    }

                    let mut state = session.lock().await;
                    if !is_current(&state, revision, "initial questions") {
                        return Ok(state.clone());
                    }
                    state.set_initial_questions(questions)?;
                    continue;
                }
                NextStep::RequestClarifying(targets) => {
                    let mut round = Vec::new();
                    for target in &targets {
                        let focus = ClarifyFocus {
                            question_text: &target.question_text,
                            selected_answer: &target.selected_answer,
                        };
                        round.extend(
                            self.curator
                                .generate_clarifying_questions(
                                    inputs.brief(),
                                    inputs.transcript(),
                                    Some(focus),
                                )
                                .await,
                        );
                    }
                    info!(
                        "{} clarifying question(s) for {} answer(s)",
                        round.len(),
                        targets.len()
                    );
                    (round, QuestionStage::Clarifying)
                }
                NextStep::RequestFollowUp => (self.follow_up(&inputs).await, QuestionStage::FollowUp),
                NextStep::EnterSuggestions => {
                    session.lock().await.enter_suggestions()?;
                    return self.request_suggestions(session).await;
                }
                NextStep::Idle | NextStep::AwaitAnswers => return Ok(session.lock().await.clone()),
            };

            let (questions, stage) = round;
            let mut state = session.lock().await;
            if !is_current(&state, revision, "follow-up questions") {
                return Ok(state.clone());
            }
            state.add_round(questions, stage)?;
            if state.phase() == Phase::Suggestions {
                drop(state);
                return self.request_suggestions(session).await;
            }
        }
    }

    async fn follow_up(&self, inputs: &CurationInputs) -> Vec<Question> {
        self.curator
            .generate_clarifying_questions(inputs.brief(), inputs.transcript(), None)
            .await
    }

    async fn request_suggestions(&self, session: &Session) -> Result<ConversationState, AppError> {
        let (inputs, revision) = {
            let state = session.lock().await;
            (state.inputs()?, state.revision())
        };

        let suggestions = self
            .curator
            .generate_suggestions(inputs.brief(), inputs.transcript())
            .await?;

        let mut state = session.lock().await;
        if !is_current(&state, revision, "suggestions") {
            return Ok(state.clone());
        }
        state.set_suggestions(suggestions)?;
        Ok(state.clone())
    }
}

fn is_current(state: &ConversationState, revision: u64, what: &str) -> bool {
    if state.revision() == revision {
        return true;
    }
    warn!(
        "Session {}: discarding stale {what} (started at revision {revision}, now {})",
        state.id(),
        state.revision()
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LlmConfig, Provider};
    use crate::curation::conversation::Limits;
    use crate::llm_client::testing::ScriptedBackend;
    use crate::llm_client::LlmClient;
    use chrono::Utc;
    use uuid::Uuid;

    const INITIAL: &str = r#"```json
[
  {"id":"q1","question":"How much Kubernetes experience do you have?","type":"multiple-choice","options":["None","Some","A lot"]},
  {"id":"q2","question":"Have you led a team?","type":"multiple-choice","options":["No","Yes"]},
  {"id":"q3","question":"Have you shipped Rust to production?","type":"multiple-choice","options":["No","Yes"]},
]
```"#;

    const SUGGESTIONS: &str = r#"[
  {"id":"s1","type":"add","section":"Skills","suggestedText":"Kubernetes","reason":"Kubernetes is a listed requirement"},
  {"id":"s2","type":"emphasize","section":"Experience","reason":"Team leadership matches the role"}
]"#;

    fn is_initial(prompt: &str) -> bool {
        prompt.contains("strategic multiple-choice questions")
    }
    fn is_clarifying(prompt: &str) -> bool {
        prompt.contains("SELECTED ANSWER:")
    }
    fn is_follow_up(prompt: &str) -> bool {
        prompt.contains("determine if you need to ask any follow-up questions")
    }
    fn is_suggestions(prompt: &str) -> bool {
        prompt.contains("expert resume reviewer")
    }

    fn resume(text: &str) -> Resume {
        Resume::new(text.to_string(), "resume.pdf".to_string())
    }

    fn job() -> JobDescription {
        JobDescription {
            url: "https://jobs.example.com/42".to_string(),
            text: "Senior Rust engineer, Kubernetes, team lead".to_string(),
            title: Some("Senior Rust Engineer".to_string()),
            company: Some("Example".to_string()),
            fetched_at: Utc::now(),
        }
    }

    fn engine_for(backend: &Arc<ScriptedBackend>) -> ConversationEngine {
        ConversationEngine::new(Curator::new(
            ScriptedBackend::client(backend),
            Limits::default(),
        ))
    }

    async fn answer_open_questions(engine: &ConversationEngine, session: &Session) -> ConversationState {
        let open: Vec<String> = {
            let state = session.lock().await;
            state
                .questions()
                .iter()
                .filter(|q| !state.answers().iter().any(|a| a.question_id == q.id))
                .map(|q| q.id.clone())
                .collect()
        };
        let mut last = session.lock().await.clone();
        for id in open {
            last = engine.submit_answer(session, &id, "Some").await.unwrap();
        }
        last
    }

    #[tokio::test]
    async fn test_zero_clarifying_questions_go_straight_to_suggestions() {
        let backend = ScriptedBackend::responding("gpt-3.5-turbo", |prompt| {
            if is_initial(prompt) {
                Ok(INITIAL.to_string())
            } else if is_clarifying(prompt) {
                Ok("[]".to_string())
            } else if is_suggestions(prompt) {
                Ok(SUGGESTIONS.to_string())
            } else {
                Ok("unexpected".to_string())
            }
        });
        let engine = engine_for(&backend);
        let session = engine.new_session();

        engine.attach_resume(&session, resume("Rust developer")).await.unwrap();
        let state = engine.attach_job_description(&session, job()).await.unwrap();
        assert_eq!(state.phase(), Phase::Questions);
        assert_eq!(state.questions().len(), 3);

        let state = answer_open_questions(&engine, &session).await;
        assert_eq!(state.phase(), Phase::Suggestions);
        assert_eq!(state.follow_up_rounds(), 0);
        assert_eq!(state.suggestions().len(), 2);
        assert_eq!(state.answers().len(), 3);

        let calls = backend.calls();
        assert_eq!(calls.iter().filter(|c| is_clarifying(&c.prompt)).count(), 3);
        assert!(!calls.iter().any(|c| is_follow_up(&c.prompt)));
        assert_eq!(calls.len(), 5);
    }

    #[tokio::test]
    async fn test_follow_up_rounds_stop_at_cap() {
        let backend = ScriptedBackend::responding("gpt-3.5-turbo", |prompt| {
            if is_initial(prompt) {
                Ok(INITIAL.to_string())
            } else if is_clarifying(prompt) {
                Ok(r#"[{"id":"c1","question":"Which tools did you use?","type":"text"}]"#.to_string())
            } else if is_follow_up(prompt) {
                Ok(r#"[{"id":"f1","question":"Any certifications?","type":"text"}]"#.to_string())
            } else if is_suggestions(prompt) {
                Ok(SUGGESTIONS.to_string())
            } else {
                Ok("unexpected".to_string())
            }
        });
        let engine = engine_for(&backend);
        let session = engine.new_session();
        engine.attach_resume(&session, resume("Rust developer")).await.unwrap();
        engine.attach_job_description(&session, job()).await.unwrap();

        let state = answer_open_questions(&engine, &session).await;
        assert_eq!(state.question_stage(), QuestionStage::Clarifying);
        assert_eq!(state.follow_up_rounds(), 1);
        let ids: Vec<&str> = state.questions()[3..].iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c1-2", "c1-3"]);

        let state = answer_open_questions(&engine, &session).await;
        assert_eq!(state.question_stage(), QuestionStage::FollowUp);
        assert_eq!(state.follow_up_rounds(), 2);

        let state = answer_open_questions(&engine, &session).await;
        assert_eq!(state.phase(), Phase::Suggestions);
        assert_eq!(state.follow_up_rounds(), 2);
        assert_eq!(state.answers().len(), 7);
        assert_eq!(
            backend.calls().iter().filter(|c| is_follow_up(&c.prompt)).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_only_accepted_suggestions_reach_final_prompt() {
        let long_resume = "r".repeat(7000);
        let backend = ScriptedBackend::responding("claude-3-haiku-20240307", |prompt| {
            if is_initial(prompt) {
                Ok(INITIAL.to_string())
            } else if is_suggestions(prompt) {
                Ok(SUGGESTIONS.to_string())
            } else {
                Ok("SUMMARY\nRust engineer".to_string())
            }
        });
        let engine = engine_for(&backend);
        let session = engine.new_session();
        engine.attach_resume(&session, resume(&long_resume)).await.unwrap();
        engine.attach_job_description(&session, job()).await.unwrap();

        let state = engine.skip_to_suggestions(&session).await.unwrap();
        assert_eq!(state.phase(), Phase::Suggestions);
        engine.accept_suggestion(&session, "s2").await.unwrap();

        let state = engine.generate(&session).await.unwrap();
        assert_eq!(state.phase(), Phase::Generate);
        assert_eq!(state.final_resume(), Some("SUMMARY\nRust engineer"));

        let calls = backend.calls();
        let last = calls.last().unwrap();
        assert_eq!(last.max_tokens, 4096);
        assert!(last.prompt.contains("Team leadership matches the role"));
        assert!(!last.prompt.contains("Kubernetes is a listed requirement"));
        assert!(last.prompt.contains(&format!("{}...", "r".repeat(5000))));
        assert!(!last.prompt.contains(&"r".repeat(5001)));
    }

    #[tokio::test]
    async fn test_result_arriving_after_navigation_is_discarded() {
        let session: Session = Arc::new(Mutex::new(ConversationState::new(
            Uuid::new_v4(),
            Limits::default(),
        )));
        let during_call = session.clone();
        let backend = ScriptedBackend::responding("gpt-3.5-turbo", move |prompt| {
            if is_initial(prompt) {
                // The user steps back while the model is still working.
                during_call.try_lock().unwrap().back().unwrap();
            }
            Ok(INITIAL.to_string())
        });
        let engine = engine_for(&backend);

        engine.attach_resume(&session, resume("Rust developer")).await.unwrap();
        let state = engine.attach_job_description(&session, job()).await.unwrap();

        assert_eq!(state.phase(), Phase::JobDescription);
        assert!(state.questions().is_empty());
    }

    #[tokio::test]
    async fn test_missing_credential_keeps_phase_for_retry() {
        let llm = LlmClient::from_config(&LlmConfig {
            provider: Provider::OpenAi,
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            base_url: None,
        });
        let engine = ConversationEngine::new(Curator::new(llm, Limits::default()));
        let session = engine.new_session();
        engine.attach_resume(&session, resume("Rust developer")).await.unwrap();

        let err = engine.attach_job_description(&session, job()).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::CredentialMissing {
                env_var: "OPENAI_API_KEY",
                ..
            }
        ));
        assert_eq!(session.lock().await.phase(), Phase::Questions);
    }

    #[tokio::test]
    async fn test_back_then_advance_reuses_suggestions() {
        let backend = ScriptedBackend::responding("gpt-3.5-turbo", |prompt| {
            if is_initial(prompt) {
                Ok(INITIAL.to_string())
            } else if is_suggestions(prompt) {
                Ok(SUGGESTIONS.to_string())
            } else {
                Ok("[]".to_string())
            }
        });
        let engine = engine_for(&backend);
        let session = engine.new_session();
        engine.attach_resume(&session, resume("Rust developer")).await.unwrap();
        engine.attach_job_description(&session, job()).await.unwrap();
        engine.skip_to_suggestions(&session).await.unwrap();
        engine.accept_suggestion(&session, "s1").await.unwrap();
        let calls_before = backend.calls().len();

        let state = engine.back(&session).await.unwrap();
        assert_eq!(state.phase(), Phase::Questions);
        let state = engine.submit_answer(&session, "q1", "A lot").await.unwrap();
        assert_eq!(state.phase(), Phase::Questions);

        let state = engine.advance(&session).await.unwrap();
        assert_eq!(state.phase(), Phase::Suggestions);
        assert!(state.accepted_suggestion_ids().contains("s1"));
        assert_eq!(backend.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn test_advance_resumes_round_left_unfinished() {
        let backend = ScriptedBackend::responding("gpt-3.5-turbo", |prompt| {
            if is_initial(prompt) {
                Ok(INITIAL.to_string())
            } else if is_suggestions(prompt) {
                Ok(SUGGESTIONS.to_string())
            } else {
                Ok("[]".to_string())
            }
        });
        let engine = engine_for(&backend);
        let session = engine.new_session();
        engine.attach_resume(&session, resume("Rust developer")).await.unwrap();
        engine.attach_job_description(&session, job()).await.unwrap();

        // Answers stored, but the request that owed the clarifying round died.
        {
            let mut state = session.lock().await;
            for id in ["q1", "q2", "q3"] {
                state.record_answer(id, "Some").unwrap();
            }
            assert!(matches!(state.next_step(), NextStep::RequestClarifying(_)));
        }

        let state = engine.advance(&session).await.unwrap();
        assert_eq!(state.phase(), Phase::Suggestions);
        assert_eq!(state.suggestions().len(), 2);
        assert_eq!(
            backend.calls().iter().filter(|c| is_clarifying(&c.prompt)).count(),
            3
        );
    }

    #[tokio::test]
    async fn test_advance_with_open_questions_still_needs_answers() {
        let backend = ScriptedBackend::responding("gpt-3.5-turbo", |prompt| {
            if is_initial(prompt) {
                Ok(INITIAL.to_string())
            } else {
                Ok("[]".to_string())
            }
        });
        let engine = engine_for(&backend);
        let session = engine.new_session();
        engine.attach_resume(&session, resume("Rust developer")).await.unwrap();
        engine.attach_job_description(&session, job()).await.unwrap();

        let err = engine.advance(&session).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_returns_to_upload() {
        let backend = ScriptedBackend::responding("gpt-3.5-turbo", |_| Ok(String::new()));
        let engine = engine_for(&backend);
        let session = engine.new_session();
        engine.attach_resume(&session, resume("Rust developer")).await.unwrap();

        let state = engine.reset(&session).await;
        assert_eq!(state.phase(), Phase::Upload);
        assert!(state.resume().is_none());
    }
}
