//! The conversation state machine.
//!
//! `upload → job-description → questions → suggestions → generate`, with
//! initial / clarifying / follow-up stages inside `questions`. Everything here
//! is synchronous and pure; the engine decides when to call the model and feeds
//! the results back through these transitions.
//!
//! Every mutation bumps `revision`, which lets the engine recognise results
//! that arrive after the user has moved on.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::curation::models::{
    Answer, Brief, HistoryEntry, JobDescription, Question, Resume, Role, Suggestion, Transcript,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Upload,
    JobDescription,
    Questions,
    Suggestions,
    Generate,
}

impl Phase {
    pub fn previous(self) -> Option<Phase> {
        match self {
            Phase::Upload => None,
            Phase::JobDescription => Some(Phase::Upload),
            Phase::Questions => Some(Phase::JobDescription),
            Phase::Suggestions => Some(Phase::Questions),
            Phase::Generate => Some(Phase::Suggestions),
        }
    }

    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Upload => Some(Phase::JobDescription),
            Phase::JobDescription => Some(Phase::Questions),
            Phase::Questions => Some(Phase::Suggestions),
            Phase::Suggestions => Some(Phase::Generate),
            Phase::Generate => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Upload => "upload",
            Phase::JobDescription => "job-description",
            Phase::Questions => "questions",
            Phase::Suggestions => "suggestions",
            Phase::Generate => "generate",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which batch of questions is currently being answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionStage {
    #[default]
    Initial,
    Clarifying,
    FollowUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub initial_questions: usize,
    /// Clarifying and follow-up rounds combined.
    pub max_follow_up_rounds: u32,
    pub max_clarifying_per_answer: usize,
    pub max_follow_up_questions: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            initial_questions: 3,
            max_follow_up_rounds: 2,
            max_clarifying_per_answer: 2,
            max_follow_up_questions: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Cannot {action} during the {phase} phase")]
    WrongPhase { action: &'static str, phase: Phase },

    #[error("Unknown question id: {0}")]
    UnknownQuestion(String),

    #[error("Unknown suggestion id: {0}")]
    UnknownSuggestion(String),

    #[error("Answer must not be blank")]
    BlankAnswer,

    #[error("Already at the first step")]
    NoPreviousPhase,

    #[error("Cannot move on to {phase}: {missing} not available yet")]
    MissingData {
        phase: Phase,
        missing: &'static str,
    },

    #[error("Follow-up round limit of {0} reached")]
    RoundLimit(u32),
}

/// What the engine should do next to make progress in the current phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// Waiting on user input that is not an answer.
    Idle,
    AwaitAnswers,
    RequestInitialQuestions,
    /// One clarifying call per answered initial question, in order.
    RequestClarifying(Vec<ClarifyTarget>),
    RequestFollowUp,
    /// The round cap is reached; questions are over.
    EnterSuggestions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClarifyTarget {
    pub question_text: String,
    pub selected_answer: String,
}

/// Owned copy of everything a prompt needs, taken so no lock is held while
/// the model is called.
#[derive(Debug, Clone)]
pub struct CurationInputs {
    pub resume: String,
    pub job: String,
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
}

impl CurationInputs {
    pub fn brief(&self) -> Brief<'_> {
        Brief {
            resume: &self.resume,
            job: &self.job,
        }
    }

    pub fn transcript(&self) -> Transcript<'_> {
        Transcript::new(&self.questions, &self.answers)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    id: Uuid,
    phase: Phase,
    /// Furthest phase reachable again without new input.
    furthest_phase: Phase,
    resume: Option<Resume>,
    job_description: Option<JobDescription>,
    questions: Vec<Question>,
    answers: Vec<Answer>,
    suggestions: Vec<Suggestion>,
    accepted_suggestion_ids: BTreeSet<String>,
    question_stage: QuestionStage,
    follow_up_rounds: u32,
    final_resume: Option<String>,
    history: Vec<HistoryEntry>,
    revision: u64,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    limits: Limits,
    /// Index into `questions` where the current round begins.
    #[serde(skip)]
    round_start: usize,
    /// `questions[..initial_count]` are the initial questions.
    #[serde(skip)]
    initial_count: usize,
}

impl ConversationState {
    pub fn new(id: Uuid, limits: Limits) -> Self {
        Self {
            id,
            phase: Phase::Upload,
            furthest_phase: Phase::Upload,
            resume: None,
            job_description: None,
            questions: Vec::new(),
            answers: Vec::new(),
            suggestions: Vec::new(),
            accepted_suggestion_ids: BTreeSet::new(),
            question_stage: QuestionStage::Initial,
            follow_up_rounds: 0,
            final_resume: None,
            history: Vec::new(),
            revision: 0,
            updated_at: Utc::now(),
            limits,
            round_start: 0,
            initial_count: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn resume(&self) -> Option<&Resume> {
        self.resume.as_ref()
    }

    pub fn job_description(&self) -> Option<&JobDescription> {
        self.job_description.as_ref()
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn answers(&self) -> &[Answer] {
        &self.answers
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        &self.suggestions
    }

    pub fn accepted_suggestion_ids(&self) -> &BTreeSet<String> {
        &self.accepted_suggestion_ids
    }

    pub fn question_stage(&self) -> QuestionStage {
        self.question_stage
    }

    pub fn follow_up_rounds(&self) -> u32 {
        self.follow_up_rounds
    }

    pub fn final_resume(&self) -> Option<&str> {
        self.final_resume.as_deref()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    // ── input phases ────────────────────────────────────────────────────────

    /// Stores a résumé and moves to `job-description`. A replaced résumé
    /// invalidates every question, answer and suggestion derived from it.
    pub fn attach_resume(&mut self, resume: Resume) -> Result<(), TransitionError> {
        self.require_phase("upload a resume", &[Phase::Upload, Phase::JobDescription])?;

        info!(
            "Session {}: resume {:?} attached ({} chars)",
            self.id,
            resume.file_name,
            resume.text.chars().count()
        );
        self.resume = Some(resume);
        self.clear_questions();
        self.clear_suggestions();
        self.phase = Phase::JobDescription;
        self.furthest_phase = Phase::JobDescription;
        self.touch();
        Ok(())
    }

    /// Stores a job description and moves to `questions`, clearing everything
    /// derived from a previous one.
    pub fn attach_job_description(&mut self, job: JobDescription) -> Result<(), TransitionError> {
        self.require_phase("set a job description", &[Phase::JobDescription])?;
        if self.resume.is_none() {
            return Err(TransitionError::MissingData {
                phase: Phase::Questions,
                missing: "resume",
            });
        }

        info!(
            "Session {}: job description attached (title={:?})",
            self.id, job.title
        );
        self.job_description = Some(job);
        self.clear_questions();
        self.clear_suggestions();
        self.phase = Phase::Questions;
        self.furthest_phase = Phase::Questions;
        self.touch();
        Ok(())
    }

    // ── questions ───────────────────────────────────────────────────────────

    /// Replaces the question set with a fresh initial batch.
    pub fn set_initial_questions(&mut self, questions: Vec<Question>) -> Result<(), TransitionError> {
        self.require_phase("set questions", &[Phase::Questions])?;

        self.clear_questions();
        let mut questions = questions;
        questions.truncate(self.limits.initial_questions);
        self.append_questions(questions);
        self.initial_count = self.questions.len();
        self.touch();
        Ok(())
    }

    /// Drops the current question set, and everything downstream of it, so a
    /// new initial batch can be requested.
    pub fn reset_questions(&mut self) -> Result<(), TransitionError> {
        self.require_phase("regenerate questions", &[Phase::Questions])?;
        self.clear_questions();
        self.clear_suggestions();
        self.furthest_phase = Phase::Questions;
        self.touch();
        Ok(())
    }

    /// Records (or overwrites) the answer to a known question.
    pub fn record_answer(&mut self, question_id: &str, answer: &str) -> Result<(), TransitionError> {
        self.require_phase("answer questions", &[Phase::Questions])?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(TransitionError::BlankAnswer);
        }
        if !self.questions.iter().any(|q| q.id == question_id) {
            return Err(TransitionError::UnknownQuestion(question_id.to_string()));
        }

        match self.answers.iter_mut().find(|a| a.question_id == question_id) {
            Some(existing) => existing.answer = answer.to_string(),
            None => self.answers.push(Answer {
                question_id: question_id.to_string(),
                answer: answer.to_string(),
            }),
        }
        self.history.push(HistoryEntry {
            role: Role::User,
            content: answer.to_string(),
        });
        self.touch();
        Ok(())
    }

    /// Whether every question of the current round has an answer.
    pub fn stage_complete(&self) -> bool {
        self.questions[self.round_start..]
            .iter()
            .all(|q| self.is_answered(&q.id))
    }

    pub fn next_step(&self) -> NextStep {
        // Once the questions have been concluded (the user went back from a
        // later phase), answers may still be edited but no new rounds start.
        if self.phase != Phase::Questions || self.furthest_phase > Phase::Questions {
            return NextStep::Idle;
        }
        if self.questions.is_empty() {
            return NextStep::RequestInitialQuestions;
        }
        if !self.stage_complete() {
            return NextStep::AwaitAnswers;
        }
        if self.follow_up_rounds >= self.limits.max_follow_up_rounds {
            return NextStep::EnterSuggestions;
        }
        match self.question_stage {
            QuestionStage::Initial => {
                let targets = self.questions[..self.initial_count]
                    .iter()
                    .filter_map(|q| {
                        self.answer_for(&q.id).map(|a| ClarifyTarget {
                            question_text: q.question.clone(),
                            selected_answer: a.to_string(),
                        })
                    })
                    .collect();
                NextStep::RequestClarifying(targets)
            }
            QuestionStage::Clarifying | QuestionStage::FollowUp => NextStep::RequestFollowUp,
        }
    }

    /// Applies one clarifying or follow-up round. An empty round ends the
    /// questions phase.
    pub fn add_round(
        &mut self,
        questions: Vec<Question>,
        stage: QuestionStage,
    ) -> Result<(), TransitionError> {
        self.require_phase("add follow-up questions", &[Phase::Questions])?;

        if questions.is_empty() {
            info!("Session {}: no further questions, moving to suggestions", self.id);
            self.enter_suggestions()?;
            return Ok(());
        }
        if self.follow_up_rounds >= self.limits.max_follow_up_rounds {
            return Err(TransitionError::RoundLimit(self.limits.max_follow_up_rounds));
        }

        let mut questions = questions;
        if stage == QuestionStage::FollowUp {
            questions.truncate(self.limits.max_follow_up_questions);
        }
        self.round_start = self.questions.len();
        self.append_questions(questions);
        self.follow_up_rounds += 1;
        self.question_stage = stage;
        info!(
            "Session {}: follow-up round {} started with {} question(s)",
            self.id,
            self.follow_up_rounds,
            self.questions.len() - self.round_start
        );
        self.touch();
        Ok(())
    }

    /// Leaves `questions` with whatever answers exist so far.
    pub fn skip_to_suggestions(&mut self) -> Result<(), TransitionError> {
        self.require_phase("skip to suggestions", &[Phase::Questions])?;
        self.enter_suggestions()
    }

    /// Moves from `questions` to `suggestions`, discarding any earlier
    /// suggestions so they are generated from the current answers.
    pub fn enter_suggestions(&mut self) -> Result<(), TransitionError> {
        self.require_phase("move to suggestions", &[Phase::Questions])?;
        self.clear_suggestions();
        self.phase = Phase::Suggestions;
        self.furthest_phase = Phase::Suggestions;
        info!(
            "Session {}: entered suggestions with {} answer(s)",
            self.id,
            self.answers.len()
        );
        self.touch();
        Ok(())
    }

    // ── suggestions ─────────────────────────────────────────────────────────

    pub fn set_suggestions(&mut self, suggestions: Vec<Suggestion>) -> Result<(), TransitionError> {
        self.require_phase("set suggestions", &[Phase::Suggestions])?;

        self.clear_suggestions();
        let mut used = HashSet::new();
        for mut s in suggestions {
            s.id = unique_id(&s.id, "s", &mut used);
            self.suggestions.push(s);
        }
        self.furthest_phase = Phase::Suggestions;
        self.touch();
        Ok(())
    }

    pub fn accept_suggestion(&mut self, id: &str) -> Result<(), TransitionError> {
        self.require_suggestion(id)?;
        self.accepted_suggestion_ids.insert(id.to_string());
        self.touch();
        Ok(())
    }

    pub fn reject_suggestion(&mut self, id: &str) -> Result<(), TransitionError> {
        self.require_suggestion(id)?;
        self.accepted_suggestion_ids.remove(id);
        self.touch();
        Ok(())
    }

    /// Accepted suggestions in generation order.
    pub fn accepted_suggestions(&self) -> Vec<Suggestion> {
        self.suggestions
            .iter()
            .filter(|s| self.accepted_suggestion_ids.contains(&s.id))
            .cloned()
            .collect()
    }

    // ── generate ────────────────────────────────────────────────────────────

    /// Enters (or re-enters) `generate`. Any previous result is discarded.
    pub fn enter_generate(&mut self) -> Result<(), TransitionError> {
        self.require_phase("generate a resume", &[Phase::Suggestions, Phase::Generate])?;
        self.final_resume = None;
        self.phase = Phase::Generate;
        self.furthest_phase = Phase::Generate;
        info!(
            "Session {}: generating with {} accepted suggestion(s)",
            self.id,
            self.accepted_suggestion_ids.len()
        );
        self.touch();
        Ok(())
    }

    pub fn set_final_resume(&mut self, text: String) -> Result<(), TransitionError> {
        self.require_phase("store the generated resume", &[Phase::Generate])?;
        self.final_resume = Some(text);
        self.touch();
        Ok(())
    }

    // ── navigation ──────────────────────────────────────────────────────────

    /// Steps back to the preceding phase without clearing anything.
    pub fn back(&mut self) -> Result<Phase, TransitionError> {
        let previous = self.phase.previous().ok_or(TransitionError::NoPreviousPhase)?;
        info!("Session {}: back from {} to {}", self.id, self.phase, previous);
        self.phase = previous;
        self.touch();
        Ok(previous)
    }

    /// Steps forward one phase using data already held.
    pub fn advance(&mut self) -> Result<Phase, TransitionError> {
        let next = self.phase.next().ok_or(TransitionError::WrongPhase {
            action: "advance",
            phase: self.phase,
        })?;

        let missing = match next {
            Phase::JobDescription if self.resume.is_none() => Some("resume"),
            Phase::Questions if self.job_description.is_none() => Some("job description"),
            Phase::Suggestions | Phase::Generate if self.furthest_phase < next => {
                Some(if next == Phase::Suggestions {
                    "answers"
                } else {
                    "accepted suggestions"
                })
            }
            _ => None,
        };
        if let Some(missing) = missing {
            return Err(TransitionError::MissingData {
                phase: next,
                missing,
            });
        }

        info!("Session {}: advance from {} to {}", self.id, self.phase, next);
        self.phase = next;
        self.furthest_phase = self.furthest_phase.max(next);
        self.touch();
        Ok(next)
    }

    /// Back to an empty `upload` phase. The revision keeps counting so results
    /// of calls started before the reset are still recognised as stale.
    pub fn start_over(&mut self) {
        let revision = self.revision;
        *self = ConversationState::new(self.id, self.limits);
        self.revision = revision;
        info!("Session {}: started over", self.id);
        self.touch();
    }

    // ── snapshots ───────────────────────────────────────────────────────────

    pub fn inputs(&self) -> Result<CurationInputs, TransitionError> {
        let resume = self.resume.as_ref().ok_or(TransitionError::MissingData {
            phase: Phase::Questions,
            missing: "resume",
        })?;
        let job = self
            .job_description
            .as_ref()
            .ok_or(TransitionError::MissingData {
                phase: Phase::Questions,
                missing: "job description",
            })?;

        Ok(CurationInputs {
            resume: resume.text.clone(),
            job: job.text.clone(),
            questions: self.questions.clone(),
            answers: self.answers.clone(),
        })
    }

    // ── internals ───────────────────────────────────────────────────────────

    fn require_phase(&self, action: &'static str, allowed: &[Phase]) -> Result<(), TransitionError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(TransitionError::WrongPhase {
                action,
                phase: self.phase,
            })
        }
    }

    fn require_suggestion(&self, id: &str) -> Result<(), TransitionError> {
        self.require_phase("review suggestions", &[Phase::Suggestions])?;
        if self.suggestions.iter().any(|s| s.id == id) {
            Ok(())
        } else {
            Err(TransitionError::UnknownSuggestion(id.to_string()))
        }
    }

    fn is_answered(&self, question_id: &str) -> bool {
        self.answers.iter().any(|a| a.question_id == question_id)
    }

    fn answer_for(&self, question_id: &str) -> Option<&str> {
        self.answers
            .iter()
            .find(|a| a.question_id == question_id)
            .map(|a| a.answer.as_str())
    }

    fn append_questions(&mut self, questions: Vec<Question>) {
        let mut used: HashSet<String> = self.questions.iter().map(|q| q.id.clone()).collect();
        for mut q in questions {
            q.id = unique_id(&q.id, "q", &mut used);
            self.history.push(HistoryEntry {
                role: Role::Assistant,
                content: q.question.clone(),
            });
            self.questions.push(q);
        }
    }

    fn clear_questions(&mut self) {
        self.questions.clear();
        self.answers.clear();
        self.history.clear();
        self.question_stage = QuestionStage::Initial;
        self.follow_up_rounds = 0;
        self.round_start = 0;
        self.initial_count = 0;
    }

    fn clear_suggestions(&mut self) {
        self.suggestions.clear();
        self.accepted_suggestion_ids.clear();
        self.final_resume = None;
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = Utc::now();
    }
}

/// Returns `proposed` if it is free, otherwise a fresh id, and marks it used.
/// Empty ids become `<prefix><n>`; taken ids become `<id>-<n>`.
fn unique_id(proposed: &str, prefix: &str, used: &mut HashSet<String>) -> String {
    let id = if proposed.is_empty() {
        (used.len() + 1..)
            .map(|n| format!("{prefix}{n}"))
            .find(|candidate| !used.contains(candidate))
    } else if used.contains(proposed) {
        (2..)
            .map(|n| format!("{proposed}-{n}"))
            .find(|candidate| !used.contains(candidate))
    } else {
        Some(proposed.to_string())
    };
    // Both ranges are unbounded, so a free id is always found.
    let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
    used.insert(id.clone());
    id
}
