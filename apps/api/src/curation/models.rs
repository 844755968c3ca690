//! Wire types shared by the curation pipeline and the HTTP layer.
//!
//! Field names are camelCase on the wire (`questionId`, `fileName`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An uploaded résumé. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resume {
    pub id: Uuid,
    pub text: String,
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
}

impl Resume {
    pub fn new(text: String, file_name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            text,
            file_name,
            uploaded_at: Utc::now(),
        }
    }
}

/// A fetched (or pasted) job posting. Immutable once created.
///
/// `url` is empty for pasted postings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescription {
    pub url: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    #[default]
    Text,
    Textarea,
    #[serde(alias = "multiple_choice", alias = "multipleChoice")]
    MultipleChoice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Models sometimes omit ids; the conversation assigns one when empty.
    #[serde(default)]
    pub id: String,
    pub question: String,
    #[serde(rename = "type", default)]
    pub kind: QuestionType,
    /// Non-empty exactly when `kind` is `MultipleChoice`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: String,
    pub answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionType {
    Add,
    Remove,
    Emphasize,
    Reword,
}

impl SuggestionType {
    pub fn label(&self) -> &'static str {
        match self {
            SuggestionType::Add => "ADD",
            SuggestionType::Remove => "REMOVE",
            SuggestionType::Emphasize => "EMPHASIZE",
            SuggestionType::Reword => "REWORD",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SuggestionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_text: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

/// The two texts every prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct Brief<'a> {
    pub resume: &'a str,
    pub job: &'a str,
}

/// Answers plus the questions they refer to, so prompts can quote question text.
/// `questions` may be empty, in which case answers are quoted by question id.
#[derive(Debug, Clone, Copy)]
pub struct Transcript<'a> {
    pub questions: &'a [Question],
    pub answers: &'a [Answer],
}

impl<'a> Transcript<'a> {
    pub fn new(questions: &'a [Question], answers: &'a [Answer]) -> Self {
        Self { questions, answers }
    }

    pub fn question_text(&self, question_id: &str) -> Option<&'a str> {
        self.questions
            .iter()
            .find(|q| q.id == question_id)
            .map(|q| q.question.as_str())
    }
}
