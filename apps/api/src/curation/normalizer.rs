//! Best-effort recovery of a JSON array from raw model output.
//!
//! Models wrap JSON in markdown fences, leave trailing commas, or add chatter
//! around the array. [`recover_json_array`] runs an ordered fallback chain; the
//! typed normalizers then drop items that do not fit the expected shape.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::curation::models::{Question, QuestionType, Suggestion};

static TAGGED_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").unwrap());
static ANY_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```\s*(.*?)\s*```").unwrap());
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").unwrap());
static GREEDY_ARRAY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\[.*\]").unwrap());

/// How much of the raw output is echoed into logs.
const LOG_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Invalid JSON response from AI: {0}")]
    InvalidJson(String),

    #[error("AI response contained no usable {kind}")]
    NoUsableItems { kind: &'static str },
}

/// What a caller wants when the output cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Primary generation: surface the failure.
    Fail,
    /// Optional generation: degrade to an empty list.
    Empty,
}

/// Extracts a JSON array from `raw`.
///
/// A well-formed JSON value that is not an array yields an empty list.
pub fn recover_json_array(raw: &str) -> Result<Vec<Value>, NormalizeError> {
    let trimmed = raw.trim();

    let fenced = TAGGED_FENCE
        .captures(trimmed)
        .or_else(|| ANY_FENCE.captures(trimmed))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed);

    let candidate = TRAILING_COMMA.replace_all(fenced, "$1");

    let parse_error = match serde_json::from_str::<Value>(&candidate) {
        Ok(Value::Array(items)) => return Ok(items),
        Ok(other) => {
            warn!("AI response was JSON but not an array ({}), treating as empty", kind_of(&other));
            return Ok(Vec::new());
        }
        Err(e) => e,
    };

    warn!(
        "JSON parse error: {parse_error}; attempted to parse: {}",
        preview(&candidate)
    );

    if let Some(m) = GREEDY_ARRAY.find(&candidate) {
        match serde_json::from_str::<Value>(m.as_str()) {
            Ok(Value::Array(items)) => return Ok(items),
            Ok(_) => {}
            Err(e) => warn!("Failed to parse extracted array: {e}"),
        }
    }

    Err(NormalizeError::InvalidJson(parse_error.to_string()))
}

/// Recovers and sanitizes questions.
///
/// Multiple-choice questions without usable options become `text` questions;
/// options on other types are discarded.
pub fn normalize_questions(raw: &str, fallback: Fallback) -> Result<Vec<Question>, NormalizeError> {
    let items = match recover_json_array(raw) {
        Ok(items) => items,
        Err(e) if fallback == Fallback::Empty => {
            warn!("Discarding unusable optional questions: {e}");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let offered = items.len();
    let questions: Vec<Question> = typed_items::<Question>(items, "question")
        .into_iter()
        .filter_map(sanitize_question)
        .collect();

    if offered > 0 && questions.is_empty() && fallback == Fallback::Fail {
        return Err(NormalizeError::NoUsableItems { kind: "questions" });
    }
    Ok(questions)
}

/// Recovers and sanitizes suggestions. Always a primary call.
pub fn normalize_suggestions(raw: &str) -> Result<Vec<Suggestion>, NormalizeError> {
    let items = recover_json_array(raw)?;
    let offered = items.len();

    let suggestions: Vec<Suggestion> = typed_items::<Suggestion>(items, "suggestion")
        .into_iter()
        .filter_map(sanitize_suggestion)
        .collect();

    if offered > 0 && suggestions.is_empty() {
        return Err(NormalizeError::NoUsableItems {
            kind: "suggestions",
        });
    }
    Ok(suggestions)
}

fn typed_items<T: DeserializeOwned>(items: Vec<Value>, kind: &str) -> Vec<T> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| match serde_json::from_value::<T>(item) {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!("Dropping malformed {kind} at index {idx}: {e}");
                None
            }
        })
        .collect()
}

fn sanitize_question(mut q: Question) -> Option<Question> {
    q.id = q.id.trim().to_string();
    q.question = q.question.trim().to_string();
    if q.question.is_empty() {
        warn!("Dropping question {:?} with empty text", q.id);
        return None;
    }

    let options: Vec<String> = q
        .options
        .take()
        .unwrap_or_default()
        .into_iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();

    if q.kind == QuestionType::MultipleChoice {
        if options.is_empty() {
            warn!("Question {:?} is multiple-choice without options, asking as text", q.id);
            q.kind = QuestionType::Text;
        } else {
            q.options = Some(options);
        }
    }
    Some(q)
}

fn sanitize_suggestion(mut s: Suggestion) -> Option<Suggestion> {
    s.id = s.id.trim().to_string();
    s.reason = s.reason.trim().to_string();
    if s.reason.is_empty() {
        warn!("Dropping suggestion {:?} without a reason", s.id);
        return None;
    }
    s.section = non_blank(s.section);
    s.current_text = non_blank(s.current_text);
    s.suggested_text = non_blank(s.suggested_text);
    Some(s)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn preview(text: &str) -> String {
    text.chars().take(LOG_PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curation::models::SuggestionType;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_fenced_array_with_trailing_comma() {
        let raw = "```json\n[{\"id\":\"q1\",\"question\":\"Describe a project\",\"type\":\"textarea\"},]\n```";
        let items = recover_json_array(raw).unwrap();
        assert_eq!(
            items,
            vec![json!({"id": "q1", "question": "Describe a project", "type": "textarea"})]
        );

        let questions = normalize_questions(raw, Fallback::Fail).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].id, "q1");
        assert_eq!(questions[0].kind, QuestionType::Textarea);
    }

    #[test]
    fn test_untagged_fence_is_unwrapped() {
        let raw = "Here you go:\n```\n[{\"id\":\"a\"}]\n```\nGood luck!";
        assert_eq!(recover_json_array(raw).unwrap(), vec![json!({"id": "a"})]);
    }

    #[test]
    fn test_trailing_comma_inside_object() {
        let items = recover_json_array(r#"[{"id":"s1","reason":"x",}]"#).unwrap();
        assert_eq!(items, vec![json!({"id": "s1", "reason": "x"})]);
    }

    #[test]
    fn test_non_array_json_is_empty() {
        assert!(recover_json_array(r#"{"questions": []}"#).unwrap().is_empty());
        assert!(recover_json_array("42").unwrap().is_empty());
    }

    #[test]
    fn test_array_embedded_in_prose_is_found() {
        let raw = "Sure! [{\"id\":\"q1\",\"question\":\"Why?\"}] Let me know.";
        let items = recover_json_array(raw).unwrap();
        assert_eq!(items, vec![json!({"id": "q1", "question": "Why?"})]);
    }

    #[test]
    fn test_unrecoverable_text_fails_primary_and_empties_optional() {
        let raw = "I cannot help with that.";
        assert!(matches!(
            normalize_questions(raw, Fallback::Fail),
            Err(NormalizeError::InvalidJson(_))
        ));
        assert!(normalize_questions(raw, Fallback::Empty).unwrap().is_empty());
        assert!(normalize_suggestions(raw).is_err());
    }

    #[test]
    fn test_broken_bracketed_text_is_invalid() {
        assert!(recover_json_array("[not, json").is_err());
        assert!(recover_json_array("[definitely not json]").is_err());
    }

    #[test]
    fn test_multiple_choice_without_options_downgrades_to_text() {
        let raw = r#"[
            {"id":"q1","question":"Pick","type":"multiple-choice"},
            {"id":"q2","question":"Pick again","type":"multiple-choice","options":[" ", "Yes"]},
            {"id":"q3","question":"Explain","type":"text","options":["ignored"]}
        ]"#;
        let questions = normalize_questions(raw, Fallback::Fail).unwrap();
        assert_eq!(questions[0].kind, QuestionType::Text);
        assert!(questions[0].options.is_none());
        assert_eq!(questions[1].kind, QuestionType::MultipleChoice);
        assert_eq!(questions[1].options.as_deref(), Some(&["Yes".to_string()][..]));
        assert!(questions[2].options.is_none());
    }

    #[test]
    fn test_malformed_items_are_dropped() {
        let raw = r#"[{"id":"q1","question":"Fine"}, {"id":"q2"}, "stray", {"question":"   "}]"#;
        let questions = normalize_questions(raw, Fallback::Fail).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].question, "Fine");
    }

    #[test]
    fn test_all_items_malformed_fails_primary_only() {
        let raw = r#"[{"id":"q1"}, {"text":"nope"}]"#;
        assert!(matches!(
            normalize_questions(raw, Fallback::Fail),
            Err(NormalizeError::NoUsableItems { kind: "questions" })
        ));
        assert!(normalize_questions(raw, Fallback::Empty).unwrap().is_empty());
    }

    #[test]
    fn test_empty_array_is_a_valid_answer() {
        assert!(normalize_questions("[]", Fallback::Fail).unwrap().is_empty());
        assert!(normalize_suggestions("```json\n[]\n```").unwrap().is_empty());
    }

    #[test]
    fn test_suggestions_are_typed_and_trimmed() {
        let raw = r#"```json
        [
          {"id":"s1","type":"add","section":"Skills","currentText":"","suggestedText":"Kubernetes","reason":"Listed as required"},
          {"id":"s2","type":"rename","reason":"unknown type"},
          {"id":"s3","type":"emphasize","reason":"  "}
        ]
        ```"#;
        let suggestions = normalize_suggestions(raw).unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].kind, SuggestionType::Add);
        assert!(suggestions[0].current_text.is_none());
        assert_eq!(suggestions[0].suggested_text.as_deref(), Some("Kubernetes"));
    }

    const PHRASE: &str = "[A-Za-z0-9?]([A-Za-z0-9 ?,.']{0,30}[A-Za-z0-9?.])?";

    fn well_formed_question() -> impl Strategy<Value = Question> {
        (
            "q[0-9]{1,3}",
            PHRASE,
            prop_oneof![
                Just(QuestionType::Text),
                Just(QuestionType::Textarea),
                Just(QuestionType::MultipleChoice),
            ],
            prop::collection::vec(PHRASE, 1..4),
        )
            .prop_map(|(id, question, kind, options)| Question {
                id,
                question,
                kind,
                options: (kind == QuestionType::MultipleChoice).then_some(options),
            })
    }

    proptest! {
        #[test]
        fn test_fenced_array_with_trailing_comma_recovers_exactly(
            questions in prop::collection::vec(well_formed_question(), 1..6)
        ) {
            let pretty = serde_json::to_string_pretty(&questions).unwrap();
            let body = pretty.trim_end_matches(']').trim_end();
            let raw = format!("```json\n{body},\n]\n```");

            prop_assert_eq!(normalize_questions(&raw, Fallback::Fail).unwrap(), questions);
        }

        #[test]
        fn test_bracketless_text_never_yields_items(raw in "[^\\[\\]{}0-9\"-]*") {
            // Without brackets, braces, digits or quotes nothing parses as JSON except
            // keywords, none of which are arrays.
            let optional = normalize_questions(&raw, Fallback::Empty).unwrap();
            prop_assert!(optional.is_empty());
            if let Ok(items) = recover_json_array(&raw) {
                prop_assert!(items.is_empty());
            }
        }
    }
}
