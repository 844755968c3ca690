// All LLM prompt templates for the curation flow.
// Reuses cross-cutting fragments from llm_client::prompts.
//
// Every builder is a pure function of its inputs. Placeholders are filled in a
// single pass, so `{...}` sequences inside résumé or job text are left alone.

use std::borrow::Cow;

use crate::curation::models::{Brief, Suggestion, Transcript};
use crate::llm_client::prompts::{JSON_ONLY_INSTRUCTION, QUESTION_SCHEMA, SUGGESTION_SCHEMA};

pub const MAX_RESUME_CHARS: usize = 5000;
pub const MAX_JOB_CHARS: usize = 3000;
const TRUNCATION_MARKER: &str = "...";

/// Initial questions prompt.
/// Replace: {resume}, {job}, {count}, {schema}, {json_only}
pub const INITIAL_QUESTIONS_TEMPLATE: &str = r#"You are an expert career coach helping someone tailor their resume for a specific job application.

RESUME:
{resume}

JOB DESCRIPTION:
{job}

Identify the most important gaps between the resume and the job requirements, then generate exactly {count} strategic multiple-choice questions that help bridge those gaps. Each question should:
1. Target one specific requirement of the job that the resume does not clearly demonstrate
2. Offer 3-5 concrete answer options describing plausible levels of experience
3. Include an option for candidates who do not have this experience

{schema}

Every question MUST have type "multiple-choice" and a non-empty options array.

{json_only}"#;

/// Answer-specific clarification prompt.
/// Replace: {resume}, {job}, {question}, {answer}, {max}, {schema}, {json_only}
pub const CLARIFYING_QUESTIONS_TEMPLATE: &str = r#"You are helping a candidate tailor their resume. They just answered a multiple-choice question about their background.

RESUME:
{resume}

JOB DESCRIPTION:
{job}

QUESTION:
{question}

SELECTED ANSWER:
{answer}

If this answer points to relevant experience worth capturing on the resume, generate up to {max} short clarifying questions asking for specifics such as projects, tools, metrics or outcomes. Use type "text" for short answers and "textarea" for longer descriptions. If the answer needs no clarification (for example, the candidate has no such experience), return an empty array.

{schema}

{json_only}"#;

/// Generic follow-up prompt.
/// Replace: {resume}, {job}, {answers}, {schema}, {json_only}
pub const FOLLOW_UP_QUESTIONS_TEMPLATE: &str = r#"Based on the resume, job description, and previous answers below, determine if you need to ask any follow-up questions to better understand the candidate.

RESUME:
{resume}

JOB DESCRIPTION:
{job}

PREVIOUS ANSWERS:
{answers}

IMPORTANT: Only generate follow-up questions if there is CRITICAL information missing that is absolutely necessary to provide good resume suggestions. If you have enough information to provide helpful suggestions, return an empty array.

If you need more information, generate 1-3 additional clarifying questions. Otherwise, return an empty array.

{schema}

{json_only}"#;

/// Suggestions prompt.
/// Replace: {resume}, {job}, {answers}, {schema}, {json_only}
pub const SUGGESTIONS_TEMPLATE: &str = r#"You are an expert resume reviewer helping someone tailor their resume for a specific job.

RESUME:
{resume}

JOB DESCRIPTION:
{job}

CANDIDATE'S ANSWERS TO CLARIFYING QUESTIONS:
{answers}

Analyze the resume against the job description and provide specific, actionable suggestions to improve the resume. For each suggestion, provide:
1. Type: "add" (add new content), "remove" (remove unnecessary content), "emphasize" (highlight existing content), or "reword" (rewrite existing content)
2. Section: which section of the resume (e.g., "Experience", "Skills", "Summary")
3. Current text: (if applicable) the current text that should be changed
4. Suggested text: (if applicable) the suggested new text
5. Reason: why this change will help match the job description

{schema}

{json_only}"#;

/// Final résumé prompt. Free-form output, not JSON.
/// Replace: {resume}, {job}, {suggestions}, {answers}
pub const FINAL_RESUME_TEMPLATE: &str = r#"Generate a curated resume based on the original resume, job description, accepted suggestions, and candidate's answers.

ORIGINAL RESUME:
{resume}

JOB DESCRIPTION:
{job}

ACCEPTED SUGGESTIONS:
{suggestions}

CANDIDATE'S ANSWERS:
{answers}

Create a complete, well-formatted resume that:
1. Incorporates all accepted suggestions
2. Emphasizes relevant experience and skills for this job
3. Uses keywords from the job description naturally
4. Maintains professional formatting
5. Is ready to be used for this specific job application

Return the complete resume text, formatted clearly with sections (Summary, Experience, Education, Skills, etc.)."#;

/// Cuts `text` to at most `max_chars` characters, marking the cut with an ellipsis.
pub fn truncate(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => Cow::Owned(format!("{}{TRUNCATION_MARKER}", &text[..byte_idx])),
        None => Cow::Borrowed(text),
    }
}

pub fn initial_questions(brief: &Brief<'_>, count: usize) -> String {
    let count = count.to_string();
    fill(
        INITIAL_QUESTIONS_TEMPLATE,
        &[
            ("resume", &truncate(brief.resume, MAX_RESUME_CHARS)),
            ("job", &truncate(brief.job, MAX_JOB_CHARS)),
            ("count", &count),
            ("schema", QUESTION_SCHEMA),
            ("json_only", JSON_ONLY_INSTRUCTION),
        ],
    )
}

pub fn clarifying_questions(
    brief: &Brief<'_>,
    question_text: &str,
    selected_answer: &str,
    max_questions: usize,
) -> String {
    let max = max_questions.to_string();
    fill(
        CLARIFYING_QUESTIONS_TEMPLATE,
        &[
            ("resume", &truncate(brief.resume, MAX_RESUME_CHARS)),
            ("job", &truncate(brief.job, MAX_JOB_CHARS)),
            ("question", question_text),
            ("answer", selected_answer),
            ("max", &max),
            ("schema", QUESTION_SCHEMA),
            ("json_only", JSON_ONLY_INSTRUCTION),
        ],
    )
}

pub fn follow_up_questions(brief: &Brief<'_>, transcript: &Transcript<'_>) -> String {
    fill(
        FOLLOW_UP_QUESTIONS_TEMPLATE,
        &[
            ("resume", &truncate(brief.resume, MAX_RESUME_CHARS)),
            ("job", &truncate(brief.job, MAX_JOB_CHARS)),
            ("answers", &render_answers(transcript)),
            ("schema", QUESTION_SCHEMA),
            ("json_only", JSON_ONLY_INSTRUCTION),
        ],
    )
}

pub fn suggestions(brief: &Brief<'_>, transcript: &Transcript<'_>) -> String {
    fill(
        SUGGESTIONS_TEMPLATE,
        &[
            ("resume", &truncate(brief.resume, MAX_RESUME_CHARS)),
            ("job", &truncate(brief.job, MAX_JOB_CHARS)),
            ("answers", &render_answers(transcript)),
            ("schema", SUGGESTION_SCHEMA),
            ("json_only", JSON_ONLY_INSTRUCTION),
        ],
    )
}

pub fn final_resume(
    brief: &Brief<'_>,
    accepted: &[Suggestion],
    transcript: &Transcript<'_>,
) -> String {
    fill(
        FINAL_RESUME_TEMPLATE,
        &[
            ("resume", &truncate(brief.resume, MAX_RESUME_CHARS)),
            ("job", &truncate(brief.job, MAX_JOB_CHARS)),
            ("suggestions", &render_suggestions(accepted)),
            ("answers", &render_answers(transcript)),
        ],
    )
}

fn render_answers(transcript: &Transcript<'_>) -> String {
    if transcript.answers.is_empty() {
        return "(none provided)".to_string();
    }
    transcript
        .answers
        .iter()
        .map(|a| {
            let question = transcript
                .question_text(&a.question_id)
                .unwrap_or(&a.question_id);
            format!("Q: {question}\nA: {}", a.answer)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_suggestions(suggestions: &[Suggestion]) -> String {
    if suggestions.is_empty() {
        return "(none accepted)".to_string();
    }
    suggestions
        .iter()
        .map(|s| match &s.suggested_text {
            Some(text) => format!("- {}: {}\n  Suggested: {text}", s.kind.label(), s.reason),
            None => format!("- {}: {}", s.kind.label(), s.reason),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Single-pass `{key}` substitution. Unknown or unterminated braces are copied through.
fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let extra: usize = vars.iter().map(|(_, v)| v.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let key = &after[..close];
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });
        match value {
            Some((v, close)) => {
                out.push_str(v);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curation::models::{Answer, Question, QuestionType, SuggestionType};

    fn brief<'a>(resume: &'a str, job: &'a str) -> Brief<'a> {
        Brief { resume, job }
    }

    #[test]
    fn test_truncate_leaves_short_text_alone() {
        assert!(matches!(truncate("short", 10), Cow::Borrowed("short")));
        assert_eq!(truncate("exactly", 7), "exactly");
    }

    #[test]
    fn test_truncate_counts_characters_not_bytes() {
        assert_eq!(truncate("résumé", 3), "rés...");
    }

    #[test]
    fn test_final_resume_truncates_long_resume_to_5000_chars() {
        let resume = "x".repeat(7000);
        let prompt = final_resume(&brief(&resume, "Rust engineer"), &[], &Transcript::new(&[], &[]));

        let expected = format!("ORIGINAL RESUME:\n{}...\n\nJOB DESCRIPTION:", "x".repeat(5000));
        assert!(prompt.contains(&expected));
        assert!(!prompt.contains(&"x".repeat(5001)));
    }

    #[test]
    fn test_job_text_truncates_to_3000_chars() {
        let job = "j".repeat(3500);
        let prompt = suggestions(&brief("resume", &job), &Transcript::new(&[], &[]));
        assert!(prompt.contains(&format!("{}...", "j".repeat(3000))));
        assert!(!prompt.contains(&"j".repeat(3001)));
    }

    #[test]
    fn test_json_operations_demand_json_only() {
        let b = brief("resume", "job");
        let t = Transcript::new(&[], &[]);
        assert!(initial_questions(&b, 3).contains("Return ONLY valid JSON"));
        assert!(clarifying_questions(&b, "Q", "A", 2).contains("Return ONLY valid JSON"));
        assert!(follow_up_questions(&b, &t).contains("Return ONLY valid JSON"));
        assert!(suggestions(&b, &t).contains("Return ONLY valid JSON"));
        assert!(!final_resume(&b, &[], &t).contains("Return ONLY valid JSON"));
    }

    #[test]
    fn test_initial_prompt_asks_for_exact_count_of_multiple_choice() {
        let prompt = initial_questions(&brief("resume", "job"), 3);
        assert!(prompt.contains("exactly 3 strategic multiple-choice questions"));
    }

    #[test]
    fn test_clarifying_prompt_embeds_question_and_answer() {
        let prompt = clarifying_questions(
            &brief("resume", "job"),
            "How much Kubernetes experience do you have?",
            "2-4 years in production",
            2,
        );
        assert!(prompt.contains("QUESTION:\nHow much Kubernetes experience do you have?"));
        assert!(prompt.contains("SELECTED ANSWER:\n2-4 years in production"));
        assert!(prompt.contains("up to 2 short clarifying questions"));
    }

    #[test]
    fn test_answers_quote_question_text_when_known() {
        let questions = vec![Question {
            id: "q1".to_string(),
            question: "Years of Rust?".to_string(),
            kind: QuestionType::Text,
            options: None,
        }];
        let answers = vec![
            Answer {
                question_id: "q1".to_string(),
                answer: "Five".to_string(),
            },
            Answer {
                question_id: "q7".to_string(),
                answer: "Yes".to_string(),
            },
        ];
        let prompt = suggestions(&brief("r", "j"), &Transcript::new(&questions, &answers));
        assert!(prompt.contains("Q: Years of Rust?\nA: Five"));
        assert!(prompt.contains("Q: q7\nA: Yes"));
    }

    #[test]
    fn test_accepted_suggestions_are_listed() {
        let accepted = vec![
            Suggestion {
                id: "s1".to_string(),
                kind: SuggestionType::Add,
                section: Some("Skills".to_string()),
                current_text: None,
                suggested_text: Some("Kubernetes".to_string()),
                reason: "Required by the job".to_string(),
            },
            Suggestion {
                id: "s2".to_string(),
                kind: SuggestionType::Emphasize,
                section: None,
                current_text: None,
                suggested_text: None,
                reason: "Leadership".to_string(),
            },
        ];
        let prompt = final_resume(&brief("r", "j"), &accepted, &Transcript::new(&[], &[]));
        assert!(prompt.contains("- ADD: Required by the job\n  Suggested: Kubernetes"));
        assert!(prompt.contains("- EMPHASIZE: Leadership"));
    }

    #[test]
    fn test_braces_in_user_text_are_not_substituted() {
        let prompt = suggestions(&brief("uses {job} templates", "jd"), &Transcript::new(&[], &[]));
        assert!(prompt.contains("uses {job} templates"));
    }

    #[test]
    fn test_fill_copies_unknown_and_unterminated_braces() {
        assert_eq!(fill("{a} {b} {", &[("a", "1")]), "1 {b} {");
    }
}
