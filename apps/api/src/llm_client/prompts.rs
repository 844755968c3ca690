// Shared prompt constants and prompt-building utilities.
// Each operation's full template lives in curation/prompts.rs.
// This file contains cross-cutting prompt fragments.

/// Closing instruction for every prompt whose output goes through the normalizer.
pub const JSON_ONLY_INSTRUCTION: &str = "Return ONLY valid JSON, no other text.";

/// Shape of a question object, shared by every question-producing prompt.
pub const QUESTION_SCHEMA: &str = "\
Return your questions as a JSON array where each question has:
- id: a unique identifier
- question: the question text
- type: \"text\", \"textarea\", or \"multiple-choice\"
- options: (optional) array of options if type is \"multiple-choice\"";

/// Shape of a suggestion object.
pub const SUGGESTION_SCHEMA: &str = "\
Return your suggestions as a JSON array where each suggestion has:
- id: a unique identifier
- type: \"add\" | \"remove\" | \"emphasize\" | \"reword\"
- section: (optional) the resume section
- currentText: (optional) current text to change
- suggestedText: (optional) suggested new text
- reason: explanation of why this suggestion helps";
