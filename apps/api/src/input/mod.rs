// Turning uploads and links into plain text: résumé files (PDF, DOCX) and
// job posting pages.

pub mod extract;
pub mod handlers;
pub mod job_fetch;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Unsupported file type: {0}. Please upload a PDF or DOCX file.")]
    UnsupportedFormat(String),

    #[error("Failed to extract text: {0}")]
    ExtractionFailed(String),

    #[error("Could not extract text from the file")]
    Empty,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to fetch job description: {0}")]
    Fetch(String),
}

/// Decodes the handful of entities that show up in document and page text.
/// `&amp;` goes last so `&amp;lt;` stays `&lt;`.
pub(crate) fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
