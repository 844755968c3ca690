//! Résumé file to plain text.

use std::io::{Cursor, Read};
use std::sync::LazyLock;

use bytes::Bytes;
use regex::Regex;
use tracing::{info, warn};
use zip::ZipArchive;

use super::{decode_entities, InputError};

const PDF_MIME: &str = "application/pdf";
const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Text runs, tabs, breaks and paragraph ends in `word/document.xml`.
static DOCX_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|<w:tab\s*/>|<w:br\b[^>]*/>|</w:p>|<w:p\s*/>").unwrap()
});
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
}

impl DocumentFormat {
    /// Content type first, file extension as fallback.
    pub fn detect(content_type: Option<&str>, file_name: &str) -> Option<Self> {
        let name = file_name.to_ascii_lowercase();
        match content_type {
            Some(PDF_MIME) => Some(DocumentFormat::Pdf),
            Some(DOCX_MIME) => Some(DocumentFormat::Docx),
            _ if name.ends_with(".pdf") => Some(DocumentFormat::Pdf),
            _ if name.ends_with(".docx") => Some(DocumentFormat::Docx),
            _ => None,
        }
    }
}

/// Extracts the text of an uploaded résumé. Blank results are an error.
pub async fn extract_text(
    bytes: Bytes,
    content_type: Option<&str>,
    file_name: &str,
) -> Result<String, InputError> {
    let format = DocumentFormat::detect(content_type, file_name).ok_or_else(|| {
        InputError::UnsupportedFormat(content_type.unwrap_or(file_name).to_string())
    })?;

    // Both parsers are CPU-bound, and the PDF parser may panic on malformed input.
    let text = tokio::task::spawn_blocking(move || match format {
        DocumentFormat::Pdf => pdf_text(&bytes),
        DocumentFormat::Docx => docx_text(&bytes),
    })
    .await
    .map_err(|e| {
        warn!("Text extraction task failed for {file_name}: {e}");
        InputError::ExtractionFailed(format!("the {format:?} parser crashed"))
    })??;

    if text.trim().is_empty() {
        return Err(InputError::Empty);
    }
    info!(
        "Extracted {} chars from {file_name} ({format:?})",
        text.chars().count()
    );
    Ok(text)
}

fn pdf_text(bytes: &[u8]) -> Result<String, InputError> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| InputError::ExtractionFailed(format!("Failed to parse PDF file: {e}")))
}

fn docx_text(bytes: &[u8]) -> Result<String, InputError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| InputError::ExtractionFailed(format!("Not a valid DOCX file: {e}")))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| InputError::ExtractionFailed(format!("DOCX has no document body: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| InputError::ExtractionFailed(format!("Failed to read DOCX body: {e}")))?;

    Ok(document_xml_to_text(&xml))
}

fn document_xml_to_text(xml: &str) -> String {
    let mut text = String::with_capacity(xml.len() / 4);
    for token in DOCX_TOKEN.captures_iter(xml) {
        if let Some(run) = token.get(1) {
            text.push_str(&decode_entities(run.as_str()));
            continue;
        }
        let whole = &token[0];
        if whole.starts_with("<w:tab") {
            text.push('\t');
        } else {
            text.push('\n');
        }
    }

    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    BLANK_RUNS
        .replace_all(lines.join("\n").trim(), "\n\n")
        .into_owned()
}
