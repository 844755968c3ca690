//! Job posting URL to plain text.

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use reqwest::{Client, Url};
use tracing::{info, warn};

use super::{decode_entities, InputError};
use crate::curation::models::JobDescription;

/// Some job boards refuse requests without a browser-like agent.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());
static STYLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<title[^>]*>([^<]+)</title>").unwrap());
static SITE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+property=["']og:site_name["'][^>]*content=["']([^"']+)["']"#)
        .unwrap()
});

pub async fn fetch_job_description(client: &Client, url: &str) -> Result<JobDescription, InputError> {
    let parsed = Url::parse(url.trim()).map_err(|e| InputError::InvalidUrl(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(InputError::InvalidUrl(format!(
            "unsupported scheme {:?}",
            parsed.scheme()
        )));
    }

    let response = client
        .get(parsed.clone())
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .send()
        .await
        .map_err(|e| InputError::Fetch(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        warn!("Job posting fetch returned {status} for {parsed}");
        return Err(InputError::Fetch(format!("Failed to fetch URL: {status}")));
    }

    let html = response
        .text()
        .await
        .map_err(|e| InputError::Fetch(e.to_string()))?;

    let text = html_to_text(&html);
    if text.is_empty() {
        return Err(InputError::Fetch("the page contains no readable text".to_string()));
    }

    let job = JobDescription {
        url: parsed.to_string(),
        title: capture(&TITLE, &html),
        company: capture(&SITE_NAME, &html),
        text,
        fetched_at: Utc::now(),
    };
    info!(
        "Fetched job posting {} ({} chars, title={:?})",
        job.url,
        job.text.chars().count(),
        job.title
    );
    Ok(job)
}

/// Drops scripts, styles and markup, then collapses whitespace.
pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT_BLOCK.replace_all(html, "");
    let text = STYLE_BLOCK.replace_all(&text, "");
    let text = TAG.replace_all(&text, " ");
    let text = decode_entities(&text);
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

fn capture(pattern: &Regex, html: &str) -> Option<String> {
    pattern
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| decode_entities(m.as_str().trim()))
        .filter(|s| !s.is_empty())
}
