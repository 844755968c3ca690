//! Axum route handlers for résumé upload and job posting fetch.

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::curation::models::{JobDescription, Resume};
use crate::errors::AppError;
use crate::input::extract::extract_text;
use crate::input::job_fetch::fetch_job_description;
use crate::state::AppState;

/// Upload size cap for résumé files.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub resume: Resume,
}

#[derive(Debug, Deserialize)]
pub struct FetchJobRequest {
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchJobResponse {
    pub job_description: JobDescription,
}

/// Reads the `file` field of a multipart body and extracts its text.
pub async fn read_resume_upload(mut multipart: Multipart) -> Result<Resume, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("resume").to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Invalid file: {e}")))?;

        info!(
            "Received resume upload {file_name:?} ({} bytes, {:?})",
            data.len(),
            content_type
        );
        let text = extract_text(data, content_type.as_deref(), &file_name).await?;
        return Ok(Resume::new(text, file_name));
    }

    Err(AppError::Validation("No file provided".to_string()))
}

/// Resolves a job URL, rejecting a missing or blank one.
pub async fn fetch_job(state: &AppState, url: Option<&str>) -> Result<JobDescription, AppError> {
    let url = url
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::Validation("URL is required".to_string()))?;
    Ok(fetch_job_description(&state.http, url).await?)
}

/// POST /api/resume/upload
pub async fn handle_upload_resume(multipart: Multipart) -> Result<Json<UploadResponse>, AppError> {
    let resume = read_resume_upload(multipart).await?;
    Ok(Json(UploadResponse { resume }))
}

/// POST /api/jd/fetch
pub async fn handle_fetch_job(
    State(state): State<AppState>,
    Json(request): Json<FetchJobRequest>,
) -> Result<Json<FetchJobResponse>, AppError> {
    let job_description = fetch_job(&state, request.url.as_deref()).await?;
    Ok(Json(FetchJobResponse { job_description }))
}
