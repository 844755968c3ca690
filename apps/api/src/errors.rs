use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::config::Provider;
use crate::curation::conversation::TransitionError;
use crate::curation::normalizer::NormalizeError;
use crate::input::InputError;
use crate::llm_client::LlmError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("AI client not initialized. Please set {env_var}.")]
    CredentialMissing {
        provider: Provider,
        env_var: &'static str,
    },

    #[error("Invalid API key. Please check your {env_var}.")]
    CredentialInvalid {
        provider: Provider,
        env_var: &'static str,
        message: String,
    },

    #[error("{provider} quota exceeded: {message}")]
    QuotaExceeded { provider: Provider, message: String },

    #[error("Invalid model output: {0}")]
    InvalidModelOutput(String),

    #[error("{0}")]
    UnsupportedInputFormat(String),

    #[error("{0}")]
    ExtractionFailed(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("Request timed out after {0} seconds")]
    RequestTimeout(u64),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<LlmError> for AppError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::NotInitialized { provider, env_var } => {
                AppError::CredentialMissing { provider, env_var }
            }
            LlmError::Unauthenticated {
                provider,
                env_var,
                message,
            } => AppError::CredentialInvalid {
                provider,
                env_var,
                message,
            },
            LlmError::QuotaExceeded { provider, message } => {
                AppError::QuotaExceeded { provider, message }
            }
            other @ LlmError::Provider { .. } => AppError::Provider(other.to_string()),
        }
    }
}

impl From<NormalizeError> for AppError {
    fn from(err: NormalizeError) -> Self {
        AppError::InvalidModelOutput(err.to_string())
    }
}

impl From<InputError> for AppError {
    fn from(err: InputError) -> Self {
        match err {
            InputError::UnsupportedFormat(_) => AppError::UnsupportedInputFormat(err.to_string()),
            InputError::ExtractionFailed(_) | InputError::Empty => {
                AppError::ExtractionFailed(err.to_string())
            }
            InputError::InvalidUrl(_) => AppError::Validation(err.to_string()),
            InputError::Fetch(_) => AppError::Provider(err.to_string()),
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::UnknownQuestion(_) | TransitionError::UnknownSuggestion(_) => {
                AppError::NotFound(err.to_string())
            }
            TransitionError::BlankAnswer => AppError::Validation(err.to_string()),
            _ => AppError::InvalidTransition(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, suggestion) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                None,
            ),
            AppError::CredentialMissing { provider, env_var } => (
                StatusCode::UNAUTHORIZED,
                "CREDENTIAL_MISSING",
                self.to_string(),
                Some(format!(
                    "Get your API key from {} and set {env_var} in the server environment.",
                    provider.console_url()
                )),
            ),
            AppError::CredentialInvalid {
                provider,
                env_var,
                message,
            } => {
                tracing::warn!("{provider} rejected the configured credential: {message}");
                (
                    StatusCode::UNAUTHORIZED,
                    "CREDENTIAL_INVALID",
                    self.to_string(),
                    Some(format!(
                        "Check the value of {env_var} or create a new key at {}.",
                        provider.console_url()
                    )),
                )
            }
            AppError::QuotaExceeded { provider, .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "QUOTA_EXCEEDED",
                self.to_string(),
                Some(format!(
                    "Check your {provider} plan and billing details, wait a moment and retry, \
                     or switch AI_PROVIDER to another provider."
                )),
            ),
            AppError::InvalidModelOutput(msg) => {
                tracing::warn!("Invalid model output: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "INVALID_MODEL_OUTPUT",
                    "Failed to parse AI response".to_string(),
                    Some("The AI returned an invalid response. Please try again.".to_string()),
                )
            }
            AppError::UnsupportedInputFormat(msg) => (
                StatusCode::BAD_REQUEST,
                "UNSUPPORTED_INPUT_FORMAT",
                msg.clone(),
                None,
            ),
            AppError::ExtractionFailed(msg) => (
                StatusCode::BAD_REQUEST,
                "EXTRACTION_FAILED",
                msg.clone(),
                Some(
                    "If this is a scanned PDF, convert your resume to DOCX and try again."
                        .to_string(),
                ),
            ),
            AppError::Provider(msg) => {
                tracing::error!("Provider error: {msg}");
                (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", msg.clone(), None)
            }
            AppError::InvalidTransition(msg) => (
                StatusCode::CONFLICT,
                "INVALID_TRANSITION",
                msg.clone(),
                None,
            ),
            AppError::RequestTimeout(_) => (
                StatusCode::REQUEST_TIMEOUT,
                "REQUEST_TIMEOUT",
                self.to_string(),
                Some(
                    "The AI provider is responding slowly. Your progress is saved; \
                     retry the last step or advance the session."
                        .to_string(),
                ),
            ),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    None,
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(suggestion) = suggestion {
            error["suggestion"] = json!(suggestion);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
