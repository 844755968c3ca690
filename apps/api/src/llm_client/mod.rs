/// LLM client. The single point of entry for all model calls in the curator.
///
/// ARCHITECTURAL RULE: No other module may call a provider API directly.
/// All LLM interactions MUST go through `LlmClient`.
///
/// The provider is chosen from an explicit `LlmConfig` at construction, so
/// several clients (one per test, one per provider) can coexist.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::{LlmConfig, Provider};

pub mod anthropic;
pub mod openai;
pub mod prompts;
#[cfg(test)]
pub mod testing;

pub use anthropic::AnthropicBackend;
pub use openai::OpenAiBackend;

/// Output budget for question generation (initial, clarifying, follow-up).
pub const QUESTION_MAX_TOKENS: u32 = 2000;
/// Output budget for suggestion generation.
pub const SUGGESTION_MAX_TOKENS: u32 = 4000;
/// Haiku-class models cap output at 4096 tokens.
const CONSTRAINED_RESUME_MAX_TOKENS: u32 = 4096;
const RESUME_MAX_TOKENS: u32 = 8000;

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("AI client not initialized. Please set {env_var}.")]
    NotInitialized {
        provider: Provider,
        env_var: &'static str,
    },

    #[error("Invalid API key. Please check your {env_var}: {message}")]
    Unauthenticated {
        provider: Provider,
        env_var: &'static str,
        message: String,
    },

    #[error("{provider} quota exceeded: {message}")]
    QuotaExceeded { provider: Provider, message: String },

    #[error("{provider} API error: {message}")]
    Provider {
        provider: Provider,
        status: Option<u16>,
        message: String,
    },
}

impl LlmError {
    /// Maps a non-success provider response onto the gateway taxonomy.
    pub(crate) fn from_status(provider: Provider, status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ProviderErrorEnvelope>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.to_string());

        match status {
            401 => LlmError::Unauthenticated {
                provider,
                env_var: provider.api_key_var(),
                message,
            },
            429 => LlmError::QuotaExceeded { provider, message },
            _ => LlmError::Provider {
                provider,
                status: Some(status),
                message,
            },
        }
    }

    pub(crate) fn transport(provider: Provider, err: reqwest::Error) -> Self {
        LlmError::Provider {
            provider,
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Both providers wrap failures as `{"error": {"message": ...}}`.
#[derive(Debug, Deserialize)]
struct ProviderErrorEnvelope {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

/// One chat/completion capability: a single user prompt in, text out.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn provider(&self) -> Provider;

    fn model(&self) -> &str;

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError>;
}

/// Stand-in backend when no credential is configured. Every call fails with
/// `NotInitialized`, naming the variable the operator has to set.
struct UninitializedBackend {
    provider: Provider,
    model: String,
}

#[async_trait]
impl CompletionBackend for UninitializedBackend {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String, LlmError> {
        Err(LlmError::NotInitialized {
            provider: self.provider,
            env_var: self.provider.api_key_var(),
        })
    }
}

/// The single LLM client shared by every curation operation.
#[derive(Clone)]
pub struct LlmClient {
    backend: Arc<dyn CompletionBackend>,
}

impl LlmClient {
    pub fn from_config(config: &LlmConfig) -> Self {
        let backend: Arc<dyn CompletionBackend> = match (config.provider, &config.api_key) {
            (provider, None) => Arc::new(UninitializedBackend {
                provider,
                model: config.model.clone(),
            }),
            (Provider::OpenAi, Some(key)) => Arc::new(OpenAiBackend::new(
                http_client(),
                key.clone(),
                config.model.clone(),
                config.base_url.clone(),
            )),
            (Provider::Anthropic, Some(key)) => Arc::new(AnthropicBackend::new(
                http_client(),
                key.clone(),
                config.model.clone(),
                config.base_url.clone(),
            )),
        };

        Self { backend }
    }

    #[cfg(test)]
    pub fn with_backend(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    pub fn provider(&self) -> Provider {
        self.backend.provider()
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// Sends `prompt` as a single user message. No retries: failures go straight
    /// back to the caller, which decides whether to surface or swallow them.
    pub async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        debug!(
            "LLM call: provider={} model={} prompt_chars={} max_tokens={}",
            self.provider(),
            self.model(),
            prompt.chars().count(),
            max_tokens
        );
        self.backend.complete(prompt, max_tokens).await
    }

    /// Output budget for final résumé synthesis on the active model.
    pub fn resume_max_tokens(&self) -> u32 {
        resume_token_budget(self.model())
    }
}

/// Never request more output than the model can produce.
pub fn resume_token_budget(model: &str) -> u32 {
    if model.to_ascii_lowercase().contains("haiku") {
        CONSTRAINED_RESUME_MAX_TOKENS
    } else {
        RESUME_MAX_TOKENS
    }
}

fn http_client() -> Client {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .expect("Failed to build HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_budget_respects_constrained_models() {
        assert_eq!(resume_token_budget("claude-3-haiku-20240307"), 4096);
        assert_eq!(resume_token_budget("claude-3-opus-20240229"), 8000);
        assert_eq!(resume_token_budget("gpt-3.5-turbo"), 8000);
    }

    #[test]
    fn test_status_401_maps_to_unauthenticated_with_env_var() {
        let body = r#"{"error": {"message": "Incorrect API key provided"}}"#;
        match LlmError::from_status(Provider::OpenAi, 401, body) {
            LlmError::Unauthenticated {
                env_var, message, ..
            } => {
                assert_eq!(env_var, "OPENAI_API_KEY");
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("expected Unauthenticated, got {other:?}"),
        }
    }

    #[test]
    fn test_status_429_maps_to_quota_exceeded() {
        let err = LlmError::from_status(Provider::Anthropic, 429, "slow down");
        assert!(matches!(err, LlmError::QuotaExceeded { ref message, .. } if message == "slow down"));
    }

    #[test]
    fn test_other_status_is_provider_error() {
        let err = LlmError::from_status(Provider::OpenAi, 404, "model does not exist");
        assert!(matches!(err, LlmError::Provider { status: Some(404), .. }));
    }

    #[tokio::test]
    async fn test_missing_credential_yields_not_initialized() {
        let client = LlmClient::from_config(&LlmConfig {
            provider: Provider::Anthropic,
            api_key: None,
            model: "claude-3-opus-20240229".to_string(),
            base_url: None,
        });

        let err = client.complete("hello", 10).await.unwrap_err();
        assert!(matches!(
            err,
            LlmError::NotInitialized {
                env_var: "ANTHROPIC_API_KEY",
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "AI client not initialized. Please set ANTHROPIC_API_KEY."
        );
    }

    #[test]
    fn test_client_reports_configured_model() {
        let client = LlmClient::from_config(&LlmConfig {
            provider: Provider::OpenAi,
            api_key: Some("sk-test".to_string()),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
        });
        assert_eq!(client.model(), "gpt-4o-mini");
        assert_eq!(client.provider(), Provider::OpenAi);
        assert_eq!(client.resume_max_tokens(), 8000);
    }
}
