use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

/// Which hosted LLM API the gateway talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl Provider {
    /// Name of the provider-specific credential variable.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    /// Where a user obtains a key for this provider.
    pub fn console_url(&self) -> &'static str {
        match self {
            Provider::OpenAi => "platform.openai.com",
            Provider::Anthropic => "console.anthropic.com",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-3.5-turbo",
            Provider::Anthropic => "claude-3-opus-20240229",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAi => f.write_str("openai"),
            Provider::Anthropic => f.write_str("anthropic"),
        }
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            other => bail!("Unsupported AI_PROVIDER '{other}' (expected 'openai' or 'anthropic')"),
        }
    }
}

/// Everything the LLM gateway needs. Built once and handed to `LlmClient::from_config`.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: Provider,
    /// `None` leaves the gateway uninitialized; calls then fail with `CredentialMissing`.
    pub api_key: Option<String>,
    pub model: String,
    /// Overrides the provider's public endpoint (proxies, tests).
    pub base_url: Option<String>,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub port: u16,
    pub rust_log: String,
    /// Whole-request cap. The default covers five sequential model calls,
    /// the longest chain a single answer can trigger.
    pub request_timeout_secs: u64,
    /// Idle time after which a session is evicted.
    pub session_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match var("AI_PROVIDER") {
            Some(raw) => raw.parse::<Provider>()?,
            None => Provider::OpenAi,
        };

        let api_key = var(provider.api_key_var()).or_else(|| var("AI_API_KEY"));
        let model = var("AI_MODEL").unwrap_or_else(|| provider.default_model().to_string());
        let base_url = match provider {
            Provider::OpenAi => var("OPENAI_BASE_URL"),
            Provider::Anthropic => var("ANTHROPIC_BASE_URL"),
        };

        Ok(Config {
            llm: LlmConfig {
                provider,
                api_key,
                model,
                base_url,
            },
            port: var("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            request_timeout_secs: var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|| "600".to_string())
                .parse::<u64>()
                .context("REQUEST_TIMEOUT_SECS must be a whole number of seconds")?,
            session_ttl_secs: var("SESSION_TTL_SECS")
                .unwrap_or_else(|| "3600".to_string())
                .parse::<u64>()
                .context("SESSION_TTL_SECS must be a whole number of seconds")?,
        })
    }
}
