use std::time::Duration;

use reqwest::Client;

use crate::config::Config;
use crate::curation::conversation::Limits;
use crate::curation::curator::Curator;
use crate::curation::engine::ConversationEngine;
use crate::llm_client::LlmClient;
use crate::sessions::SessionStore;

/// Timeout for job posting fetches.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub curator: Curator,
    pub engine: ConversationEngine,
    pub sessions: SessionStore,
    /// Client for job posting fetches. Model calls use the LLM client's own.
    pub http: Client,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config, llm: LlmClient) -> Self {
        let curator = Curator::new(llm, Limits::default());
        let http = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            engine: ConversationEngine::new(curator.clone()),
            curator,
            sessions: SessionStore::new(Duration::from_secs(config.session_ttl_secs)),
            http,
            config,
        }
    }
}
