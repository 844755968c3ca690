use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns service status plus the configured provider and model.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let llm = state.curator.llm();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": env!("CARGO_PKG_NAME"),
        "provider": llm.provider().to_string(),
        "model": llm.model(),
        "llmConfigured": state.config.llm.api_key.is_some(),
        "sessions": state.sessions.len().await
    }))
}
