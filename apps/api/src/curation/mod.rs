// Résumé curation: prompts, model calls, output recovery and the
// conversation that strings them together.
// All LLM calls go through llm_client; nothing here talks to a provider directly.

pub mod conversation;
pub mod curator;
pub mod engine;
pub mod handlers;
pub mod models;
pub mod normalizer;
pub mod prompts;
