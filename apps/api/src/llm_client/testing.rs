//! In-memory backends for exercising the curator without a network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{CompletionBackend, LlmClient, LlmError};
use crate::config::Provider;

type Responder = Box<dyn Fn(&str) -> Result<String, LlmError> + Send + Sync>;

/// Answers each call either from a FIFO script or from a prompt-matching closure,
/// and records every prompt it was sent.
pub struct ScriptedBackend {
    model: String,
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    responder: Option<Responder>,
    calls: Mutex<Vec<RecordedCall>>,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub max_tokens: u32,
}

impl ScriptedBackend {
    pub fn queue<I>(model: &str, replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = Result<String, LlmError>>,
    {
        Arc::new(Self {
            model: model.to_string(),
            script: Mutex::new(replies.into_iter().collect()),
            responder: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn responding<F>(model: &str, responder: F) -> Arc<Self>
    where
        F: Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            model: model.to_string(),
            script: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(responder)),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn client(backend: &Arc<Self>) -> LlmClient {
        LlmClient::with_backend(backend.clone())
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(RecordedCall {
            prompt: prompt.to_string(),
            max_tokens,
        });

        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        match &self.responder {
            Some(responder) => responder(prompt),
            None => Err(LlmError::Provider {
                provider: Provider::OpenAi,
                status: None,
                message: "scripted backend has no reply left".to_string(),
            }),
        }
    }
}

pub fn quota_error() -> LlmError {
    LlmError::QuotaExceeded {
        provider: Provider::OpenAi,
        message: "You exceeded your current quota".to_string(),
    }
}
