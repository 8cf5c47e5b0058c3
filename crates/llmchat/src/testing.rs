//! In-memory provider used by unit tests.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::auth::Credential;
use crate::llm::{
    ChatRequest, ChatResponse, ChatStream, Choice, LLMError, LLMProvider, RemoteModel,
    ResponseMessage, Role, StreamEvent,
};
use crate::registry::Backend;

/// Replies with a canned text, streamed word by word, and records requests.
pub(crate) struct MockProvider {
    models: Mutex<Vec<RemoteModel>>,
    discovery_fails: AtomicBool,
    reply: Mutex<String>,
    chat_error: Mutex<Option<LLMError>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            models: Mutex::new(Vec::new()),
            discovery_fails: AtomicBool::new(false),
            reply: Mutex::new("ok".to_string()),
            chat_error: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl MockProvider {
    pub(crate) fn with_models(models: &[(&str, &str)]) -> Self {
        let provider = Self::default();
        provider.set_models(
            models
                .iter()
                .map(|(id, owner)| RemoteModel {
                    id: id.to_string(),
                    owned_by: Some(owner.to_string()),
                })
                .collect(),
        );
        provider
    }

    pub(crate) fn unreachable() -> Self {
        let provider = Self::default();
        provider.fail_discovery();
        provider
    }

    pub(crate) fn set_models(&self, models: Vec<RemoteModel>) {
        *self.models.lock().unwrap() = models;
    }

    pub(crate) fn fail_discovery(&self) {
        self.discovery_fails.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_reply(&self, reply: &str) {
        *self.reply.lock().unwrap() = reply.to_string();
    }

    /// Fail the next chat call with `err`.
    pub(crate) fn fail_chat_with(&self, err: LLMError) {
        *self.chat_error.lock().unwrap() = Some(err);
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, request: ChatRequest) -> Result<String, LLMError> {
        self.requests.lock().unwrap().push(request);
        match self.chat_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(self.reply.lock().unwrap().clone()),
        }
    }
}

#[async_trait]
impl LLMProvider for MockProvider {
    async fn list_models(&self) -> Result<Vec<RemoteModel>, LLMError> {
        if self.discovery_fails.load(Ordering::SeqCst) {
            return Err(LLMError::Api {
                status: 503,
                message: "unreachable".to_string(),
            });
        }
        Ok(self.models.lock().unwrap().clone())
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        let reply = self.record(request)?;
        Ok(ChatResponse {
            id: "mock-1".to_string(),
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: Role::Assistant,
                    content: Some(reply),
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: None,
        })
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, LLMError> {
        let reply = self.record(request)?;
        let mut events: Vec<Result<StreamEvent, LLMError>> = reply
            .split_inclusive(' ')
            .map(|word| Ok(StreamEvent::Token(word.to_string())))
            .collect();
        events.push(Ok(StreamEvent::Done { usage: None }));
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

pub(crate) fn credential(name: &str) -> Credential {
    Credential::new(name, format!("https://{name}.example/v1"), "test-key")
}

pub(crate) fn backend(name: &str, provider: MockProvider) -> Backend {
    Backend::new(credential(name), Arc::new(provider))
}
