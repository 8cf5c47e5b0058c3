//! LLM provider trait.

use async_trait::async_trait;

use super::error::LLMError;
use super::types::{ChatRequest, ChatResponse, ChatStream, RemoteModel};

/// A chat completion backend bound to one endpoint and credential.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// List the models the endpoint exposes, in the order it reports them.
    async fn list_models(&self) -> Result<Vec<RemoteModel>, LLMError>;

    /// Make a blocking chat completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError>;

    /// Make a streaming chat completion request.
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, LLMError>;
}
