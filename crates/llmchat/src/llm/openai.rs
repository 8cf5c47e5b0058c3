//! OpenAI-compatible LLM provider.
//!
//! Works with OpenAI, DeepSeek, OpenRouter, Ollama, and other compatible APIs.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::Client;
use tracing::debug;

use super::error::{LLMError, error_for_response};
use super::provider::LLMProvider;
use super::types::{
    ChatRequest, ChatResponse, ChatStream, ModelList, RemoteModel, StreamEvent, Usage,
};
use crate::auth::ApiKey;

/// OpenAI-compatible provider bound to one base URL and key.
pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    api_key: ApiKey,
}

impl OpenAICompatibleProvider {
    #[must_use]
    pub fn new(client: Client, base_url: &str, api_key: ApiKey) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let key = self.api_key.expose_secret();
        if key.is_empty() {
            builder
        } else {
            builder.header("Authorization", format!("Bearer {key}"))
        }
    }

    fn post_completions(&self, body: &impl serde::Serialize) -> reqwest::RequestBuilder {
        let url = format!("{}/chat/completions", self.base_url);
        self.authorize(
            self.client
                .post(url)
                .header("Content-Type", "application/json"),
        )
        .json(body)
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn list_models(&self) -> Result<Vec<RemoteModel>, LLMError> {
        let url = format!("{}/models", self.base_url);
        let response = self.authorize(self.client.get(&url)).send().await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        let body = response.text().await?;
        let list: ModelList = serde_json::from_str(&body)?;
        debug!(url = %url, count = list.data.len(), "Listed models");
        Ok(list.data)
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        let response = self.post_completions(&request).send().await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, LLMError> {
        let stream_request = StreamRequest {
            request,
            stream: true,
        };

        let response = self.post_completions(&stream_request).send().await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        let byte_stream = response.bytes_stream();
        Ok(Box::pin(StreamParser::new(byte_stream)))
    }
}

// ============================================================================
// Streaming
// ============================================================================

#[derive(serde::Serialize)]
struct StreamRequest {
    #[serde(flatten)]
    request: ChatRequest,
    stream: bool,
}

/// Turns an SSE byte stream of completion chunks into [`StreamEvent`]s.
///
/// Lines are split on raw bytes so multi-byte characters straddling two
/// network chunks are decoded intact.
pub(crate) struct StreamParser<S> {
    inner: S,
    buffer: Vec<u8>,
    eof: bool,
    done: bool,
}

impl<S> StreamParser<S> {
    pub(crate) fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            eof: false,
            done: false,
        }
    }

    fn next_line(&mut self) -> Option<String> {
        let line_end = self.buffer.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

impl<S, E> Stream for StreamParser<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<LLMError>,
{
    type Item = Result<StreamEvent, LLMError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        loop {
            if let Some(line) = self.next_line() {
                let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
                    continue;
                };

                if data == "[DONE]" {
                    self.done = true;
                    return Poll::Ready(Some(Ok(StreamEvent::Done { usage: None })));
                }

                let chunk = match serde_json::from_str::<StreamChunk>(data) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        debug!(error = %e, "Unparseable stream chunk");
                        self.done = true;
                        return Poll::Ready(Some(Err(e.into())));
                    }
                };

                if let Some(error) = chunk.error {
                    self.done = true;
                    return Poll::Ready(Some(Err(LLMError::Stream(error.message))));
                }

                if let Some(choice) = chunk.choices.first()
                    && let Some(ref content) = choice.delta.content
                    && !content.is_empty()
                {
                    return Poll::Ready(Some(Ok(StreamEvent::Token(content.clone()))));
                }
                continue;
            }

            if self.eof {
                self.done = true;
                return Poll::Ready(Some(Ok(StreamEvent::Done { usage: None })));
            }

            // Need more data
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    self.buffer.extend_from_slice(&bytes);
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(e.into())));
                }
                Poll::Ready(None) => {
                    self.eof = true;
                    if !self.buffer.is_empty() {
                        self.buffer.push(b'\n');
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    #[allow(dead_code)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<StreamErrorBody>,
}

/// In-band error frame: `data: {"error": {"message": ...}}`.
#[derive(serde::Deserialize)]
struct StreamErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(serde::Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(serde::Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
