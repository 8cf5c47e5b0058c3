//! Streaming replies that commit to history once the upstream finishes.
//!
//! A [`ReplyStream`] yields content chunks as they arrive. When the upstream
//! signals completion the concatenated chunks are appended to the
//! conversation as one assistant message and the stream becomes exhausted.
//! Dropping the stream before that point leaves the conversation without the
//! assistant turn. An upstream error is yielded once and also exhausts the
//! stream without touching history.

use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::stream::FusedStream;
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::conversation::Conversation;
use crate::error::ChatError;
use crate::llm::{ChatStream, Role, StreamEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Streaming,
    Exhausted,
}

pub struct ReplyStream<'a> {
    inner: ChatStream,
    conversation: &'a mut Conversation,
    reply: String,
    state: StreamState,
}

impl<'a> ReplyStream<'a> {
    pub(crate) fn new(inner: ChatStream, conversation: &'a mut Conversation) -> Self {
        Self {
            inner,
            conversation,
            reply: String::new(),
            state: StreamState::Streaming,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == StreamState::Exhausted
    }

    /// Text received so far. Empty again once the reply has been committed.
    pub fn partial_reply(&self) -> &str {
        &self.reply
    }

    /// Drain the stream and return the full reply.
    pub async fn collect_reply(mut self) -> Result<String, ChatError> {
        let mut reply = String::new();
        while let Some(chunk) = self.next().await {
            reply.push_str(&chunk?);
        }
        Ok(reply)
    }

    fn commit(&mut self) {
        let reply = mem::take(&mut self.reply);
        debug!(chars = reply.len(), "Stream finished, recording assistant reply");
        self.conversation.append(Role::Assistant, reply);
        self.state = StreamState::Exhausted;
    }
}

impl Stream for ReplyStream<'_> {
    type Item = Result<String, ChatError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.state == StreamState::Exhausted {
            return Poll::Ready(None);
        }

        match ready!(this.inner.as_mut().poll_next(cx)) {
            Some(Ok(StreamEvent::Token(text))) => {
                this.reply.push_str(&text);
                Poll::Ready(Some(Ok(text)))
            }
            Some(Ok(StreamEvent::Done { .. })) | None => {
                this.commit();
                Poll::Ready(None)
            }
            Some(Err(e)) => {
                this.state = StreamState::Exhausted;
                Poll::Ready(Some(Err(ChatError::ChatRequest(e))))
            }
        }
    }
}

impl FusedStream for ReplyStream<'_> {
    fn is_terminated(&self) -> bool {
        self.is_exhausted()
    }
}
