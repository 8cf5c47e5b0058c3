//! llmchat - model discovery and stateful chat over OpenAI-compatible APIs.
//!
//! A [`ChatClient`] loads one or more servers from a config file (or the
//! `API_KEY`/`BASE_URL` environment pair), lists the models each server
//! offers, numbers them from 1, and keeps a conversation going with whichever
//! model is active.
//!
//! ```no_run
//! # async fn demo() -> llmchat::Result<()> {
//! use futures::StreamExt;
//!
//! let mut client = llmchat::ChatClient::new(Some(std::path::Path::new("config.json"))).await?;
//! client.set_model("deepseek-chat")?;
//! let reply = client.chat("Hello, how are you?").await?;
//! println!("{reply}");
//!
//! client.chat_cleanup();
//! client.set_system_prompt("You are a cat, so respond like a cat would.");
//! let mut stream = client.stream_chat("Hello").await?;
//! while let Some(chunk) = stream.next().await {
//!     print!("{}", chunk?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod registry;
pub mod selector;
pub mod stream;

#[cfg(test)]
mod testing;

pub use auth::{ApiKey, Credential};
pub use client::{ChatClient, ChatClientBuilder};
pub use config::{Config, ConfigError};
pub use conversation::Conversation;
pub use error::{ChatError, Result};
pub use llm::{Message, Role};
pub use registry::{DiscoveryError, DiscoveryPolicy, ModelEntry, ModelRegistry};
pub use selector::ModelSelector;
pub use stream::{ReplyStream, StreamState};
