//! Errors surfaced by [`ChatClient`](crate::ChatClient).

use thiserror::Error;

use crate::config::ConfigError;
use crate::llm::LLMError;
use crate::registry::DiscoveryError;
use crate::selector::ModelSelector;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    /// No usable credentials could be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A server's model listing failed.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// The selector matched no registry entry.
    #[error("model not found: {0}")]
    NotFound(ModelSelector),

    /// A chat call was made while the registry is empty.
    #[error("no model selected")]
    NoModelSelected,

    /// Transport or endpoint failure during a chat call.
    #[error("chat request failed: {0}")]
    ChatRequest(#[from] LLMError),
}
