//! Model registry: every model reachable through the configured servers.
//!
//! Discovery walks the backends in configuration order and numbers the
//! models it finds with one running counter, so ids are unique and
//! contiguous from 1 within a registry snapshot.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::{ApiKey, Credential};
use crate::llm::{LLMError, LLMProvider};
use crate::selector::ModelSelector;

/// What to do when one server's model listing fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryPolicy {
    /// Fail discovery on the first unreachable or malformed server.
    #[default]
    Abort,
    /// Log the failure and keep going with the remaining servers.
    Skip,
}

#[derive(Debug, Error)]
#[error("model discovery failed for server '{server}': {source}")]
pub struct DiscoveryError {
    pub server: String,
    #[source]
    pub source: LLMError,
}

/// A credential paired with the provider that talks to it.
#[derive(Clone)]
pub struct Backend {
    pub credential: Credential,
    pub provider: Arc<dyn LLMProvider>,
}

impl Backend {
    pub fn new(credential: Credential, provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            credential,
            provider,
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

/// One discovered model.
#[derive(Debug, Clone)]
pub struct ModelEntry {
    pub id: u32,
    /// The provider's model identifier, sent as `model` in requests.
    pub name: String,
    /// Ownership label reported by the endpoint (`owned_by`).
    pub provider: String,
    /// Name of the configured server the model came from.
    pub server: String,
    pub url: String,
    pub api_key: ApiKey,
    backend: usize,
}

#[derive(Debug, Default)]
pub struct ModelRegistry {
    backends: Vec<Backend>,
    entries: Vec<ModelEntry>,
}

impl ModelRegistry {
    /// Query every backend for its models.
    pub async fn discover(
        backends: Vec<Backend>,
        policy: DiscoveryPolicy,
    ) -> Result<Self, DiscoveryError> {
        let mut entries = Vec::new();

        for (index, backend) in backends.iter().enumerate() {
            let credential = &backend.credential;
            let models = match backend.provider.list_models().await {
                Ok(models) => models,
                Err(source) => match policy {
                    DiscoveryPolicy::Abort => {
                        return Err(DiscoveryError {
                            server: credential.name.clone(),
                            source,
                        });
                    }
                    DiscoveryPolicy::Skip => {
                        warn!(
                            server = %credential.name,
                            error = %source,
                            "Skipping server, model discovery failed"
                        );
                        continue;
                    }
                },
            };

            debug!(server = %credential.name, count = models.len(), "Discovered models");

            for model in models {
                let Some(id) = next_id(entries.len()) else {
                    warn!(
                        server = %credential.name,
                        "Model id space exhausted, ignoring remaining models"
                    );
                    break;
                };
                entries.push(ModelEntry {
                    id,
                    name: model.id,
                    provider: model.owned_by.unwrap_or_else(|| credential.name.clone()),
                    server: credential.name.clone(),
                    url: credential.url.clone(),
                    api_key: credential.api_key.clone(),
                    backend: index,
                });
            }
        }

        info!(
            servers = backends.len(),
            models = entries.len(),
            "Model registry populated"
        );

        Ok(Self { backends, entries })
    }

    /// Run discovery again against the same backends.
    pub async fn rediscover(&self, policy: DiscoveryPolicy) -> Result<Self, DiscoveryError> {
        Self::discover(self.backends.clone(), policy).await
    }

    /// All entries in id order.
    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    pub fn get(&self, id: u32) -> Option<&ModelEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn resolve(&self, selector: &ModelSelector) -> Option<&ModelEntry> {
        selector.resolve(&self.entries)
    }

    pub fn first(&self) -> Option<&ModelEntry> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    /// Provider that serves `entry`.
    pub(crate) fn provider_for(&self, entry: &ModelEntry) -> Arc<dyn LLMProvider> {
        Arc::clone(&self.backends[entry.backend].provider)
    }
}

/// Id for the entry after `count` existing ones, if it fits in a `u32`.
fn next_id(count: usize) -> Option<u32> {
    u32::try_from(count).ok()?.checked_add(1)
}
