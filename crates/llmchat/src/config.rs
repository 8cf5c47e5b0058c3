//! Server configuration: which endpoints to talk to and how.

use std::fmt;
use std::path::Path;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use thiserror::Error;
use tokio::fs;
use tracing::info;

use crate::auth::Credential;
use crate::registry::DiscoveryPolicy;

/// Environment variable holding the API key for the single-server fallback.
pub const API_KEY_ENV: &str = "API_KEY";
/// Environment variable holding the base URL for the single-server fallback.
pub const BASE_URL_ENV: &str = "BASE_URL";
/// Server name given to the environment fallback credential.
pub const ENV_SERVER_NAME: &str = "env";

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Servers in the order they appear in the file.
    #[serde(default, deserialize_with = "ordered_servers")]
    pub servers: Vec<ServerEntry>,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Per-request timeout. Transport defaults apply when unset.
    #[serde(default)]
    pub request_timeout_seconds: Option<u64>,
}

impl Config {
    /// Load a config file. `.yaml`/`.yml` files are parsed as YAML, anything
    /// else as JSON.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).await?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

        let config: Self = if is_yaml {
            serde_saphyr::from_str(&contents)?
        } else {
            serde_json::from_str(&contents)?
        };

        info!(path = %path.display(), servers = config.servers.len(), "Loaded config");
        Ok(config)
    }

    /// Build a single-server config from `API_KEY` and `BASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_vars(
            std::env::var(API_KEY_ENV).ok(),
            std::env::var(BASE_URL_ENV).ok(),
        )
    }

    /// Build a single-server config from already-read environment values.
    /// Missing and empty values are both rejected.
    pub fn from_env_vars(
        api_key: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_key = api_key.filter(|v| !v.is_empty());
        let base_url = base_url.filter(|v| !v.is_empty());

        let (Some(api_key), Some(api_url)) = (api_key, base_url) else {
            return Err(ConfigError::MissingEnv);
        };

        Ok(Self {
            servers: vec![ServerEntry {
                name: ENV_SERVER_NAME.to_string(),
                settings: ServerConfig { api_key, api_url },
            }],
            ..Self::default()
        })
    }

    /// Resolve the configured servers into credentials.
    pub fn credentials(&self) -> Result<Vec<Credential>, ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::NoServers);
        }

        self.servers
            .iter()
            .map(|entry| {
                if entry.settings.api_url.trim().is_empty() {
                    return Err(ConfigError::InvalidServer {
                        name: entry.name.clone(),
                        reason: "api_url is empty".to_string(),
                    });
                }
                Ok(Credential::new(
                    entry.name.clone(),
                    entry.settings.api_url.trim(),
                    entry.settings.api_key.clone(),
                ))
            })
            .collect()
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

/// A named server from the `servers` map.
#[derive(Debug, Clone)]
pub struct ServerEntry {
    pub name: String,
    pub settings: ServerConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    /// May be empty for local servers that need no auth.
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_url: String,
}

/// Deserialize the `servers` map while keeping file order.
fn ordered_servers<'de, D>(deserializer: D) -> Result<Vec<ServerEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ServersVisitor;

    impl<'de> Visitor<'de> for ServersVisitor {
        type Value = Vec<ServerEntry>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of server names to server settings")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut servers = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, settings)) = map.next_entry::<String, ServerConfig>()? {
                servers.push(ServerEntry { name, settings });
            }
            Ok(servers)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_map(ServersVisitor)
}

// ============================================================================
// DiscoveryConfig
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub on_error: DiscoveryPolicy,
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("no servers defined in config")]
    NoServers,

    #[error("server '{name}' is unusable: {reason}")]
    InvalidServer { name: String, reason: String },

    #[error("API_KEY or BASE_URL is not set")]
    MissingEnv,

    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

// ============================================================================
// Tests
// ============================================================================
