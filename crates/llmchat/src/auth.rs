//! Credentials for configured servers.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};

/// An API key that is redacted from `Debug` output.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(SecretString::from(key.into()))
    }

    /// Expose the key. Only call this when building a request.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey([REDACTED])")
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// One endpoint and the key used to talk to it.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Server name from the config file, or `"env"` for the environment fallback.
    pub name: String,
    pub url: String,
    pub api_key: ApiKey,
}

impl Credential {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        api_key: impl Into<ApiKey>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            api_key: api_key.into(),
        }
    }
}
