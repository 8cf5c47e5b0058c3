//! Model selection by id, name, or name and provider.
//!
//! | Variant             | Matches                                      |
//! |---------------------|----------------------------------------------|
//! | `Id`                | the entry with that id                       |
//! | `Name`              | the first discovered entry with that name    |
//! | `NameAndProvider`   | the entry whose name and provider both match |
//!
//! Strings convert to `Id` when they parse as a positive integer, so `"2"`
//! and `2` select the same model. A model literally named `"2"` can still be
//! reached through [`ModelSelector::Name`].

use std::fmt;

use crate::registry::ModelEntry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSelector {
    Id(u32),
    Name(String),
    NameAndProvider { name: String, provider: String },
}

impl ModelSelector {
    pub fn name_and_provider(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self::NameAndProvider {
            name: name.into(),
            provider: provider.into(),
        }
    }

    /// Find the matching entry. Names shared across providers resolve to the
    /// lowest id.
    pub fn resolve<'r>(&self, entries: &'r [ModelEntry]) -> Option<&'r ModelEntry> {
        match self {
            Self::Id(id) => entries.iter().find(|entry| entry.id == *id),
            Self::Name(name) => entries
                .iter()
                .filter(|entry| entry.name == *name)
                .min_by_key(|entry| entry.id),
            Self::NameAndProvider { name, provider } => entries
                .iter()
                .find(|entry| entry.name == *name && entry.provider == *provider),
        }
    }
}

impl fmt::Display for ModelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {id}"),
            Self::Name(name) => write!(f, "'{name}'"),
            Self::NameAndProvider { name, provider } => write!(f, "'{name}' from '{provider}'"),
        }
    }
}

impl From<u32> for ModelSelector {
    fn from(id: u32) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for ModelSelector {
    fn from(s: &str) -> Self {
        match s.trim().parse::<u32>() {
            Ok(id) if id > 0 => Self::Id(id),
            _ => Self::Name(s.to_string()),
        }
    }
}

impl From<String> for ModelSelector {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<(&str, &str)> for ModelSelector {
    fn from((name, provider): (&str, &str)) -> Self {
        Self::name_and_provider(name, provider)
    }
}
