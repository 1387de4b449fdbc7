use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CHAT_MODEL: &str = "gpt-4.1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Model identifier, also used as the Azure deployment name in request paths
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Model {
    pub name: String,
}

impl Model {
    pub fn default_chat() -> Self {
        Self::from(DEFAULT_CHAT_MODEL)
    }

    pub fn default_embedding() -> Self {
        Self::from(DEFAULT_EMBEDDING_MODEL)
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl From<String> for Model {
    fn from(value: String) -> Self {
        Self { name: value }
    }
}

impl From<&str> for Model {
    fn from(value: &str) -> Self {
        Self {
            name: value.to_string(),
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
