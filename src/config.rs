use std::fmt;

use tracing::debug;

use crate::{
    error::{Error, Result},
    model::Model,
};

pub const API_KEY_ENV: &str = "AZURE_OPENAI_API_KEY";
pub const API_VERSION_ENV: &str = "AZURE_OPENAI_API_VERSION";
pub const ENDPOINT_ENV: &str = "AZURE_OPENAI_ENDPOINT";
pub const DEFAULT_API_VERSION: &str = "2023-05-15";

const MISSING_API_KEY: &str = "No Azure OpenAI API key provided.";
const MISSING_ENDPOINT: &str = "No Azure OpenAI endpoint provided.";

/// Resolved client configuration. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_key: String,
    pub api_version: String,
    pub endpoint: String,
    pub chat_model: Model,
    pub embedding_model: Model,
    pub stream: bool,
}

impl ClientConfig {
    /// Fails with [`Error::Config`] if the api key or endpoint is empty
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(Error::Config(MISSING_API_KEY.to_string()));
        }
        if self.endpoint.is_empty() {
            return Err(Error::Config(MISSING_ENDPOINT.to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("endpoint", &self.endpoint)
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("stream", &self.stream)
            .finish()
    }
}

/// Explicit construction arguments for a client.
///
/// Anything left unset falls back to the environment, and for the API version
/// to [`DEFAULT_API_VERSION`].
#[derive(Clone, Default)]
pub struct ClientOptions {
    api_key: Option<String>,
    api_version: Option<String>,
    endpoint: Option<String>,
    chat_model: Option<Model>,
    embedding_model: Option<Model>,
    context: Option<String>,
    stream: bool,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_chat_model(mut self, model: impl Into<Model>) -> Self {
        self.chat_model = Some(model.into());
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<Model>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    /// Initial system context, appended once the client is built
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /**
    Resolves against the process environment, loading `.env` first if present

    Fails if no api key or endpoint could be found
    */
    pub fn resolve(&self) -> Result<ClientConfig> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(target: "azure_openai", path = %path.display(), "loaded .env file");
        }
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /**
    Resolves each value as explicit argument, then `lookup(env var name)`, then default

    Empty strings count as absent at every level
    */
    pub fn resolve_with<F>(&self, lookup: F) -> Result<ClientConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |explicit: &Option<String>, var: &str| {
            non_empty(explicit.clone()).or_else(|| non_empty(lookup(var)))
        };

        let api_key = pick(&self.api_key, API_KEY_ENV)
            .ok_or_else(|| Error::Config(MISSING_API_KEY.to_string()))?;
        let api_version = pick(&self.api_version, API_VERSION_ENV)
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());
        let endpoint = pick(&self.endpoint, ENDPOINT_ENV)
            .ok_or_else(|| Error::Config(MISSING_ENDPOINT.to_string()))?;

        Ok(ClientConfig {
            api_key,
            api_version,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            chat_model: self.chat_model.clone().unwrap_or_else(Model::default_chat),
            embedding_model: self
                .embedding_model
                .clone()
                .unwrap_or_else(Model::default_embedding),
            stream: self.stream,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
