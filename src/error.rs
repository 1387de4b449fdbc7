use std::error::Error as StdError;

use thiserror::Error;

/// Errors returned by [`AzureOpenAIClient`](crate::AzureOpenAIClient).
///
/// The variant is the failure category, the payload is the original error text.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Config(String),

    #[error("Failed to connect to OpenAI API: {0}")]
    Connection(String),

    #[error("OpenAI API request exceeded rate limit: {0}")]
    RateLimit(String),

    #[error("OpenAI API returned an error: {0}")]
    Api(String),

    #[error("Error: {0}")]
    Other(String),

    #[error("Error during streaming: {0}")]
    Streaming(String),
}

/// Fieldless tag of an [`Error`], for branching without matching payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Connection,
    RateLimit,
    Api,
    Other,
    Streaming,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Connection(_) => ErrorKind::Connection,
            Self::RateLimit(_) => ErrorKind::RateLimit,
            Self::Api(_) => ErrorKind::Api,
            Self::Other(_) => ErrorKind::Other,
            Self::Streaming(_) => ErrorKind::Streaming,
        }
    }

    /// The original error text, without the category wording
    pub fn detail(&self) -> &str {
        match self {
            Self::Config(detail)
            | Self::Connection(detail)
            | Self::RateLimit(detail)
            | Self::Api(detail)
            | Self::Other(detail)
            | Self::Streaming(detail) => detail,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// `err` followed by every cause in its source chain, joined with `": "`
pub(crate) fn with_sources(err: &dyn StdError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.ends_with(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}
