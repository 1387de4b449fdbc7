//! Small client for Azure OpenAI chat completions and embeddings.
//!
//! [`AzureOpenAIClient`] resolves its credentials from explicit options or the
//! environment, keeps a system context that [`AzureOpenAIClient::query`] sends
//! ahead of every question, and can either return answers or stream them to
//! standard output.
//!
//! ```no_run
//! use azure_openai_client::{AzureOpenAIClient, ClientOptions};
//!
//! # async fn run() -> azure_openai_client::Result<()> {
//! let client = AzureOpenAIClient::new(
//!     ClientOptions::new().with_context("You are helpful."),
//! )?;
//! let answer = client.query("hi").await?;
//! println!("{}", answer.unwrap_or_default());
//! # Ok(())
//! # }
//! ```

use reqwest::{
    header::{HeaderMap, HeaderValue},
    Response, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

pub mod chat;
pub mod config;
pub mod embedding;
pub mod error;
pub mod model;
pub mod stream;

pub use chat::{ChatMessage, MessageRole};
pub use config::{ClientConfig, ClientOptions};
pub use embedding::Embedding;
pub use error::{Error, ErrorKind, Result};
pub use model::Model;
pub use stream::{print_stream, write_stream, CompletionStream};

use chat::{ChatCompletionRequest, ChatCompletionResponse};
use embedding::{EmbeddingRequest, EmbeddingResponse};
use error::with_sources;

const API_KEY_HEADER: &str = "api-key";

#[derive(Debug)]
pub struct AzureOpenAIClient {
    config: ClientConfig,
    http: reqwest::Client,
    context: String,
}

impl AzureOpenAIClient {
    /**
    Resolves configuration from `options` and the environment and builds the client

    Fails with [`Error::Config`] if no api key or endpoint is available, before any request is sent
    */
    pub fn new(options: ClientOptions) -> Result<Self> {
        let config = options.resolve()?;
        let mut client = Self::with_config(config)?;
        if let Some(context) = options.context() {
            client.add_context(context);
        }
        Ok(client)
    }

    /// Builds the client purely from `AZURE_OPENAI_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(ClientOptions::default())
    }

    /**
    Builds the client from an already resolved configuration, with an empty context

    Fails with [`Error::Config`] if the api key or endpoint is empty
    */
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let mut api_key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| Error::Config(format!("invalid api key: {e}")))?;
        api_key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, api_key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        debug!(
            target: "azure_openai",
            endpoint = %config.endpoint,
            api_version = %config.api_version,
            chat_model = %config.chat_model,
            embedding_model = %config.embedding_model,
            stream = config.stream,
            "client created"
        );

        Ok(Self {
            config,
            http,
            context: String::new(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_streaming(&self) -> bool {
        self.config.stream
    }

    /// Appends `text` to the system context as is, without any separator
    pub fn add_context(&mut self, text: &str) {
        self.context.push_str(text);
    }

    /// System message carrying the current context
    pub fn get_context(&self) -> ChatMessage {
        ChatMessage::system(self.context.as_str())
    }

    /// Embeds `text` with the configured embedding model
    pub async fn get_embedding(&self, text: &str) -> Result<Embedding> {
        let model = self.config.embedding_model.as_str();
        let body = EmbeddingRequest { model, input: text };

        debug!(target: "azure_openai", model, "sending embedding request");
        let response = self.post(model, "embeddings", &body).await?;
        let response: EmbeddingResponse = decode(response).await?;
        response.into_first()
    }

    /**
    Sends `messages` to the chat model, honoring the configured streaming flag

    Returns the answer, or None in streaming mode where it has already been printed to stdout
    */
    pub async fn chat_completions(&self, messages: &[ChatMessage]) -> Result<Option<String>> {
        if self.config.stream {
            let stream = self.create_completion_stream(messages).await?;
            print_stream(stream).await?;
            Ok(None)
        } else {
            self.create_completion(messages).await.map(Some)
        }
    }

    /// Non-streaming completion, regardless of the configured flag
    pub async fn create_completion(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self.send_chat(messages, false).await?;
        let response: ChatCompletionResponse = decode(response).await?;
        response.into_content()
    }

    /**
    Streaming completion, regardless of the configured flag

    Submission failures are returned here, failures while reading come out of the stream
    */
    pub async fn create_completion_stream(
        &self,
        messages: &[ChatMessage],
    ) -> Result<CompletionStream> {
        let response = self.send_chat(messages, true).await?;
        Ok(CompletionStream::from_response(response))
    }

    /**
    Asks `message` with the current context as system message

    Returns None in streaming mode
    */
    pub async fn query(&self, message: &str) -> Result<Option<String>> {
        let messages = [self.get_context(), ChatMessage::user(message)];
        self.chat_completions(&messages).await
    }

    async fn send_chat(&self, messages: &[ChatMessage], stream: bool) -> Result<Response> {
        let model = self.config.chat_model.as_str();
        let body = ChatCompletionRequest {
            model,
            messages,
            stream,
        };

        debug!(
            target: "azure_openai",
            model,
            message_count = messages.len(),
            stream,
            "sending chat completion request"
        );
        self.post(model, "chat/completions", &body).await
    }

    /// Posts `body` to a deployment operation and classifies transport and HTTP failures
    async fn post<T: Serialize>(
        &self,
        deployment: &str,
        operation: &str,
        body: &T,
    ) -> Result<Response> {
        let url = format!(
            "{}/openai/deployments/{}/{}",
            self.config.endpoint, deployment, operation
        );

        let response = self
            .http
            .post(url)
            .query(&[("api-version", self.config.api_version.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| {
                debug!(target: "azure_openai", error = %e, "request failed to send");
                Error::Connection(with_sources(&e))
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = rejection_detail(status, response.text().await);
        debug!(target: "azure_openai", %status, "request rejected");

        if status == StatusCode::TOO_MANY_REQUESTS {
            Err(Error::RateLimit(detail))
        } else {
            Err(Error::Api(detail))
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let text = response
        .text()
        .await
        .map_err(|e| Error::Other(format!("failed to read response body: {e}")))?;
    serde_json::from_str(&text).map_err(|e| Error::Other(format!("invalid response body: {e}")))
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// `"{status}: {message}"`, naming the read failure when the body could not be read
fn rejection_detail<E: std::error::Error>(
    status: StatusCode,
    body: std::result::Result<String, E>,
) -> String {
    match body {
        Ok(text) => format!("{status}: {}", error_message(&text)),
        Err(e) => format!("{status}: <failed to read body: {}>", with_sources(&e)),
    }
}

/// `error.message` of a JSON error body, otherwise the raw body
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(context: Option<&str>) -> AzureOpenAIClient {
        let config = ClientOptions::new()
            .with_api_key("test-api-key")
            .with_endpoint("https://example.openai.azure.com")
            .resolve_with(|_| None)
            .unwrap();
        let mut client = AzureOpenAIClient::with_config(config).unwrap();
        client.add_context(context.unwrap_or_default());
        client
    }

    #[test]
    fn context_starts_empty() {
        let client = client(None);
        assert_eq!(client.get_context(), ChatMessage::system(""));
    }

    #[test]
    fn add_context_concatenates_without_separator() {
        let mut split = client(Some("You are "));
        split.add_context("help");
        split.add_context("");
        split.add_context("ful.");

        let mut whole = client(None);
        whole.add_context("You are helpful.");

        assert_eq!(split.get_context(), whole.get_context());
        assert_eq!(split.get_context().content, "You are helpful.");
    }

    #[test]
    fn get_context_does_not_mutate() {
        let client = client(Some("ctx"));
        let first = client.get_context();
        for _ in 0..3 {
            assert_eq!(client.get_context(), first);
        }
        assert_eq!(first.role, MessageRole::System);
    }

    #[test]
    fn invalid_api_key_is_a_config_error() {
        let config = ClientOptions::new()
            .with_api_key("bad\nkey")
            .with_endpoint("https://e")
            .resolve_with(|_| None)
            .unwrap();

        let err = AzureOpenAIClient::with_config(config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn empty_api_key_or_endpoint_is_rejected_by_with_config() {
        let valid = ClientOptions::new()
            .with_api_key("k")
            .with_endpoint("https://e")
            .resolve_with(|_| None)
            .unwrap();

        let no_key = ClientConfig {
            api_key: String::new(),
            ..valid.clone()
        };
        let err = AzureOpenAIClient::with_config(no_key).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.to_string(), "No Azure OpenAI API key provided.");

        let no_endpoint = ClientConfig {
            endpoint: String::new(),
            ..valid.clone()
        };
        let err = AzureOpenAIClient::with_config(no_endpoint).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.to_string(), "No Azure OpenAI endpoint provided.");

        let neither = ClientConfig {
            api_key: String::new(),
            endpoint: String::new(),
            ..valid
        };
        assert!(AzureOpenAIClient::with_config(neither).is_err());
    }

    #[test]
    fn new_seeds_the_initial_context() {
        let client = AzureOpenAIClient::new(
            ClientOptions::new()
                .with_api_key("k")
                .with_endpoint("https://e")
                .with_context("seed"),
        )
        .unwrap();

        assert_eq!(client.get_context().content, "seed");
    }

    #[test]
    fn rejection_detail_keeps_body_read_failures() {
        let read_failure =
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "body truncated");
        let detail = rejection_detail(StatusCode::BAD_GATEWAY, Err(read_failure));
        assert_eq!(detail, "502 Bad Gateway: <failed to read body: body truncated>");

        let detail = rejection_detail::<std::io::Error>(
            StatusCode::TOO_MANY_REQUESTS,
            Ok(r#"{"error": {"message": "slow down"}}"#.to_string()),
        );
        assert_eq!(detail, "429 Too Many Requests: slow down");
    }

    #[test]
    fn error_message_prefers_json_envelope() {
        let body = r#"{"error": {"code": "429", "message": "Rate limit reached"}}"#;
        assert_eq!(error_message(body), "Rate limit reached");
        assert_eq!(error_message(" upstream down \n"), "upstream down");
    }
}
