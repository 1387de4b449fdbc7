//! azure-chat - ask an Azure OpenAI deployment a single question
//!
//! Usage:
//!     azure-chat [OPTIONS] <PROMPT>...
//!
//! Environment Variables:
//!     AZURE_OPENAI_API_KEY: API key (required)
//!     AZURE_OPENAI_ENDPOINT: Resource endpoint (required)
//!     AZURE_OPENAI_API_VERSION: API version (default: 2023-05-15)
//!     RUST_LOG: Log filter (default: warn)

use anyhow::{bail, Context, Result};
use azure_openai_client::{AzureOpenAIClient, ClientOptions};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "azure-chat")]
#[command(about = "Ask an Azure OpenAI deployment a single question")]
struct Cli {
    /// System context sent ahead of the question
    #[arg(long)]
    context: Option<String>,

    /// Print the answer as it is generated
    #[arg(long)]
    stream: bool,

    /// Chat deployment name
    #[arg(long)]
    model: Option<String>,

    /// Print the embedding dimension of the prompt instead of asking it
    #[arg(long)]
    embed: bool,

    /// The question, joined with spaces
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let prompt = cli.prompt.join(" ");
    if prompt.trim().is_empty() {
        bail!("no prompt given");
    }

    let mut options = ClientOptions::new().with_stream(cli.stream);
    if let Some(context) = cli.context {
        options = options.with_context(context);
    }
    if let Some(model) = cli.model {
        options = options.with_chat_model(model);
    }

    let client = AzureOpenAIClient::new(options).context("failed to create client")?;
    info!(model = %client.config().chat_model, stream = client.is_streaming(), "client ready");

    if cli.embed {
        let embedding = client.get_embedding(&prompt).await?;
        println!("{}", embedding.len());
        return Ok(());
    }

    if let Some(answer) = client.query(&prompt).await? {
        println!("{answer}");
    }
    Ok(())
}
