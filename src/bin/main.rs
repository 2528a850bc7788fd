use clap::{Parser, Subcommand};
use filing_agent::{
    acquisition,
    agent::FilingAgent,
    config::Settings,
    console,
    embeddings::{Embedder, HttpEmbedder},
    index,
    llm::{LanguageModel, OpenAiClient},
    query_engine::EngineDeps,
    tools,
};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "filing-agent", version, about = "Chat with a company's 10-K filings")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Rebuild every index even when storage exists
    #[arg(long, global = true)]
    rebuild: bool,

    /// Never download the corpus; use what is in the data directory
    #[arg(long, global = true)]
    skip_download: bool,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Download and extract the filing corpus
    Download,
    /// Build and persist the per-year indices
    Build,
    /// Start the interactive session (default)
    Chat,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout carries the conversation.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    info!(
        model = %settings.llm_model,
        embedding_model = %settings.embedding_model,
        years = ?settings.years,
        "Filing agent starting"
    );

    match cli.command.unwrap_or(Command::Chat) {
        Command::Download => {
            acquisition::download_and_extract(&settings).await?;
        }
        Command::Build => {
            ensure_corpus(&settings, cli.skip_download).await?;
            let embedder = HttpEmbedder::from_settings(&settings)?;
            let indices = index::build_indices(&settings, &embedder).await?;
            info!(years = indices.len(), "Indices built");
        }
        Command::Chat => {
            if let Err(e) = chat(&settings, cli.rebuild, cli.skip_download).await {
                eprintln!("Filing agent failed: {}", e);
                return Err(Box::new(e) as Box<dyn std::error::Error>);
            }
        }
    }

    Ok(())
}

async fn ensure_corpus(settings: &Settings, skip_download: bool) -> filing_agent::Result<()> {
    if skip_download || acquisition::corpus_present(settings) {
        info!("Using filings already in {}", settings.data_directory.display());
        return Ok(());
    }
    acquisition::download_and_extract(settings).await
}

async fn chat(settings: &Settings, rebuild: bool, skip_download: bool) -> filing_agent::Result<()> {
    let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::from_settings(settings)?);
    let llm: Arc<dyn LanguageModel> = Arc::new(OpenAiClient::from_settings(settings)?);

    let indices = if rebuild {
        ensure_corpus(settings, skip_download).await?;
        index::build_indices(settings, embedder.as_ref()).await?
    } else {
        let all_stored = settings
            .years
            .iter()
            .all(|&y| index::store::storage_present(&settings.storage_path(y)));
        if !all_stored {
            ensure_corpus(settings, skip_download).await?;
        }
        index::ensure_indices(settings, embedder.as_ref()).await?
    };

    let deps = EngineDeps::new(embedder, llm.clone(), settings);
    let registry = tools::agent_tools(&indices, &settings.years, &deps)?;
    info!(tools = ?registry.list(), "Agent tools ready");

    let mut agent = FilingAgent::new(llm, registry, settings);
    console::run(&mut agent, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}
