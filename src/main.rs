//! pdfchat CLI entry point.
//!
//! - `pdfchat serve`: run the HTTP server (default)
//! - `pdfchat config-schema`: print the JSON schema of `config.toml`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pdfchat::config::{load_config, Config};
use pdfchat::providers::HttpChatAdapter;
use pdfchat::retrieval::{SqliteIndexer, TextSplitter};
use pdfchat::store::FileStore;
use pdfchat::{gateway, DocumentChat};

/// Ask questions about a PDF over HTTP
#[derive(Parser)]
#[command(name = "pdfchat", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve(ServeArgs),

    /// Print the JSON schema for the config file
    ConfigSchema,
}

#[derive(clap::Args, Default)]
struct ServeArgs {
    /// Config file (defaults to the platform config dir)
    #[arg(short, long, env = "PDFCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Bind host, overrides the config file
    #[arg(long)]
    host: Option<String>,

    /// Bind port, overrides the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or_else(|| Commands::Serve(ServeArgs::default())) {
        Commands::Serve(args) => {
            init_logging(args.verbose);
            serve(args).await
        }
        Commands::ConfigSchema => {
            let schema = schemars::schema_for!(Config);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.gateway.host = host;
    }
    if let Some(port) = args.port {
        config.gateway.port = port;
    }
    if !config.provider.is_configured() {
        bail!("No API key configured: set GOOGLE_API_KEY, PDFCHAT_API_KEY or provider.api_key");
    }

    let chat = build_service(&config)?;
    info!(
        model = %config.provider.model,
        upload_dir = %chat.files().base_dir().display(),
        max_upload_bytes = config.upload.max_bytes,
        "pdfchat starting"
    );
    gateway::run(&config.gateway, Arc::new(chat)).await
}

/// Wire the file store, local index and HTTP chat adapter together.
fn build_service(config: &Config) -> Result<DocumentChat> {
    let files = FileStore::new(&config.upload.dir, config.upload.max_bytes);
    std::fs::create_dir_all(files.base_dir()).with_context(|| {
        format!("Failed to create upload directory {}", files.base_dir().display())
    })?;

    let splitter = TextSplitter::new(config.retrieval.chunk_size, config.retrieval.chunk_overlap)?;
    let indexer = SqliteIndexer::new(splitter);
    let adapter = HttpChatAdapter::new(&config.provider, config.retrieval.top_k)?;

    Ok(DocumentChat::new(
        files,
        Arc::new(indexer),
        Arc::new(adapter),
        Duration::from_secs(config.provider.timeout_secs),
    ))
}

/// Initialize tracing. `RUST_LOG` wins over the default filter.
fn init_logging(verbose: bool) {
    let default = if verbose {
        "pdfchat=debug,tower_http=debug,info"
    } else {
        "pdfchat=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
