use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use newsrag_core::default_categories;
use newsrag_ingest::{IngestionOrchestrator, ServiceConfig};
use newsrag_storage::DocumentStore;
use newsrag_web::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "newsrag")]
#[command(about = "NewsRAG news ingestion service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    /// Subcommand to run; `serve` with storage when none is given.
    fn command(self) -> Commands {
        self.command.unwrap_or(Commands::Serve {
            port: None,
            no_storage: false,
        })
    }
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum Commands {
    /// Run the HTTP API.
    Serve {
        #[arg(long)]
        port: Option<u16>,
        /// Fetch and return articles without writing them to the document store.
        #[arg(long)]
        no_storage: bool,
    },
    /// Run one news update from the command line and print the summary.
    Update {
        #[arg(long = "category")]
        categories: Vec<String>,
        #[arg(long)]
        no_storage: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn build_orchestrator(config: &ServiceConfig, no_storage: bool) -> Result<IngestionOrchestrator> {
    let store: Option<Arc<dyn DocumentStore>> = if no_storage {
        None
    } else {
        let store = config
            .document_store()
            .context("initializing document store")?;
        info!(root = %store.root().display(), "document store ready");
        Some(Arc::new(store))
    };
    IngestionOrchestrator::from_config(config, store)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = ServiceConfig::from_env();

    match cli.command() {
        Commands::Serve { port, no_storage } => {
            let orchestrator = build_orchestrator(&config, no_storage)?;
            newsrag_web::serve(AppState::new(orchestrator), port.unwrap_or(config.web_port)).await?;
        }
        Commands::Update {
            categories,
            no_storage,
        } => {
            let categories = if categories.is_empty() {
                default_categories()
            } else {
                categories
            };
            let orchestrator = build_orchestrator(&config, no_storage)?;
            let summary = orchestrator.run(&categories).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
