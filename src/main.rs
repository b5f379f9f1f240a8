use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use memsift::cli;
use memsift::config::MemsiftConfig;

#[derive(Parser)]
#[command(name = "memsift", version, about = "Hybrid memory retrieval and ranking")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a memory for an owner
    Add {
        #[arg(long = "owner")]
        owner_id: String,
        /// Metadata as key=value (repeatable)
        #[arg(long = "meta")]
        meta: Vec<String>,
        text: String,
    },
    /// Rank an owner's memories against a query
    Search {
        #[arg(long = "owner")]
        owner_id: String,
        #[arg(long)]
        top_k: Option<usize>,
        /// Drop results scoring below this value
        #[arg(long)]
        threshold: Option<f64>,
        /// key=value, key>=value, key<=value or key=a|b (repeatable)
        #[arg(long = "filter")]
        filters: Vec<String>,
        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
        query: String,
    },
    /// Delete a memory by id
    Forget { id: String },
    /// Check database health
    Doctor,
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.memsift/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = MemsiftConfig::load()?;

    // stderr keeps stdout clean for --json output
    let filter = EnvFilter::try_new(&config.logging.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Add {
            owner_id,
            meta,
            text,
        } => cli::add::add(&config, &owner_id, &meta, &text).await?,
        Command::Search {
            owner_id,
            top_k,
            threshold,
            filters,
            json,
            query,
        } => {
            cli::search::search(
                &config,
                cli::search::SearchArgs {
                    owner_id: &owner_id,
                    query: &query,
                    top_k,
                    threshold,
                    filters: &filters,
                    json,
                },
            )
            .await?
        }
        Command::Forget { id } => cli::forget::forget(&config, &id).await?,
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::Model { action } => match action {
            ModelAction::Download => cli::model_download(&config.embedding).await?,
        },
    }

    Ok(())
}
