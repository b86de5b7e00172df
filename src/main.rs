//! pkm CLI - Personal knowledge index across your note sources
//!
//! Usage:
//!   pkm sync                    - Fetch all sources, merge, save, push
//!   pkm connect vault <PATH>    - Index a markdown vault
//!   pkm connect workspace       - Authorize the cloud workspace
//!   pkm status                  - Show connectors and index status

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::commands::{self, App};
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pkm_sync={0},pkm={0}", log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let app = App::open(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Sync => commands::sync(&app).await,
        Commands::Connect { target } => commands::connect(&app, target).await,
        Commands::Disconnect { account } => commands::disconnect(&app, account),
        Commands::Status => commands::status(&app).await,
        Commands::List { source } => commands::list(&app, source).await,
        Commands::Query { text } => commands::query(&app, &text).await,
        Commands::Summarize { text } => commands::summarize(&app, &text).await,
        Commands::Clear { yes } => commands::clear(&app, yes).await,
    }
}
