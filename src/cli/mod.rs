//! CLI definitions and command implementations for pkm.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// pkm - Personal knowledge index across your note sources
#[derive(Parser)]
#[command(name = "pkm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: <config dir>/pkm-sync/pkm-sync.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch every source, merge into the index and push it
    Sync,

    /// Connect a source and import it right away
    Connect {
        #[command(subcommand)]
        target: ConnectTarget,
    },

    /// Forget a source's credential or location
    Disconnect {
        #[arg(value_enum)]
        account: Account,
    },

    /// Show connectors and index status
    Status,

    /// List indexed items
    List {
        /// Only items from this source (vault, workspace, highlights, notes, memory)
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Search the remote index
    Query {
        /// Search text
        text: String,
    },

    /// Ask the remote service for a summary
    Summarize {
        /// Text or topic to summarize
        text: String,
    },

    /// Empty the local index
    Clear {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum ConnectTarget {
    /// Use a directory of markdown notes
    Vault {
        /// Vault directory
        path: PathBuf,
    },

    /// Authorize the cloud workspace in the browser
    Workspace,
}

/// Sources that hold a credential or location.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Account {
    Vault,
    Workspace,
}
