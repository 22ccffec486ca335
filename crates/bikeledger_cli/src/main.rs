//! BikeLedger CLI
//!
//! Command-line access to a BikeLedger store and its GitHub sync.
//!
//! # Commands
//!
//! - `configure` - Store the GitHub repository to sync with
//! - `sync` - Run one sync cycle
//! - `status` - Show sync state, tokens and table sizes
//! - `cash` - Record a cash ledger entry
//! - `balance` - Project the cash balance from the ledger
//! - `compact` - Rewrite the journal as a snapshot
//! - `wipe` - Delete local entity data, keeping the sync target

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the GitHub token.
const TOKEN_VAR: &str = "BIKELEDGER_TOKEN";

/// BikeLedger command-line tools.
#[derive(Parser)]
#[command(name = "bikeledger")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long, default_value = "bikeledger-data")]
    store: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store the GitHub repository to sync with
    Configure {
        /// Repository owner
        #[arg(long)]
        owner: String,

        /// Repository name
        #[arg(long)]
        repo: String,

        /// Branch
        #[arg(long, default_value = "main")]
        branch: String,

        /// Folder inside the repository
        #[arg(long, default_value = "")]
        path: String,
    },

    /// Run one sync cycle now (token from BIKELEDGER_TOKEN)
    Sync,

    /// Show sync state, version tokens, cash in hand and table sizes
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Record a cash ledger entry
    Cash {
        #[command(subcommand)]
        action: CashAction,
    },

    /// Project the cash balance from the local ledger
    Balance,

    /// Rewrite the store journal as a single snapshot
    Compact,

    /// Delete all local data without syncing
    Wipe {
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum CashAction {
    /// Replace the balance
    Set {
        /// New balance
        #[arg(allow_negative_numbers = true)]
        amount: f64,
        /// Why
        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Add cash
    Increase {
        /// Amount added
        amount: f64,
        /// Why
        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Take cash out
    Decrease {
        /// Amount removed
        amount: f64,
        /// Why
        #[arg(short, long)]
        reason: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Configure {
            owner,
            repo,
            branch,
            path,
        } => commands::configure::run(&cli.store, owner, repo, branch, path)?,
        Commands::Sync => commands::sync::run(&cli.store)?,
        Commands::Status { format } => commands::status::run(&cli.store, &format)?,
        Commands::Cash { action } => commands::cash::record(&cli.store, action)?,
        Commands::Balance => commands::cash::balance(&cli.store)?,
        Commands::Compact => commands::maintenance::compact(&cli.store)?,
        Commands::Wipe { yes } => commands::maintenance::wipe(&cli.store, yes)?,
        Commands::Version => {
            println!("BikeLedger CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
