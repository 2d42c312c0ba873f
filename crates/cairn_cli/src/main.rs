//! Cairn CLI
//!
//! Command-line tools for inspecting and verifying Cairn segment stores.
//!
//! # Commands
//!
//! - `inspect` - Display archive and journal statistics
//! - `verify` - Decode every entry and report corruption
//! - `journals` - List journal heads from the newest snapshot
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Cairn command-line store tools.
#[derive(Parser)]
#[command(name = "cairn")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display archive and journal statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Decode every entry and report corruption
    Verify,

    /// List journal heads from the newest snapshot
    Journals {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
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
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Journals { format } => {
            let path = cli.path.ok_or("Store path required for journals")?;
            commands::journals::run(&path, &format)?;
        }
        Commands::Version => {
            println!("cairn {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
