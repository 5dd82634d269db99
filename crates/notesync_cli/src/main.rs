//! NoteSync CLI
//!
//! Command-line tools for NoteSync data directories.
//!
//! # Commands
//!
//! - `inspect` - Display owners, head sequences and entity counts
//! - `verify` - Check log framing, sequences and version lineage
//! - `dump-log` - Dump one owner's change log for debugging

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// NoteSync command-line data directory tools.
#[derive(Parser)]
#[command(name = "notesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
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
    /// Display owners, head sequences and entity counts
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify change log integrity
    Verify {
        /// Only verify this owner
        #[arg(short, long)]
        owner: Option<String>,
    },

    /// Dump change log entries for debugging
    DumpLog {
        /// Owner whose log to dump
        #[arg(short, long)]
        owner: String,

        /// Only entries after this sequence
        #[arg(short, long, default_value = "0")]
        after: u64,

        /// Maximum number of entries to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Data directory path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify { owner } => {
            let path = cli.path.ok_or("Data directory path required for verify")?;
            commands::verify::run(&path, owner.as_deref())?;
        }
        Commands::DumpLog {
            owner,
            after,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Data directory path required for dump-log")?;
            commands::dump_log::run(&path, &owner, after, limit, &format)?;
        }
        Commands::Version => {
            println!("NoteSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("NoteSync Core v{}", notesync_core::VERSION);
        }
    }

    Ok(())
}
