//! ADDB CLI
//!
//! Offline tools for stob sink repositories. Run them against a repository
//! file no sink is writing.
//!
//! # Commands
//!
//! - `inspect` - Display every segment slot and the resume point
//! - `verify` - Check that no segment is torn or malformed
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ADDB stob sink repository tools.
#[derive(Parser)]
#[command(name = "addb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the repository file
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
    /// Display segment slots and the resume point
    Inspect {
        /// Segment size in bytes (default: read from the first header)
        #[arg(short, long)]
        segment_size: Option<u64>,

        /// Also list the payload length of every framed record
        #[arg(short, long)]
        records: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify repository integrity
    Verify {
        /// Segment size in bytes (default: read from the first header)
        #[arg(short, long)]
        segment_size: Option<u64>,

        /// Also check that records decode as length-prefixed frames
        #[arg(long)]
        framed: bool,
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
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect {
            segment_size,
            records,
            format,
        } => {
            let path = cli.path.ok_or("Repository path required for inspect")?;
            let format = format.parse()?;
            commands::inspect::run(&path, segment_size, records, format)?;
        }
        Commands::Verify {
            segment_size,
            framed,
        } => {
            let path = cli.path.ok_or("Repository path required for verify")?;
            commands::verify::run(&path, segment_size, framed)?;
        }
        Commands::Version => {
            println!("ADDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("ADDB Core v{}", addb_core::VERSION);
            println!("Segment format v{}", addb_core::FORMAT_VERSION);
        }
    }

    Ok(())
}
