//! versync CLI
//!
//! Command-line tools for inspecting a versync store.
//!
//! # Commands
//!
//! - `status` - Display aggregate sync status
//! - `list` - List tracked items
//! - `conflicts` - List open conflicts
//! - `reset` - Clear the registry
//! - `demo` - Run a scripted sync session against an in-memory remote

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use versync_protocol::{ConflictStrategy, ItemStatus, RecordType};

/// versync command-line tools.
#[derive(Parser)]
#[command(name = "versync")]
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
    /// Display aggregate sync status
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List tracked items
    List {
        /// Only show items with this status
        #[arg(short, long)]
        status: Option<String>,

        /// Only show items of this record type
        #[arg(short = 't', long = "type")]
        record_type: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List open conflicts
    Conflicts {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Clear all tracked items and conflicts
    Reset {
        /// Skip the confirmation check
        #[arg(short, long)]
        yes: bool,
    },

    /// Run a scripted sync session against an in-memory remote
    Demo {
        /// Number of items to track
        #[arg(short, long, default_value = "3")]
        items: usize,

        /// Conflict resolution strategy (take_local, take_remote, merge)
        #[arg(short, long, default_value = "merge")]
        strategy: String,
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
        Commands::Status { format } => {
            let path = cli.path.ok_or("Store path required for status")?;
            commands::status::run(&path, &format)?;
        }
        Commands::List {
            status,
            record_type,
            format,
        } => {
            let path = cli.path.ok_or("Store path required for list")?;
            let status = status.map(|s| s.parse::<ItemStatus>()).transpose()?;
            let record_type = record_type
                .map(|t| t.parse::<RecordType>())
                .transpose()?;
            commands::list::run(&path, status, record_type, &format)?;
        }
        Commands::Conflicts { format } => {
            let path = cli.path.ok_or("Store path required for conflicts")?;
            commands::conflicts::run(&path, &format)?;
        }
        Commands::Reset { yes } => {
            let path = cli.path.ok_or("Store path required for reset")?;
            commands::reset::run(&path, yes)?;
        }
        Commands::Demo { items, strategy } => {
            let strategy = strategy.parse::<ConflictStrategy>()?;
            commands::demo::run(cli.path.as_deref(), items, strategy)?;
        }
        Commands::Version => {
            println!("versync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
