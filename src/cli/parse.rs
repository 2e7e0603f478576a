//! CLI parse: clap types for hearth. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Hearth CLI - inspect and move the stores shared by hearth contexts
#[derive(Parser, Debug)]
#[command(name = "hearth")]
#[command(about = "Single-writer stores shared between application contexts")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one statement against a store
    Exec {
        /// Store name
        store: String,
        /// Statement, e.g. "GET items ?"
        statement: String,
        /// Statement parameters; JSON when parseable, plain strings otherwise
        params: Vec<String>,
    },
    /// Write a snapshot of a store to a file
    Export {
        store: String,
        /// Destination file
        #[arg(long)]
        out: PathBuf,
    },
    /// Replace a store's content with a snapshot file
    Import {
        store: String,
        /// Snapshot file produced by `export`
        file: PathBuf,
    },
    /// Show who holds the storage lease
    LeaseStatus,
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Exec { .. } => "exec",
            Commands::Export { .. } => "export",
            Commands::Import { .. } => "import",
            Commands::LeaseStatus => "lease-status",
        }
    }
}
