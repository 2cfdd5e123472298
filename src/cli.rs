//! Command-line interface.

use crate::models::{ListId, SortKey};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// A terminal dashboard for stock watchlists.
///
/// Shows a starred list, the server-chosen Rebound Index and three
/// editable watchlists, each with 1/5/20/60-day performance and RSI.
#[derive(Parser, Debug, Clone)]
#[command(name = "watchboard")]
#[command(version)]
#[command(about = "A terminal dashboard for stock watchlists", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "WATCHBOARD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for lists and cache snapshots
    #[arg(long, env = "WATCHBOARD_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Quote API base URL
    #[arg(long, env = "WATCHBOARD_API", global = true)]
    pub api: Option<String>,

    /// Request timeout in seconds (default: wait indefinitely)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// List to show: starred, rebound, watchlistA, watchlistB, watchlistC
    #[arg(short = 'l', long, env = "WATCHBOARD_LIST", value_parser = parse_list)]
    pub list: Option<ListId>,

    /// Initial sort column
    #[arg(short = 'o', long, value_enum)]
    pub sort: Option<SortField>,

    /// Sort descending
    #[arg(short = 'r', long)]
    pub reverse: bool,

    /// Batch mode - print the list once and exit
    #[arg(short = 'b', long)]
    pub batch: bool,

    /// Output format for batch mode
    #[arg(long, value_enum, default_value = "text")]
    pub export: ExportFormat,

    /// Verbose logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Maintenance commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Add symbols to a watchlist and fetch their metrics
    Add {
        #[arg(value_parser = parse_list)]
        list: ListId,
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Remove symbols from a list
    Remove {
        #[arg(value_parser = parse_list)]
        list: ListId,
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Star or unstar symbols
    Star {
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Write the watchlists and starred entries to a JSON file
    Export {
        /// Output path (default: watchboard-export-<date>.json)
        path: Option<PathBuf>,
    },
    /// Fill empty lists from a JSON file of the export shape
    Seed { path: PathBuf },
    /// Relay /api/* to the upstream API
    Proxy {
        /// Port to listen on
        #[arg(short = 'p', long)]
        port: Option<u16>,
        /// Upstream origin
        #[arg(long)]
        upstream: Option<String>,
    },
    /// Print a sample configuration file
    SampleConfig,
}

fn parse_list(s: &str) -> Result<ListId, String> {
    s.parse()
}

/// Sort field options.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortField {
    Symbol,
    Perf1d,
    Perf5d,
    Perf20d,
    Perf60d,
    Rsi14,
}

impl From<SortField> for SortKey {
    fn from(field: SortField) -> Self {
        match field {
            SortField::Symbol => SortKey::Symbol,
            SortField::Perf1d => SortKey::Perf1d,
            SortField::Perf5d => SortKey::Perf5d,
            SortField::Perf20d => SortKey::Perf20d,
            SortField::Perf60d => SortKey::Perf60d,
            SortField::Rsi14 => SortKey::Rsi14,
        }
    }
}

/// Export format for batch output.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ExportFormat {
    /// Plain text table
    Text,
    /// Comma-separated values (CSV)
    Csv,
    /// JavaScript Object Notation (JSON)
    Json,
}

impl From<ExportFormat> for crate::export::ExportFormat {
    fn from(format: ExportFormat) -> Self {
        match format {
            ExportFormat::Text => crate::export::ExportFormat::Text,
            ExportFormat::Csv => crate::export::ExportFormat::Csv,
            ExportFormat::Json => crate::export::ExportFormat::Json,
        }
    }
}

impl Args {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Args::parse()
    }
}
