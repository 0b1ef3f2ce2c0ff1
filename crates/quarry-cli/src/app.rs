//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "quarry")]
#[command(
    author,
    version,
    about = "Local-first hybrid search over your documents"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true, env = "QUARRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the index snapshots
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Directory stored paths are relative to
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Index files or directories (configured roots when none given)
    Index(IndexArgs),

    /// Remove a file or directory from the index
    #[command(alias = "rm")]
    Remove(RemoveArgs),

    /// Hybrid dense + keyword search
    Search(SearchArgs),

    /// Print an indexed document
    Get(GetArgs),

    /// Show index statistics
    Stats,

    /// Sync the remote mirror now
    Mirror,
}

#[derive(Args)]
pub struct IndexArgs {
    /// Files or directories to index
    pub paths: Vec<PathBuf>,
}

#[derive(Args)]
pub struct RemoveArgs {
    /// Indexed file or directory
    pub path: PathBuf,
}

#[derive(Args)]
pub struct SearchArgs {
    /// Search query
    #[arg(required = true)]
    pub query: Vec<String>,

    /// Number of results
    #[arg(short = 'k', long, default_value = "10")]
    pub limit: usize,

    /// Dense weight in [0, 1]; 0 is keyword only, 1 is dense only
    #[arg(long, default_value = "0.5")]
    pub alpha: f32,

    /// Restrict to file types (pdf, markdown, text, word, pages)
    #[arg(short = 't', long = "type")]
    pub types: Vec<String>,

    /// Require tags (repeatable, all must match)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Show dense and keyword score components
    #[arg(long)]
    pub explain: bool,

    /// Show the chunk excerpt under each hit
    #[arg(long)]
    pub full: bool,
}

#[derive(Args)]
pub struct GetArgs {
    /// Indexed file path (absolute or relative to the base directory)
    pub file: PathBuf,

    /// Only this page (PDF and Pages documents)
    #[arg(long)]
    pub page: Option<u32>,

    /// Include line numbers
    #[arg(long)]
    pub line_numbers: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Cli,
    Json,
    Md,
    Files,
}
