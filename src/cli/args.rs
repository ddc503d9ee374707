//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// gbuild - incremental local build orchestrator
///
/// Runs the targets of an execution plan concurrently in dependency order,
/// reusing cached outputs when inputs are unchanged.
#[derive(Parser, Debug)]
#[command(name = "gbuild")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path (defaults to the nearest .gbuild.toml)
    #[arg(short, long, global = true, env = "GBUILD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an execution plan
    Run(RunArgs),

    /// Print the content digest of a directory
    Hash(HashArgs),

    /// List execution plans and their targets
    List(ListArgs),

    /// Inspect or clear the artifact cache
    Cache(CacheArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Execution plan to run
    #[arg(short = 't', long = "target", default_value = "build")]
    pub plan: String,

    /// Skip cache lookups and uploads for this run
    #[arg(long)]
    pub no_cache: bool,
}

/// Arguments for the hash command
#[derive(Parser, Debug)]
pub struct HashArgs {
    /// Directory (or file) to hash
    pub path: PathBuf,

    /// Hash every file, ignoring .gitignore/.gbuildignore patterns
    #[arg(long)]
    pub no_ignore: bool,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Output format for listings
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cache index entries
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove the project's local .gbuild_cache working area
    Clear,
}
