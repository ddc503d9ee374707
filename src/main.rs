//! gbuild - incremental local build orchestrator
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use gbuild::cli::{Cli, Commands};
use gbuild::config::ConfigManager;
use gbuild::error::{GbuildError, GbuildResult};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> GbuildResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = info, 1 = debug, 2+ = trace
    let filter = match cli.verbose {
        0 => EnvFilter::new("gbuild=info"),
        1 => EnvFilter::new("gbuild=debug"),
        _ => EnvFilter::new("gbuild=trace"),
    };

    // Logs go to stderr so command output stays clean on stdout
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
    }

    // Hash command doesn't need config loading
    if let Commands::Hash(args) = cli.command {
        return gbuild::cli::commands::hash(args).await;
    }

    let cwd = std::env::current_dir().map_err(|e| GbuildError::io("getting current directory", e))?;
    let config_manager = ConfigManager::locate(cli.config, &cwd)?;
    let config = config_manager.load().await?;
    let root = config_manager.canonical_root().await?;
    debug!("Project root: {}", root.display());

    // Dispatch to command
    match cli.command {
        Commands::Hash(_) => unreachable!("Hash handled above"),
        Commands::Run(args) => gbuild::cli::commands::run(args, &config, &root).await,
        Commands::List(args) => gbuild::cli::commands::list(args, &config).await,
        Commands::Cache(args) => gbuild::cli::commands::cache(args, &config, &root).await,
    }
}
