//! Cache command - inspect and clear the artifact cache

use crate::cache::manager::short_id;
use crate::cache::{create_provider, CacheIndex, CacheManager, WORK_DIR};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::Config;
use crate::error::GbuildResult;
use console::style;
use std::path::Path;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config, root: &Path) -> GbuildResult<()> {
    match args.action {
        CacheAction::List { format } => list_entries(config, root, format).await,
        CacheAction::Clear => clear_local(root).await,
    }
}

/// List index entries from the configured provider
async fn list_entries(config: &Config, root: &Path, format: OutputFormat) -> GbuildResult<()> {
    let provider = create_provider(&config.cache, root)?;
    let index = provider.get_index().await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&index)?);
            return Ok(());
        }
        OutputFormat::Plain => {
            for artifact in index.artifacts() {
                println!("{}", artifact);
            }
            return Ok(());
        }
        OutputFormat::Table => {}
    }

    if index.is_empty() {
        println!("No cache entries ({} provider)", provider.provider_name());
        return Ok(());
    }
    print_table(&index);
    println!();
    println!(
        "Total: {} key(s), {} artifact(s) ({} provider)",
        index.len(),
        index.artifacts().len(),
        provider.provider_name()
    );
    Ok(())
}

fn print_table(index: &CacheIndex) {
    println!(
        "{:<10} {:<66} {:<14}",
        style("KIND").bold(),
        style("KEY").bold(),
        style("ARTIFACT").bold()
    );
    println!("{}", "-".repeat(90));

    let rows = index
        .hashes
        .iter()
        .map(|(key, artifact)| ("inputs", key, artifact))
        .chain(
            index
                .git_revisions
                .iter()
                .map(|(key, artifact)| ("revision", key, artifact)),
        );

    for (kind, key, artifact) in rows {
        println!("{:<10} {:<66} {:<14}", kind, key, short_id(artifact));
    }
}

/// Remove the local working area
async fn clear_local(root: &Path) -> GbuildResult<()> {
    if CacheManager::clear_local(root).await? {
        println!(
            "{} Removed {}",
            style("[OK]").green(),
            root.join(WORK_DIR).display()
        );
    } else {
        println!("Nothing to clear");
    }
    Ok(())
}
