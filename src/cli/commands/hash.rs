//! Hash command - print the content digest of a directory

use crate::cli::args::HashArgs;
use crate::error::{GbuildError, GbuildResult};
use crate::fingerprint::{digest_dir, IgnoreMatcher};
use console::style;
use std::time::Instant;
use tracing::debug;

/// Execute the hash command
pub async fn execute(args: HashArgs) -> GbuildResult<()> {
    let path = tokio::fs::canonicalize(&args.path)
        .await
        .map_err(|_| GbuildError::PathNotFound(args.path.clone()))?;

    let start = Instant::now();

    // Ignore files are looked up from the directory being hashed
    let scan_root = if path.is_dir() {
        path.clone()
    } else {
        path.parent().map(|p| p.to_path_buf()).unwrap_or_else(|| path.clone())
    };
    let matcher = if args.no_ignore {
        IgnoreMatcher::empty(&scan_root)
    } else {
        tokio::task::spawn_blocking(move || IgnoreMatcher::load(&scan_root))
            .await
            .map_err(|e| GbuildError::Internal(format!("ignore scan panicked: {}", e)))??
    };
    debug!("Using {} ignore files", matcher.len());

    let digest = digest_dir(&path, matcher.into_fn()).await?;

    println!("{}", digest);
    println!("{} {:.2?}", style("Took").dim(), start.elapsed());
    Ok(())
}
