//! Repository revision lookups via the `git` CLI
//!
//! A project that is not a git repository (or a machine without git) simply
//! has no revisions: lookups return empty results and the tree is treated
//! as having uncommitted changes.

use crate::error::{GbuildError, GbuildResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Run `git -C repo <args>`, returning stdout on success and `None` otherwise
async fn git(repo: &Path, args: &[&str]) -> GbuildResult<Option<String>> {
    debug!("Executing: git {:?} in {}", args, repo.display());

    let output = match Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("git not installed, skipping revision lookup");
            return Ok(None);
        }
        Err(e) => return Err(GbuildError::command_failed(format!("git {:?}", args), e)),
    };

    if output.status.success() {
        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    } else {
        debug!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        Ok(None)
    }
}

/// Most recent revisions (newest first) touching any of `paths`
pub async fn revisions_touching(
    repo: &Path,
    paths: &[PathBuf],
    limit: usize,
) -> GbuildResult<Vec<String>> {
    if limit == 0 || paths.is_empty() {
        return Ok(Vec::new());
    }

    let max_count = format!("--max-count={}", limit);
    let path_args: Vec<String> = paths.iter().map(|p| p.to_string_lossy().into_owned()).collect();
    let mut args = vec!["log", "--format=%H", max_count.as_str(), "--"];
    args.extend(path_args.iter().map(String::as_str));

    Ok(git(repo, &args)
        .await?
        .map(|out| out.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect())
        .unwrap_or_default())
}

/// Whether the working tree differs from HEAD
///
/// The `.gbuild_cache` working area is excluded. Anything that prevents the
/// check counts as changed.
pub async fn has_uncommitted_changes(repo: &Path) -> GbuildResult<bool> {
    let status = git(
        repo,
        &["status", "--porcelain", "--", ".", ":(exclude).gbuild_cache"],
    )
    .await?;
    Ok(status.map_or(true, |out| !out.trim().is_empty()))
}
