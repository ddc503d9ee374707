//! Concurrent directory content hashing
//!
//! Walks a tree on the blocking pool and digests every regular file in its
//! own task. Results fan in through a bounded channel; the consumer drops
//! the receiver on the first error, which stops the walk and releases any
//! file task still waiting to send.

use crate::error::{GbuildError, GbuildResult};
use crate::fingerprint::ignore::is_always_ignored;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use walkdir::WalkDir;

/// Decides whether a path (and whether it is a directory) is excluded
pub type IgnoreFn = Arc<dyn Fn(&Path, bool) -> bool + Send + Sync>;

/// SHA-256 digest of a single file
pub type FileDigest = [u8; 32];

/// Queue depth between file tasks and the collector
const RESULT_QUEUE_DEPTH: usize = 64;

/// Predicate that excludes nothing
pub fn no_ignore() -> IgnoreFn {
    Arc::new(|_: &Path, _: bool| false)
}

/// Predicate that excludes only the `.git` and `.gbuild_cache` directories
///
/// Matches what the archiver packs, so output digests equal artifact ids.
pub fn builtin_ignores() -> IgnoreFn {
    Arc::new(|path: &Path, _: bool| path.file_name().is_some_and(is_always_ignored))
}

/// Hex digest of a byte string
pub fn digest_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Digest of a directory tree (or single file) at `root`
///
/// Per-file digests are ordered by path relative to `root`, hex encoded,
/// concatenated and hashed again. A tree holding exactly one file yields
/// that file's digest unchanged.
pub async fn digest_dir(root: &Path, ignore: IgnoreFn) -> GbuildResult<String> {
    let files = digest_files(root, ignore).await?;
    debug!("Hashed {} files under {}", files.len(), root.display());
    Ok(combine_sorted(&files))
}

/// Combine per-file digests keyed by relative path
pub fn combine_sorted(files: &BTreeMap<PathBuf, FileDigest>) -> String {
    if files.len() == 1 {
        if let Some(digest) = files.values().next() {
            return hex::encode(digest);
        }
    }

    let concatenated: String = files.values().map(hex::encode).collect();
    digest_bytes(concatenated.as_bytes())
}

/// Digest every non-ignored regular file under `root`
///
/// Any unreadable file or inaccessible directory aborts the whole walk.
pub async fn digest_files(
    root: &Path,
    ignore: IgnoreFn,
) -> GbuildResult<BTreeMap<PathBuf, FileDigest>> {
    let (tx, mut rx) = mpsc::channel(RESULT_QUEUE_DEPTH);
    let handle = tokio::runtime::Handle::current();
    let walk_root = root.to_path_buf();

    let walker = tokio::task::spawn_blocking(move || walk(&walk_root, ignore, tx, handle));

    let mut digests = BTreeMap::new();
    while let Some(result) = rx.recv().await {
        match result {
            Ok((path, digest)) => {
                digests.insert(path, digest);
            }
            Err(e) => {
                // Closing the queue stops the walker and unblocks pending senders
                drop(rx);
                let _ = walker.await;
                return Err(e);
            }
        }
    }

    walker
        .await
        .map_err(|e| GbuildError::Internal(format!("hash walker panicked: {}", e)))?;
    Ok(digests)
}

type FileResult = GbuildResult<(PathBuf, FileDigest)>;

fn walk(
    root: &Path,
    ignore: IgnoreFn,
    tx: mpsc::Sender<FileResult>,
    handle: tokio::runtime::Handle,
) {
    let filter = ignore.clone();
    let entries = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(move |entry| entry.depth() == 0 || !filter(entry.path(), entry.file_type().is_dir()));

    for entry in entries {
        if tx.is_closed() {
            debug!("Hash walk of {} cancelled", root.display());
            return;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                let _ = tx.blocking_send(Err(GbuildError::Walk {
                    path,
                    reason: e.to_string(),
                }));
                return;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        // The walk root itself is only filtered when it is a single file
        if entry.depth() == 0 && ignore(entry.path(), false) {
            continue;
        }

        let path = entry.into_path();
        let relative = match path.strip_prefix(root) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            _ => path.file_name().map(PathBuf::from).unwrap_or_default(),
        };
        let tx = tx.clone();
        handle.spawn(async move {
            let result = tokio::fs::read(&path)
                .await
                .map(|data| {
                    let mut digest: FileDigest = [0; 32];
                    digest.copy_from_slice(&Sha256::digest(&data));
                    (relative, digest)
                })
                .map_err(|e| GbuildError::io(format!("reading {}", path.display()), e));
            // A closed queue means the collector gave up; nothing to report
            let _ = tx.send(result).await;
        });
    }
}
