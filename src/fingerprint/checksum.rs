//! Checksums over named lists of input/output paths

use crate::error::{GbuildError, GbuildResult};
use crate::fingerprint::git;
use crate::fingerprint::hasher::{builtin_ignores, digest_bytes, digest_dir, IgnoreFn};
use crate::fingerprint::ignore::IgnoreMatcher;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Computes checksums and revision ids for paths below a project root
///
/// Ignore files are scanned once, when the fingerprinter is created.
pub struct Fingerprinter {
    root: PathBuf,
    ignore: IgnoreFn,
}

impl Fingerprinter {
    /// Load the ignore files of `root`
    pub async fn new(root: &Path) -> GbuildResult<Self> {
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|e| GbuildError::io(format!("resolving project root {}", root.display()), e))?;

        let scan_root = root.clone();
        let matcher = tokio::task::spawn_blocking(move || IgnoreMatcher::load(&scan_root))
            .await
            .map_err(|e| GbuildError::Internal(format!("ignore scan panicked: {}", e)))??;
        if matcher.is_empty() {
            debug!("No ignore files under {}", root.display());
        } else {
            debug!("Loaded {} ignore files under {}", matcher.len(), root.display());
        }

        Ok(Self {
            root,
            ignore: matcher.into_fn(),
        })
    }

    /// Fingerprinter that honours no ignore files
    pub async fn without_ignores(root: &Path) -> GbuildResult<Self> {
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|e| GbuildError::io(format!("resolving project root {}", root.display()), e))?;
        let ignore = IgnoreMatcher::empty(&root).into_fn();
        Ok(Self { root, ignore })
    }

    /// Canonical project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Checksum of `entries`, each relative to `base`, honouring ignore files
    ///
    /// One entry yields that entry's digest. Several entries have their
    /// digests concatenated in the given order and hashed again.
    pub async fn checksum(&self, base: &Path, entries: &[String]) -> GbuildResult<String> {
        checksum_with(&self.root.join(base), entries, &self.ignore).await
    }

    /// Checksum of declared outputs, or `None` when any of them does not exist
    ///
    /// Outputs are usually gitignored, so only the built-in exclusions apply.
    /// The result is the id of the artifact packed from the same paths.
    pub async fn output_checksum(
        &self,
        base: &Path,
        entries: &[String],
    ) -> GbuildResult<Option<String>> {
        let base = self.root.join(base);
        if entries.is_empty() || entries.iter().any(|e| !base.join(e).exists()) {
            return Ok(None);
        }
        checksum_with(&base, entries, &builtin_ignores()).await.map(Some)
    }

    /// Lookup key for the committed state of `entries` (relative to `base`)
    ///
    /// Combines the newest revision touching the entries with the entry
    /// paths, so rules with different inputs never share a key. `None` outside
    /// a repository or when no commit touches the entries.
    pub async fn revision_key(
        &self,
        base: &Path,
        entries: &[String],
    ) -> GbuildResult<Option<String>> {
        let base = self.root.join(base);
        let paths: Vec<PathBuf> = entries
            .iter()
            .map(|e| {
                let abs = base.join(e);
                abs.strip_prefix(&self.root).map(Path::to_path_buf).unwrap_or(abs)
            })
            .map(|p| if p.as_os_str().is_empty() { PathBuf::from(".") } else { p })
            .collect();

        let revisions = git::revisions_touching(&self.root, &paths, 1).await?;
        Ok(revisions.into_iter().next().map(|rev| {
            let scope: Vec<String> = paths.iter().map(|p| p.to_string_lossy().into_owned()).collect();
            format!("{}:{}", rev, scope.join(","))
        }))
    }
}

async fn checksum_with(base: &Path, entries: &[String], ignore: &IgnoreFn) -> GbuildResult<String> {
    if let [single] = entries {
        return digest_dir(&base.join(single), ignore.clone()).await;
    }

    let mut concatenated = String::new();
    for entry in entries {
        concatenated.push_str(&digest_dir(&base.join(entry), ignore.clone()).await?);
    }
    Ok(digest_bytes(concatenated.as_bytes()))
}
