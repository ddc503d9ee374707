//! Cache load/put passes over a set of targets
//!
//! The index is fetched once per pass and written back whole. Artifacts are
//! materialized under the project's working area:
//!
//! ```text
//! .gbuild_cache/cache/<artifact-id>/        unpacked outputs
//! .gbuild_cache/compressed/<artifact-id>.tar.gz
//! ```

use crate::cache::archive;
use crate::cache::provider::CacheProvider;
use crate::cache::state::CacheState;
use crate::config::schema::Target;
use crate::error::{GbuildError, GbuildResult};
use crate::fingerprint::{git, Fingerprinter};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Working area directory name under the project root
pub const WORK_DIR: &str = ".gbuild_cache";
const UNPACKED_DIR: &str = "cache";
const COMPRESSED_DIR: &str = "compressed";

/// Outcome of a load pass
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Targets whose every cache rule hit
    pub cached: HashSet<String>,

    /// Rules whose outputs were already current
    pub up_to_date: usize,

    /// Rules whose outputs were restored from an artifact
    pub restored: usize,
}

/// Outcome of a put pass
#[derive(Debug, Default)]
pub struct PutReport {
    pub uploaded: usize,
    pub index_written: bool,
}

/// Reuses and stores target outputs through a cache provider
pub struct CacheManager {
    fingerprinter: Fingerprinter,
    provider: Arc<dyn CacheProvider>,
    revision_keys: bool,
}

impl CacheManager {
    /// Create a manager for the project at `root`
    pub async fn new(
        root: &Path,
        provider: Arc<dyn CacheProvider>,
        revision_keys: bool,
    ) -> GbuildResult<Self> {
        Ok(Self {
            fingerprinter: Fingerprinter::new(root).await?,
            provider,
            revision_keys,
        })
    }

    pub fn root(&self) -> &Path {
        self.fingerprinter.root()
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    fn work_dir(&self) -> PathBuf {
        self.root().join(WORK_DIR)
    }

    fn unpacked_dir(&self, artifact_id: &str) -> PathBuf {
        self.work_dir().join(UNPACKED_DIR).join(artifact_id)
    }

    fn compressed_path(&self, artifact_id: &str) -> PathBuf {
        self.work_dir()
            .join(COMPRESSED_DIR)
            .join(format!("{}.tar.gz", artifact_id))
    }

    /// Revision keys are only trusted when the tree matches a commit
    async fn use_revision_keys(&self) -> GbuildResult<bool> {
        if !self.revision_keys {
            return Ok(false);
        }
        if git::has_uncommitted_changes(self.root()).await? {
            debug!("Working tree has uncommitted changes, skipping revision keys");
            return Ok(false);
        }
        Ok(true)
    }

    /// Restore outputs of targets whose inputs have a known artifact
    ///
    /// Returns the targets for which every cache rule hit.
    pub async fn load(&self, targets: &[Target]) -> GbuildResult<LoadReport> {
        let index = self.provider.get_index().await?;
        let with_revision = self.use_revision_keys().await?;
        let mut report = LoadReport::default();

        for target in targets.iter().filter(|t| !t.caches.is_empty()) {
            let mut all_hit = true;

            for rule in &target.caches {
                let state =
                    CacheState::compute(&self.fingerprinter, target, rule, with_revision).await?;

                let Some(artifact) = index.lookup(&state.in_checksum, state.revision_key.as_deref())
                else {
                    debug!("Cache miss for {}", target.name);
                    all_hit = false;
                    continue;
                };

                if state.is_up_to_date(artifact) {
                    debug!("Outputs of {} are up to date", target.name);
                    report.up_to_date += 1;
                    continue;
                }

                self.materialize(artifact).await?;
                self.restore(&state, artifact).await?;
                info!("Restored outputs of {} from cache", target.name);
                report.restored += 1;
            }

            if all_hit {
                report.cached.insert(target.name.clone());
            }
        }

        Ok(report)
    }

    /// Archive and upload outputs of targets whose inputs are not indexed yet
    pub async fn put(&self, targets: &[Target]) -> GbuildResult<PutReport> {
        let mut index = self.provider.get_index().await?;
        let before = index.len();
        let with_revision = self.use_revision_keys().await?;
        let mut report = PutReport::default();

        for target in targets {
            for rule in &target.caches {
                let state =
                    CacheState::compute(&self.fingerprinter, target, rule, with_revision).await?;

                if index.hashes.contains_key(&state.in_checksum) {
                    debug!("Inputs of {} already indexed", target.name);
                    continue;
                }
                let Some(artifact) = state.out_checksum.clone() else {
                    warn!("Not caching {}: declared outputs are missing", target.name);
                    continue;
                };

                let archive_path = self.compressed_path(&artifact);
                let base = state.base_dir.clone();
                let outputs = state.rule.outputs.clone();
                let dest = archive_path.clone();
                tokio::task::spawn_blocking(move || archive::pack(&base, &outputs, &dest))
                    .await
                    .map_err(|e| GbuildError::Internal(format!("archiver panicked: {}", e)))??;

                let file = tokio::fs::File::open(&archive_path)
                    .await
                    .map_err(|e| GbuildError::io(format!("opening {}", archive_path.display()), e))?;
                self.provider.put_cache(&artifact, Box::new(file)).await?;

                index.record(&state.in_checksum, &artifact, state.revision_key.as_deref());
                info!("Cached outputs of {} as {}", target.name, short_id(&artifact));
                report.uploaded += 1;
            }
        }

        if index.len() > before {
            self.provider.put_index(&index).await?;
            report.index_written = true;
        }
        Ok(report)
    }

    /// Fetch and unpack an artifact unless it is already on disk
    async fn materialize(&self, artifact_id: &str) -> GbuildResult<()> {
        let unpacked = self.unpacked_dir(artifact_id);
        if tokio::fs::try_exists(&unpacked).await.unwrap_or(false) {
            debug!("Artifact {} already materialized", short_id(artifact_id));
            return Ok(());
        }

        let compressed = self.compressed_path(artifact_id);
        if let Some(parent) = compressed.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| GbuildError::io(format!("creating {}", parent.display()), e))?;
        }
        let mut reader = self.provider.get_cache(artifact_id).await?;
        let mut file = tokio::fs::File::create(&compressed)
            .await
            .map_err(|e| GbuildError::io(format!("creating {}", compressed.display()), e))?;
        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| GbuildError::io(format!("downloading artifact {}", artifact_id), e))?;
        drop(file);

        let staging = unpacked.with_file_name(format!(".{}.tmp", uuid::Uuid::new_v4()));
        let (archive_path, dest) = (compressed.clone(), staging.clone());
        let unpacked_result =
            tokio::task::spawn_blocking(move || archive::unpack(&archive_path, &dest))
                .await
                .map_err(|e| GbuildError::Internal(format!("archiver panicked: {}", e)))?;
        if let Err(e) = unpacked_result {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(e);
        }

        if let Err(e) = tokio::fs::rename(&staging, &unpacked).await {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            if !unpacked.exists() {
                return Err(GbuildError::io(
                    format!("moving artifact into {}", unpacked.display()),
                    e,
                ));
            }
        }
        debug!("Materialized artifact {}", short_id(artifact_id));
        Ok(())
    }

    /// Copy a materialized artifact into the rule's output locations
    async fn restore(&self, state: &CacheState, artifact_id: &str) -> GbuildResult<()> {
        let source_root = self.unpacked_dir(artifact_id);
        let copies: Vec<(PathBuf, PathBuf, bool)> = state
            .rule
            .outputs
            .iter()
            .map(|output| {
                let relative = normalize(Path::new(output));
                let whole_dir = relative.as_os_str().is_empty();
                (source_root.join(&relative), state.output_path(output), whole_dir)
            })
            .collect();

        tokio::task::spawn_blocking(move || {
            for (src, dst, whole_dir) in copies {
                restore_output(&src, &dst, whole_dir)?;
            }
            Ok::<_, GbuildError>(())
        })
        .await
        .map_err(|e| GbuildError::Internal(format!("restore panicked: {}", e)))?
    }

    /// Remove the project's local working area
    pub async fn clear_local(root: &Path) -> GbuildResult<bool> {
        let dir = root.join(WORK_DIR);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(GbuildError::io(format!("removing {}", dir.display()), e)),
        }
    }
}

/// First 12 characters of an artifact id for log lines
pub fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Replace `dst` with `src`; a whole-directory output is merged instead
fn restore_output(src: &Path, dst: &Path, whole_dir: bool) -> GbuildResult<()> {
    let metadata = match fs::metadata(src) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Artifact has no entry for {}", dst.display());
            return Ok(());
        }
        Err(e) => return Err(GbuildError::io(format!("reading {}", src.display()), e)),
    };

    if !whole_dir {
        remove_existing(dst)?;
    }

    if metadata.is_dir() {
        copy_tree(src, dst)
    } else {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| GbuildError::io(format!("creating {}", parent.display()), e))?;
        }
        fs::copy(src, dst)
            .map_err(|e| GbuildError::io(format!("copying to {}", dst.display()), e))?;
        Ok(())
    }
}

fn remove_existing(path: &Path) -> GbuildResult<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(m) if m.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };
    result.map_err(|e| GbuildError::io(format!("removing stale {}", path.display()), e))
}

fn copy_tree(src: &Path, dst: &Path) -> GbuildResult<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| GbuildError::Walk {
            path: e.path().unwrap_or(src).to_path_buf(),
            reason: e.to_string(),
        })?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| GbuildError::io(format!("creating {}", target.display()), e))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target)
                .map_err(|e| GbuildError::io(format!("copying to {}", target.display()), e))?;
        }
    }
    Ok(())
}
