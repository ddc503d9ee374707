//! Cache provider backed by a local directory
//!
//! Layout:
//!
//! ```text
//! <dir>/index.json
//! <dir>/artifacts/<artifact-id>.tar.gz
//! ```

use crate::cache::index::CacheIndex;
use crate::cache::provider::{validate_artifact_id, ArtifactReader, CacheProvider};
use crate::error::{GbuildError, GbuildResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const INDEX_FILE: &str = "index.json";
const ARTIFACTS_DIR: &str = "artifacts";

/// Artifact store in a directory on this machine
pub struct LocalCacheProvider {
    dir: PathBuf,
}

impl LocalCacheProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Platform cache directory for gbuild (e.g. `~/.cache/gbuild`)
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("gbuild")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    fn artifact_path(&self, artifact_id: &str) -> GbuildResult<PathBuf> {
        if !validate_artifact_id(artifact_id) {
            return Err(GbuildError::provider(
                self.provider_name(),
                format!("invalid artifact id {:?}", artifact_id),
            ));
        }
        Ok(self
            .dir
            .join(ARTIFACTS_DIR)
            .join(format!("{}.tar.gz", artifact_id)))
    }

    /// Write to a sibling temp file, then rename over `path`
    async fn write_atomic(&self, path: &Path, mut data: ArtifactReader) -> GbuildResult<()> {
        let parent = path.parent().unwrap_or(&self.dir);
        fs::create_dir_all(parent)
            .await
            .map_err(|e| GbuildError::io(format!("creating {}", parent.display()), e))?;

        let tmp = parent.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        let result = async {
            let mut file = fs::File::create(&tmp)
                .await
                .map_err(|e| GbuildError::io(format!("creating {}", tmp.display()), e))?;
            tokio::io::copy(&mut data, &mut file)
                .await
                .map_err(|e| GbuildError::io(format!("writing {}", tmp.display()), e))?;
            file.flush()
                .await
                .map_err(|e| GbuildError::io(format!("flushing {}", tmp.display()), e))?;
            fs::rename(&tmp, path)
                .await
                .map_err(|e| GbuildError::io(format!("moving {} into place", path.display()), e))
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&tmp).await;
        }
        result
    }
}

#[async_trait]
impl CacheProvider for LocalCacheProvider {
    async fn get_index(&self) -> GbuildResult<CacheIndex> {
        let path = self.index_path();
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cache index at {}, starting empty", path.display());
                Ok(CacheIndex::default())
            }
            Err(e) => Err(GbuildError::io(format!("reading {}", path.display()), e)),
        }
    }

    async fn put_index(&self, index: &CacheIndex) -> GbuildResult<()> {
        let json = serde_json::to_vec_pretty(index)?;
        let path = self.index_path();
        self.write_atomic(&path, Box::new(std::io::Cursor::new(json)))
            .await?;
        debug!("Wrote cache index with {} keys to {}", index.len(), path.display());
        Ok(())
    }

    async fn get_cache(&self, artifact_id: &str) -> GbuildResult<ArtifactReader> {
        let path = self.artifact_path(artifact_id)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(GbuildError::CacheArtifactNotFound(artifact_id.to_string()))
            }
            Err(e) => Err(GbuildError::io(format!("opening {}", path.display()), e)),
        }
    }

    async fn put_cache(&self, artifact_id: &str, data: ArtifactReader) -> GbuildResult<()> {
        let path = self.artifact_path(artifact_id)?;
        self.write_atomic(&path, data).await?;
        debug!("Stored artifact {} at {}", artifact_id, path.display());
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }
}
