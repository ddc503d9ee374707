//! Cache provider abstraction
//!
//! The cache manager talks to artifact storage only through this trait, so
//! backends (local directory, HTTP store) are interchangeable.

use crate::cache::index::CacheIndex;
use crate::error::GbuildResult;
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Byte stream of a compressed artifact
pub type ArtifactReader = Box<dyn AsyncRead + Send + Unpin>;

/// Abstract artifact storage
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Fetch the index; a store without one yields an empty index
    async fn get_index(&self) -> GbuildResult<CacheIndex>;

    /// Replace the stored index
    async fn put_index(&self, index: &CacheIndex) -> GbuildResult<()>;

    /// Open the archive stored under `artifact_id`
    async fn get_cache(&self, artifact_id: &str) -> GbuildResult<ArtifactReader>;

    /// Store an archive under `artifact_id`
    async fn put_cache(&self, artifact_id: &str, data: ArtifactReader) -> GbuildResult<()>;

    /// Human-readable backend name
    fn provider_name(&self) -> &'static str;
}

/// Reject ids that could address anything outside the artifact namespace
pub fn validate_artifact_id(artifact_id: &str) -> bool {
    !artifact_id.is_empty() && artifact_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_ids() {
        assert!(validate_artifact_id("9f86d081884c7d659a2feaa0c55ad015"));
        assert!(!validate_artifact_id(""));
        assert!(!validate_artifact_id("../index"));
        assert!(!validate_artifact_id("a/b"));
    }
}
