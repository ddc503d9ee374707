//! Fingerprints of one cache rule of one target

use crate::config::schema::{CacheRule, Target};
use crate::error::GbuildResult;
use crate::fingerprint::Fingerprinter;
use std::path::PathBuf;
use tracing::debug;

/// Current input/output fingerprints for a cache rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheState {
    pub target: String,

    /// Directory the rule's paths are relative to
    pub base_dir: PathBuf,

    pub rule: CacheRule,

    pub in_checksum: String,

    /// Newest commit touching the inputs, scoped to the input paths
    pub revision_key: Option<String>,

    /// Absent when any declared output does not exist
    pub out_checksum: Option<String>,
}

impl CacheState {
    /// Fingerprint `rule` of `target`
    ///
    /// The repository is only consulted when `with_revision` is set.
    pub async fn compute(
        fingerprinter: &Fingerprinter,
        target: &Target,
        rule: &CacheRule,
        with_revision: bool,
    ) -> GbuildResult<Self> {
        let base_dir = target.base_dir(fingerprinter.root());
        let in_checksum = fingerprinter.checksum(&base_dir, &rule.inputs).await?;
        let out_checksum = fingerprinter
            .output_checksum(&base_dir, &rule.outputs)
            .await?;
        let revision_key = if with_revision {
            fingerprinter.revision_key(&base_dir, &rule.inputs).await?
        } else {
            None
        };

        debug!(
            "Cache state for {}: in={} out={} revision={}",
            target.name,
            in_checksum,
            out_checksum.as_deref().unwrap_or("-"),
            revision_key.as_deref().unwrap_or("-")
        );

        Ok(Self {
            target: target.name.clone(),
            base_dir,
            rule: rule.clone(),
            in_checksum,
            revision_key,
            out_checksum,
        })
    }

    /// Whether the outputs on disk are exactly `artifact_id`
    pub fn is_up_to_date(&self, artifact_id: &str) -> bool {
        self.out_checksum.as_deref() == Some(artifact_id)
    }

    /// Absolute location of a declared output
    pub fn output_path(&self, output: &str) -> PathBuf {
        self.base_dir.join(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn computes_checksums_relative_to_work_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("web/src")).unwrap();
        fs::write(dir.path().join("web/src/index.ts"), "export {}").unwrap();

        let fp = Fingerprinter::new(dir.path()).await.unwrap();
        let rule = CacheRule::new(["src"], ["dist"]);
        let target = Target::new("web", "npm run build")
            .with_work_dir("web")
            .with_cache(rule.clone());

        let state = CacheState::compute(&fp, &target, &rule, false).await.unwrap();
        assert_eq!(state.base_dir, fp.root().join("web"));
        assert!(state.out_checksum.is_none());
        assert!(state.revision_key.is_none());

        fs::create_dir_all(dir.path().join("web/dist")).unwrap();
        fs::write(dir.path().join("web/dist/index.js"), "").unwrap();
        let state = CacheState::compute(&fp, &target, &rule, false).await.unwrap();
        let out = state.out_checksum.clone().unwrap();
        assert!(state.is_up_to_date(&out));
        assert!(!state.is_up_to_date("other"));
    }
}
