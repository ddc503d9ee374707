//! Cache index: lookup keys to stored artifact ids

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted mapping from fingerprints and revision ids to artifact ids
///
/// An artifact id is always the output checksum of the archived outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheIndex {
    /// Input checksum -> artifact id
    pub hashes: BTreeMap<String, String>,

    /// Revision key (commit plus input paths) -> artifact id
    pub git_revisions: BTreeMap<String, String>,
}

impl CacheIndex {
    /// Total number of lookup keys
    pub fn len(&self) -> usize {
        self.hashes.len() + self.git_revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find the artifact for an input checksum, falling back to the
    /// revision key of the same inputs
    pub fn lookup(&self, in_checksum: &str, revision_key: Option<&str>) -> Option<&str> {
        self.hashes
            .get(in_checksum)
            .or_else(|| revision_key.and_then(|key| self.git_revisions.get(key)))
            .map(String::as_str)
    }

    /// Record an input checksum (and optionally a revision key) for an artifact
    pub fn record(&mut self, in_checksum: &str, artifact: &str, revision: Option<&str>) {
        self.hashes.insert(in_checksum.to_string(), artifact.to_string());
        if let Some(rev) = revision {
            self.git_revisions.insert(rev.to_string(), artifact.to_string());
        }
    }

    /// Distinct artifact ids referenced by the index
    pub fn artifacts(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .hashes
            .values()
            .chain(self.git_revisions.values())
            .map(String::as_str)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_prefers_input_checksum() {
        let mut index = CacheIndex::default();
        index.record("in-1", "out-1", Some("rev-a"));
        index.git_revisions.insert("rev-b".to_string(), "out-2".to_string());

        assert_eq!(index.lookup("in-1", Some("rev-b")), Some("out-1"));
    }

    #[test]
    fn lookup_falls_back_to_revision_key() {
        let mut index = CacheIndex::default();
        index.git_revisions.insert("rev-b:src".to_string(), "out-b".to_string());

        assert_eq!(index.lookup("unknown", Some("rev-b:src")), Some("out-b"));
        assert_eq!(index.lookup("unknown", Some("rev-a:src")), None);
        assert_eq!(index.lookup("unknown", None), None);
    }

    #[test]
    fn record_grows_index() {
        let mut index = CacheIndex::default();
        assert!(index.is_empty());

        index.record("in", "out", None);
        assert_eq!(index.len(), 1);

        index.record("in-2", "out", Some("rev"));
        assert_eq!(index.len(), 3);
        assert_eq!(index.artifacts(), vec!["out"]);
    }

    #[test]
    fn index_json_shape() {
        let mut index = CacheIndex::default();
        index.record("in", "out", Some("rev"));

        let json = serde_json::to_value(&index).unwrap();
        assert_eq!(json["hashes"]["in"], "out");
        assert_eq!(json["git_revisions"]["rev"], "out");

        let parsed: CacheIndex = serde_json::from_str("{}").unwrap();
        assert!(parsed.is_empty());
    }
}
