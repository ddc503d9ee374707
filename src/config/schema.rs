//! Configuration schema for gbuild
//!
//! Configuration is stored in `.gbuild.toml` at the project root.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Named units of work
    pub targets: Vec<Target>,

    /// Named sets of targets that run together
    pub execution_plans: Vec<ExecutionPlan>,

    /// Artifact cache settings
    pub cache: CacheConfig,

    /// Scheduler settings
    pub execution: ExecutionConfig,
}

/// A named unit of work wrapping a shell command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Unique target name
    pub name: String,

    /// Shell command to run
    pub run: String,

    /// Directory to run the command in (must exist)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,

    /// Extra attempts after the first failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    /// Targets that must finish before this one starts
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<String>,

    /// Input/output sets used for incremental builds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caches: Vec<CacheRule>,
}

impl Target {
    /// Create a target with no work dir, retries, dependencies or caches
    pub fn new(name: impl Into<String>, run: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run: run.into(),
            work_dir: None,
            max_retries: None,
            depends_on: BTreeSet::new(),
            caches: Vec::new(),
        }
    }

    /// Set the working directory
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Add dependencies by name
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Add a cache rule
    pub fn with_cache(mut self, rule: CacheRule) -> Self {
        self.caches.push(rule);
        self
    }

    /// Number of extra attempts allowed after a failure
    pub fn retry_budget(&self) -> u32 {
        self.max_retries.unwrap_or(0)
    }

    /// Directory the target's command and cache paths are relative to
    pub fn base_dir(&self, root: &Path) -> PathBuf {
        match &self.work_dir {
            Some(dir) => root.join(dir),
            None => root.to_path_buf(),
        }
    }

    /// Pin the work dir to an absolute path; targets without one run in
    /// the project root
    pub fn resolved(mut self, root: &Path) -> Self {
        self.work_dir = Some(self.base_dir(root));
        self
    }
}

/// Declared inputs and outputs of a target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRule {
    /// Paths whose content decides cacheability
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Paths produced by the command
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl CacheRule {
    pub fn new<I, O>(inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
        }
    }
}

/// Named list of targets to execute together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub name: String,
    #[serde(default)]
    pub targets: Vec<String>,
}

/// Supported cache storage backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Directory on the local filesystem
    #[default]
    Local,
    /// HTTP object store accepting GET/PUT
    Http,
}

/// Artifact cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable incremental builds (default: true)
    pub enabled: bool,

    /// Storage backend
    pub backend: CacheBackend,

    /// Store directory for the local backend (default: user cache dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Base URL for the http backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Also key artifacts by the newest commit touching their inputs
    pub revision_keys: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Local,
            dir: None,
            url: None,
            revision_keys: true,
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Interval at which workers poll the result sequence
    pub poll_interval_ms: u64,

    /// Shell used to run target commands
    pub shell: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5,
            shell: default_shell().to_string(),
        }
    }
}

#[cfg(unix)]
fn default_shell() -> &'static str {
    "/bin/sh"
}

#[cfg(not(unix))]
fn default_shell() -> &'static str {
    "cmd"
}
