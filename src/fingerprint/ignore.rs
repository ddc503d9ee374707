//! Ignore-file discovery and matching
//!
//! Every `.gitignore` (and `.gbuildignore`) under the project root becomes an
//! independent pattern set scoped to the directory holding it. A path is
//! excluded when any pattern set whose directory contains the path matches.

use crate::error::{GbuildError, GbuildResult};
use crate::fingerprint::hasher::IgnoreFn;
use ::ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

/// File names holding ignore patterns
pub const IGNORE_FILE_NAMES: &[&str] = &[".gitignore", ".gbuildignore"];

/// Directory names that are never hashed
const ALWAYS_IGNORED: &[&str] = &[".git", ".gbuild_cache"];

/// Patterns from one ignore file
#[derive(Debug)]
struct ScopedPatterns {
    /// Directory of the ignore file, relative to the project root
    dir: PathBuf,
    matcher: Gitignore,
}

/// Exclusion predicate built from all ignore files under a project root
#[derive(Debug)]
pub struct IgnoreMatcher {
    root: PathBuf,
    scopes: Vec<ScopedPatterns>,
}

impl IgnoreMatcher {
    /// Scan `root` for ignore files and build their pattern sets
    pub fn load(root: &Path) -> GbuildResult<Self> {
        let mut scopes = Vec::new();

        let entries = WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && is_always_ignored(e.file_name())));

        for entry in entries {
            let entry = entry.map_err(|e| GbuildError::Walk {
                path: e.path().unwrap_or(root).to_path_buf(),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let is_ignore_file = entry
                .file_name()
                .to_str()
                .is_some_and(|name| IGNORE_FILE_NAMES.contains(&name));
            if !is_ignore_file {
                continue;
            }

            let path = entry.path();
            let dir_abs = path.parent().unwrap_or(root);
            let dir = dir_abs.strip_prefix(root).unwrap_or(Path::new("")).to_path_buf();
            let content = fs::read_to_string(path)
                .map_err(|e| GbuildError::io(format!("reading {}", path.display()), e))?;

            let matcher = build_matcher(dir_abs, path, &content)?;
            debug!("Loaded {} patterns from {}", matcher.num_ignores(), path.display());
            scopes.push(ScopedPatterns { dir, matcher });
        }

        Ok(Self {
            root: root.to_path_buf(),
            scopes,
        })
    }

    /// Matcher with no pattern sets (only the built-in exclusions)
    pub fn empty(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            scopes: Vec::new(),
        }
    }

    /// Number of ignore files loaded
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Whether `path` (absolute, or relative to the project root) is excluded
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        let relative = normalize(path.strip_prefix(&self.root).unwrap_or(path));
        if relative.as_os_str().is_empty() || relative.has_root() {
            return false;
        }
        if relative.components().any(|c| is_always_ignored(c.as_os_str())) {
            return true;
        }

        self.scopes.iter().any(|scope| {
            let Ok(inside) = relative.strip_prefix(&scope.dir) else {
                return false;
            };
            !inside.as_os_str().is_empty()
                && scope
                    .matcher
                    .matched_path_or_any_parents(inside, is_dir)
                    .is_ignore()
        })
    }

    /// Predicate view for the content hasher
    pub fn into_fn(self) -> IgnoreFn {
        let matcher = Arc::new(self);
        Arc::new(move |path: &Path, is_dir: bool| matcher.is_ignored(path, is_dir))
    }
}

pub(crate) fn is_always_ignored(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| ALWAYS_IGNORED.contains(&n))
}

/// Drop `.` components so prefix checks work on user-written paths
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Parse ignore-file lines into a matcher rooted at `dir`
///
/// Blank lines and `#` comment lines are skipped; a trailing ` #` comment
/// is trimmed from pattern lines.
fn build_matcher(dir: &Path, source: &Path, content: &str) -> GbuildResult<Gitignore> {
    let mut builder = GitignoreBuilder::new(dir);
    for line in content.lines() {
        let Some(pattern) = pattern_from_line(line) else {
            continue;
        };
        builder
            .add_line(Some(source.to_path_buf()), pattern)
            .map_err(|e| GbuildError::IgnorePattern {
                path: source.to_path_buf(),
                reason: e.to_string(),
            })?;
    }
    builder.build().map_err(|e| GbuildError::IgnorePattern {
        path: source.to_path_buf(),
        reason: e.to_string(),
    })
}

fn pattern_from_line(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let pattern = line.split(" #").next().unwrap_or(line).trim();
    (!pattern.is_empty()).then_some(pattern)
}
