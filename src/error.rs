//! Error types for gbuild
//!
//! All modules use `GbuildResult<T>` as their return type. Failures of an
//! individual target are modelled separately by
//! [`TargetError`](crate::execution::TargetError) and only surface here once
//! the whole plan is reported.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for gbuild operations
pub type GbuildResult<T> = Result<T, GbuildError>;

/// All errors that can occur in gbuild
#[derive(Error, Debug)]
pub enum GbuildError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("A target with name {0} is defined twice, names must be unique")]
    DuplicateTarget(String),

    #[error("Target {0} depends on itself, this is not permissible")]
    SelfDependency(String),

    #[error("An execution plan with name {0} is defined twice, names must be unique")]
    DuplicatePlan(String),

    #[error("The target {target} in the execution plan {plan} is not defined among the targets")]
    PlanTargetUnknown { plan: String, target: String },

    #[error("The target {target} in the execution plan {plan} is listed twice, a target may only run once per plan")]
    PlanTargetDuplicate { plan: String, target: String },

    #[error("No targets found for plan {0}, does the plan exist?")]
    PlanNotFound(String),

    // Scheduling errors
    #[error("Target {target} depends on {dependency}, which is not part of the plan")]
    UnknownDependency { target: String, dependency: String },

    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("Target {target} failed: {reason}")]
    TargetFailed { target: String, reason: String },

    // Cache errors
    #[error("Cache artifact not found: {0}")]
    CacheArtifactNotFound(String),

    #[error("Cache provider error ({provider}): {reason}")]
    CacheProvider {
        provider: &'static str,
        reason: String,
    },

    #[error("Archive entry escapes destination: {0}")]
    ArchivePathEscape(PathBuf),

    #[error("Invalid ignore pattern in {path}: {reason}")]
    IgnorePattern { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Failed to walk {path}: {reason}")]
    Walk { path: PathBuf, reason: String },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General errors
    #[error("Interrupted")]
    Interrupted,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GbuildError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a cache provider error
    pub fn provider(provider: &'static str, reason: impl Into<String>) -> Self {
        Self::CacheProvider {
            provider,
            reason: reason.into(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound(_) => {
                Some("Create a .gbuild.toml in the project root or pass --config <path>")
            }
            Self::PlanNotFound(_) => Some("Run: gbuild list to see the available plans"),
            Self::DependencyCycle(_) => Some("Remove one of the depends_on edges in the cycle"),
            Self::UnknownDependency { .. } => {
                Some("Add the dependency to the execution plan's targets")
            }
            Self::CacheProvider { .. } => Some("Retry with --no-cache to bypass the artifact cache"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = GbuildError::DuplicateTarget("build".to_string());
        assert!(err.to_string().contains("defined twice"));
    }

    #[test]
    fn cycle_display_joins_names() {
        let err = GbuildError::DependencyCycle(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]);
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn error_hint() {
        let err = GbuildError::PlanNotFound("deploy".to_string());
        assert_eq!(err.hint(), Some("Run: gbuild list to see the available plans"));
        assert!(GbuildError::Internal("x".to_string()).hint().is_none());
    }
}
