//! Terminal outcome of one target in a plan

use crate::config::schema::Target;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Why a target did not succeed
#[derive(Error, Debug)]
pub enum TargetError {
    #[error("working directory {} does not exist", .0.display())]
    WorkDirMissing(PathBuf),

    #[error("failed to start command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed waiting for command: {0}")]
    Wait(#[source] std::io::Error),

    #[error("command exited with {}", describe_exit(.code))]
    ExitStatus { code: Option<i32> },

    #[error("cancelled because {cause} failed")]
    Cancelled { cause: String },

    #[error("dependency {dependency} failed")]
    DependencyFailed { dependency: String },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

impl TargetError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Spawn(_) | Self::Wait(_) | Self::ExitStatus { .. })
    }

    /// Whether the target was stopped because of another target
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::DependencyFailed { .. })
    }
}

/// Terminal state of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One entry in the plan's result log
#[derive(Debug)]
pub struct TargetResult {
    pub target: Arc<Target>,

    pub error: Option<TargetError>,

    /// Time spent waiting for dependencies
    pub wait: Duration,

    /// Time from worker start to the terminal outcome
    pub elapsed: Duration,

    /// Command executions, zero when the command never ran
    pub attempts: u32,

    /// Outputs came from the artifact cache
    pub cached: bool,
}

impl TargetResult {
    pub fn name(&self) -> &str {
        &self.target.name
    }

    pub fn status(&self) -> TargetStatus {
        match &self.error {
            None => TargetStatus::Succeeded,
            Some(e) if e.is_cancellation() => TargetStatus::Cancelled,
            Some(_) => TargetStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Any outcome carrying an error, cancellations included
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(error: Option<TargetError>) -> TargetResult {
        TargetResult {
            target: Arc::new(Target::new("build", "make")),
            error,
            wait: Duration::ZERO,
            elapsed: Duration::from_millis(10),
            attempts: 1,
            cached: false,
        }
    }

    #[test]
    fn status_from_error() {
        assert_eq!(result(None).status(), TargetStatus::Succeeded);
        assert_eq!(
            result(Some(TargetError::ExitStatus { code: Some(2) })).status(),
            TargetStatus::Failed
        );
        assert_eq!(
            result(Some(TargetError::Cancelled {
                cause: "lint".to_string()
            }))
            .status(),
            TargetStatus::Cancelled
        );
        assert_eq!(
            result(Some(TargetError::DependencyFailed {
                dependency: "lint".to_string()
            }))
            .status(),
            TargetStatus::Cancelled
        );
    }

    #[test]
    fn retryable_errors() {
        assert!(TargetError::ExitStatus { code: Some(1) }.is_retryable());
        assert!(!TargetError::WorkDirMissing(PathBuf::from("/nope")).is_retryable());
        assert!(!TargetError::Cancelled {
            cause: "x".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            TargetError::ExitStatus { code: Some(3) }.to_string(),
            "command exited with status 3"
        );
        assert_eq!(
            TargetError::ExitStatus { code: None }.to_string(),
            "command exited with a signal"
        );
        assert!(TargetError::WorkDirMissing(PathBuf::from("/srv/app"))
            .to_string()
            .contains("/srv/app"));
    }

    #[test]
    fn failure_includes_cancellation() {
        let cancelled = result(Some(TargetError::Cancelled {
            cause: "x".to_string(),
        }));
        assert!(cancelled.is_failure());
        assert!(!cancelled.is_success());
        assert_eq!(cancelled.name(), "build");
    }
}
