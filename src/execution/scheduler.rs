//! Dependency scheduler
//!
//! One worker per target. A worker waits until every dependency has a
//! result in the log, then decides from that snapshot whether to run:
//!
//! - a failed dependency, or any failure elsewhere in the plan, records the
//!   target as cancelled without running it
//! - a cached target whose dependencies were all cached is recorded as
//!   succeeded without running it
//! - otherwise the command runs, with up to `max_retries` extra attempts
//!
//! Every worker appends exactly one result.

use crate::config::check_cycles;
use crate::config::schema::{ExecutionConfig, Target};
use crate::error::{GbuildError, GbuildResult};
use crate::execution::log::{self, ResultLog, Snapshot};
use crate::execution::process::CommandRunner;
use crate::execution::result::{TargetError, TargetResult};
use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runs a set of targets concurrently in dependency order
#[derive(Debug, Clone)]
pub struct Scheduler {
    runner: CommandRunner,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(shell: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            runner: CommandRunner::new(shell, poll_interval),
            poll_interval,
        }
    }

    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self::new(
            config.shell.clone(),
            Duration::from_millis(config.poll_interval_ms.max(1)),
        )
    }

    /// Execute `targets`, returning results in completion order
    ///
    /// Targets named in `cached` may be skipped (see module docs). The graph
    /// is checked before anything starts: every dependency must be among
    /// `targets` and there must be no cycle.
    pub async fn run(
        &self,
        targets: Vec<Target>,
        cached: &HashSet<String>,
    ) -> GbuildResult<Snapshot> {
        validate_graph(&targets)?;

        let log = ResultLog::spawn();
        let workers: Vec<_> = targets
            .into_iter()
            .map(|target| {
                let is_cached = cached.contains(&target.name);
                let worker = Worker {
                    target: Arc::new(target),
                    log: log.clone(),
                    runner: self.runner.clone(),
                    poll_interval: self.poll_interval,
                    cached: is_cached,
                };
                tokio::spawn(worker.run())
            })
            .collect();

        for joined in join_all(workers).await {
            joined.map_err(|e| GbuildError::Internal(format!("target worker panicked: {}", e)))??;
        }

        log.snapshot().await
    }
}

/// Every dependency must be part of the plan and the graph must be acyclic
fn validate_graph(targets: &[Target]) -> GbuildResult<()> {
    let names: HashSet<&str> = targets.iter().map(|t| t.name.as_str()).collect();
    for target in targets {
        if let Some(missing) = target
            .depends_on
            .iter()
            .find(|dep| !names.contains(dep.as_str()))
        {
            return Err(GbuildError::UnknownDependency {
                target: target.name.clone(),
                dependency: missing.clone(),
            });
        }
    }
    check_cycles(targets)
}

struct Worker {
    target: Arc<Target>,
    log: ResultLog,
    runner: CommandRunner,
    poll_interval: Duration,
    cached: bool,
}

impl Worker {
    async fn run(self) -> GbuildResult<()> {
        let start = Instant::now();
        let snapshot = self.wait_for_dependencies().await?;
        let wait = start.elapsed();
        if !self.target.depends_on.is_empty() {
            debug!("{} waited {:?} for dependencies", self.target.name, wait);
        }

        let (error, attempts, cached) = match self.gate(&snapshot) {
            Gate::Cancel(error) => {
                warn!("Skipping {}: {}", self.target.name, error);
                (Some(error), 0, false)
            }
            Gate::Cached => {
                info!("{} is up to date", self.target.name);
                (None, 0, true)
            }
            Gate::Run => {
                let (error, attempts) = self.execute().await?;
                (error, attempts, false)
            }
        };

        let elapsed = start.elapsed();
        match &error {
            None => info!("{} finished in {:.2?}", self.target.name, elapsed),
            Some(e) => warn!("{} {}: {}", self.target.name, status_word(e), e),
        }

        self.log
            .append(TargetResult {
                target: self.target,
                error,
                wait,
                elapsed,
                attempts,
                cached,
            })
            .await
    }

    /// Poll until every dependency has a result
    async fn wait_for_dependencies(&self) -> GbuildResult<Snapshot> {
        loop {
            let snapshot = self.log.snapshot().await?;
            if self
                .target
                .depends_on
                .iter()
                .all(|dep| log::contains(&snapshot, dep))
            {
                return Ok(snapshot);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn gate(&self, snapshot: &[Arc<TargetResult>]) -> Gate {
        let failed_dep = self
            .target
            .depends_on
            .iter()
            .find(|dep| log::find(snapshot, dep).is_some_and(|r| r.is_failure()));
        if let Some(dep) = failed_dep {
            return Gate::Cancel(TargetError::DependencyFailed {
                dependency: dep.clone(),
            });
        }

        if let Some(failed) = log::first_failure(snapshot) {
            return Gate::Cancel(TargetError::Cancelled {
                cause: failed.name().to_string(),
            });
        }

        let deps_cached = self
            .target
            .depends_on
            .iter()
            .all(|dep| log::find(snapshot, dep).is_some_and(|r| r.cached));
        if self.cached && deps_cached {
            Gate::Cached
        } else {
            Gate::Run
        }
    }

    /// Run the command, retrying within the target's budget
    async fn execute(&self) -> GbuildResult<(Option<TargetError>, u32)> {
        let budget = self.target.retry_budget();
        let mut attempt = 0;

        loop {
            attempt += 1;
            info!("Running {} (attempt {}): {}", self.target.name, attempt, self.target.run);

            let error = match self.runner.run_attempt(&self.target, &self.log).await {
                Ok(()) => return Ok((None, attempt)),
                Err(e) => e,
            };

            if !error.is_retryable() || attempt > budget {
                return Ok((Some(error), attempt));
            }

            // Another target may have failed while this attempt ran
            let snapshot = self.log.snapshot().await?;
            if let Some(failed) = log::first_failure(&snapshot) {
                return Ok((
                    Some(TargetError::Cancelled {
                        cause: failed.name().to_string(),
                    }),
                    attempt,
                ));
            }

            warn!(
                "{} failed ({}), retrying {}/{}",
                self.target.name, error, attempt, budget
            );
        }
    }
}

enum Gate {
    Cancel(TargetError),
    Cached,
    Run,
}

fn status_word(error: &TargetError) -> &'static str {
    if error.is_cancellation() {
        "cancelled"
    } else {
        "failed"
    }
}
