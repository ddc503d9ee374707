//! Plan runner: cache load, scheduling, cache put

use crate::cache::{CacheManager, LoadReport, PutReport};
use crate::config::schema::Target;
use crate::error::{GbuildError, GbuildResult};
use crate::execution::log::Snapshot;
use crate::execution::result::TargetStatus;
use crate::execution::scheduler::Scheduler;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Outcome of a plan run
#[derive(Debug)]
pub struct PlanReport {
    /// One result per target, in completion order
    pub results: Snapshot,
    pub elapsed: Duration,
    pub cache_load: Option<LoadReport>,
    pub cache_put: Option<PutReport>,
}

impl PlanReport {
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.is_success())
    }

    /// First failure in the result log, as a plan-level error
    pub fn error(&self) -> Option<GbuildError> {
        self.results.iter().find_map(|r| {
            r.error.as_ref().map(|e| GbuildError::TargetFailed {
                target: r.name().to_string(),
                reason: e.to_string(),
            })
        })
    }

    pub fn count(&self, status: TargetStatus) -> usize {
        self.results.iter().filter(|r| r.status() == status).count()
    }

    pub fn cached_count(&self) -> usize {
        self.results.iter().filter(|r| r.cached).count()
    }
}

/// Runs a resolved plan against a project root
pub struct PlanRunner {
    root: PathBuf,
    scheduler: Scheduler,
    cache: Option<CacheManager>,
}

impl PlanRunner {
    pub fn new(root: impl Into<PathBuf>, scheduler: Scheduler) -> Self {
        Self {
            root: root.into(),
            scheduler,
            cache: None,
        }
    }

    /// Enable artifact caching
    pub fn with_cache(mut self, cache: CacheManager) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run `targets`
    ///
    /// Targets whose cache rules all hit are skipped. After a fully
    /// successful run the outputs of the targets that executed are cached.
    /// A failing target does not make this an `Err`; inspect the report.
    pub async fn run(&self, targets: Vec<Target>) -> GbuildResult<PlanReport> {
        let start = Instant::now();
        let targets: Vec<Target> = targets
            .into_iter()
            .map(|t| t.resolved(&self.root))
            .collect();

        let cache_load = match &self.cache {
            Some(cache) => {
                let report = cache.load(&targets).await?;
                debug!(
                    "Cache load: {} cached targets, {} restored, {} up to date",
                    report.cached.len(),
                    report.restored,
                    report.up_to_date
                );
                Some(report)
            }
            None => None,
        };
        let cached = cache_load
            .as_ref()
            .map(|r| r.cached.clone())
            .unwrap_or_default();

        let results = self.scheduler.run(targets.clone(), &cached).await?;

        let mut report = PlanReport {
            results,
            elapsed: Duration::ZERO,
            cache_load,
            cache_put: None,
        };

        if let Some(cache) = &self.cache {
            if report.is_success() {
                let executed: HashSet<&str> = report
                    .results
                    .iter()
                    .filter(|r| !r.cached)
                    .map(|r| r.name())
                    .collect();
                let to_store: Vec<Target> = targets
                    .into_iter()
                    .filter(|t| !t.caches.is_empty() && executed.contains(t.name.as_str()))
                    .collect();
                if !to_store.is_empty() {
                    let put = cache.put(&to_store).await?;
                    info!("Cached outputs of {} rules via {}", put.uploaded, cache.provider_name());
                    report.cache_put = Some(put);
                }
            }
        }

        report.elapsed = start.elapsed();
        Ok(report)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::cache::local::LocalCacheProvider;
    use crate::cache::CacheProvider;
    use crate::config::schema::CacheRule;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn scheduler() -> Scheduler {
        Scheduler::new("/bin/sh", Duration::from_millis(5))
    }

    async fn cached_runner(project: &Path, store: &Path) -> PlanRunner {
        let provider = Arc::new(LocalCacheProvider::new(store));
        let cache = CacheManager::new(project, provider, true).await.unwrap();
        PlanRunner::new(cache.root().to_path_buf(), scheduler()).with_cache(cache)
    }

    #[tokio::test]
    async fn relative_work_dirs_resolve_against_root() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("app")).unwrap();

        let runner = PlanRunner::new(dir.path(), scheduler());
        let report = runner
            .run(vec![Target::new("touch", "touch marker").with_work_dir("app")])
            .await
            .unwrap();

        assert!(report.is_success());
        assert!(report.error().is_none());
        assert!(dir.path().join("app/marker").exists());
    }

    #[tokio::test]
    async fn failure_is_reported_with_partial_results() {
        let dir = TempDir::new().unwrap();
        let runner = PlanRunner::new(dir.path(), scheduler());
        let report = runner
            .run(vec![
                Target::new("ok", "true"),
                Target::new("bad", "exit 4").depends_on(["ok"]),
            ])
            .await
            .unwrap();

        assert!(!report.is_success());
        assert_eq!(report.count(TargetStatus::Succeeded), 1);
        match report.error() {
            Some(GbuildError::TargetFailed { target, reason }) => {
                assert_eq!(target, "bad");
                assert!(reason.contains("status 4"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn unchanged_inputs_skip_execution() {
        let project = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        fs::create_dir_all(project.path().join("src")).unwrap();
        fs::write(project.path().join("src/input.txt"), "v1").unwrap();

        let target = Target::new(
            "build",
            "mkdir -p dist && cp src/input.txt dist/out.txt && echo run >> runs.log",
        )
        .with_cache(CacheRule::new(["src"], ["dist"]));

        let first = cached_runner(project.path(), store.path()).await.run(vec![target.clone()]).await.unwrap();
        assert!(first.is_success());
        assert_eq!(first.cache_put.as_ref().map(|p| p.uploaded), Some(1));

        let second = cached_runner(project.path(), store.path()).await.run(vec![target.clone()]).await.unwrap();
        assert!(second.is_success());
        assert_eq!(second.cached_count(), 1);
        assert!(second.cache_put.is_none());

        let runs = fs::read_to_string(project.path().join("runs.log")).unwrap();
        assert_eq!(runs.lines().count(), 1);

        fs::write(project.path().join("src/input.txt"), "v2").unwrap();
        let third = cached_runner(project.path(), store.path()).await.run(vec![target]).await.unwrap();
        assert_eq!(third.cached_count(), 0);
        assert_eq!(
            fs::read_to_string(project.path().join("dist/out.txt")).unwrap(),
            "v2"
        );
    }

    #[tokio::test]
    async fn reverting_inputs_restores_gitignored_outputs() {
        let project = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        fs::create_dir_all(project.path().join("src")).unwrap();
        fs::write(project.path().join(".gitignore"), "dist/\n").unwrap();

        let target = Target::new("build", "mkdir -p dist && cp src/input.txt dist/out.txt")
            .with_cache(CacheRule::new(["src"], ["dist"]));
        let out = project.path().join("dist/out.txt");

        for version in ["v1", "v2"] {
            fs::write(project.path().join("src/input.txt"), version).unwrap();
            let report = cached_runner(project.path(), store.path()).await.run(vec![target.clone()]).await.unwrap();
            assert_eq!(report.cached_count(), 0, "{} should build", version);
            assert_eq!(fs::read_to_string(&out).unwrap(), version);
        }

        fs::write(project.path().join("src/input.txt"), "v1").unwrap();
        let report = cached_runner(project.path(), store.path()).await.run(vec![target]).await.unwrap();
        assert_eq!(report.cached_count(), 1);
        assert_eq!(report.cache_load.as_ref().map(|l| l.restored), Some(1));
        assert_eq!(fs::read_to_string(&out).unwrap(), "v1");
    }

    #[tokio::test]
    async fn failed_plan_is_not_cached() {
        let project = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        fs::create_dir_all(project.path().join("src")).unwrap();
        fs::write(project.path().join("src/input.txt"), "v1").unwrap();

        let provider = Arc::new(LocalCacheProvider::new(store.path()));
        let cache = CacheManager::new(project.path(), provider.clone(), false).await.unwrap();
        let runner = PlanRunner::new(cache.root().to_path_buf(), scheduler()).with_cache(cache);

        let report = runner
            .run(vec![
                Target::new("build", "mkdir -p dist && touch dist/out")
                    .with_cache(CacheRule::new(["src"], ["dist"])),
                Target::new("test", "exit 1").depends_on(["build"]),
            ])
            .await
            .unwrap();

        assert!(!report.is_success());
        assert!(report.cache_put.is_none());
        assert!(provider.get_index().await.unwrap().is_empty());
    }
}
