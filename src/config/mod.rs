//! Configuration management for gbuild

pub mod schema;

pub use schema::{CacheBackend, CacheConfig, CacheRule, Config, ExecutionConfig, ExecutionPlan, Target};

use crate::error::{GbuildError, GbuildResult};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Project configuration file name
pub const CONFIG_FILE_NAME: &str = ".gbuild.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Use `explicit` if given, otherwise the nearest config above `cwd`
    pub fn locate(explicit: Option<PathBuf>, cwd: &Path) -> GbuildResult<Self> {
        if let Some(path) = explicit {
            return Ok(Self::with_path(path));
        }
        match Self::find_local_config(cwd) {
            Some(path) => {
                debug!("Found config: {}", path.display());
                Ok(Self::with_path(path))
            }
            None => Err(GbuildError::ConfigNotFound(cwd.join(CONFIG_FILE_NAME))),
        }
    }

    /// Find `.gbuild.toml` in `start` or any of its ancestors
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Project root: the directory holding the config file
    pub fn project_root(&self) -> PathBuf {
        match self.config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Absolute, symlink-free project root
    pub async fn canonical_root(&self) -> GbuildResult<PathBuf> {
        let root = self.project_root();
        fs::canonicalize(&root)
            .await
            .map_err(|e| GbuildError::io(format!("resolving project root {}", root.display()), e))
    }

    /// Load and validate the configuration file
    pub async fn load(&self) -> GbuildResult<Config> {
        if !self.config_path.exists() {
            return Err(GbuildError::ConfigNotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path).await.map_err(|e| {
            GbuildError::io(format!("reading config from {}", self.config_path.display()), e)
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| GbuildError::ConfigInvalid {
            path: self.config_path.clone(),
            reason: e.to_string(),
        })?;

        validate(&config)?;
        debug!(
            "Loaded {} targets and {} plans from {}",
            config.targets.len(),
            config.execution_plans.len(),
            self.config_path.display()
        );
        Ok(config)
    }
}

/// Check names, dependencies and plans for consistency
pub fn validate(config: &Config) -> GbuildResult<()> {
    let mut target_names = HashSet::new();
    for target in &config.targets {
        if target.name.trim().is_empty() {
            return Err(GbuildError::ConfigInvalid {
                path: PathBuf::from(CONFIG_FILE_NAME),
                reason: "target names must not be empty".to_string(),
            });
        }
        if !target_names.insert(target.name.as_str()) {
            return Err(GbuildError::DuplicateTarget(target.name.clone()));
        }
        if target.depends_on.contains(&target.name) {
            return Err(GbuildError::SelfDependency(target.name.clone()));
        }
    }

    let mut plan_names = HashSet::new();
    for plan in &config.execution_plans {
        if !plan_names.insert(plan.name.as_str()) {
            return Err(GbuildError::DuplicatePlan(plan.name.clone()));
        }
        let mut plan_targets = HashSet::new();
        for target in &plan.targets {
            if !target_names.contains(target.as_str()) {
                return Err(GbuildError::PlanTargetUnknown {
                    plan: plan.name.clone(),
                    target: target.clone(),
                });
            }
            if !plan_targets.insert(target.as_str()) {
                return Err(GbuildError::PlanTargetDuplicate {
                    plan: plan.name.clone(),
                    target: target.clone(),
                });
            }
        }
    }

    check_cycles(&config.targets)
}

/// Reject dependency cycles among `targets`
///
/// Dependencies naming targets outside the slice are ignored here; the
/// scheduler rejects those when a plan is launched.
pub fn check_cycles(targets: &[Target]) -> GbuildResult<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        name: &'a str,
        graph: &BTreeMap<&'a str, &'a Target>,
        marks: &mut BTreeMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> GbuildResult<()> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(name.to_string());
                return Err(GbuildError::DependencyCycle(cycle));
            }
            None => {}
        }

        let Some(&target) = graph.get(name) else {
            return Ok(());
        };

        marks.insert(name, Mark::Visiting);
        path.push(name);
        for dep in &target.depends_on {
            visit(dep, graph, marks, path)?;
        }
        path.pop();
        marks.insert(name, Mark::Done);
        Ok(())
    }

    let graph: BTreeMap<&str, &Target> = targets.iter().map(|t| (t.name.as_str(), t)).collect();
    let mut marks = BTreeMap::new();
    for &name in graph.keys() {
        visit(name, &graph, &mut marks, &mut Vec::new())?;
    }
    Ok(())
}

/// Targets of the named plan, in plan order
pub fn targets_for_plan(config: &Config, plan_name: &str) -> GbuildResult<Vec<Target>> {
    let targets: Vec<Target> = config
        .execution_plans
        .iter()
        .filter(|plan| plan.name == plan_name)
        .flat_map(|plan| plan.targets.iter())
        .filter_map(|name| config.targets.iter().find(|t| &t.name == name))
        .cloned()
        .collect();

    if targets.is_empty() {
        return Err(GbuildError::PlanNotFound(plan_name.to_string()));
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_with(targets: Vec<Target>, plans: Vec<ExecutionPlan>) -> Config {
        Config {
            targets,
            execution_plans: plans,
            ..Config::default()
        }
    }

    fn plan(name: &str, targets: &[&str]) -> ExecutionPlan {
        ExecutionPlan {
            name: name.to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn load_missing_file_errors() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp.path().join(CONFIG_FILE_NAME));
        let err = manager.load().await.unwrap_err();
        assert!(matches!(err, GbuildError::ConfigNotFound(_)));
    }

    #[tokio::test]
    async fn load_invalid_toml_errors() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[[targets]\nname = ").unwrap();

        let err = ConfigManager::with_path(path).load().await.unwrap_err();
        assert!(matches!(err, GbuildError::ConfigInvalid { .. }));
    }

    #[tokio::test]
    async fn load_valid_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"
            [[targets]]
            name = "foo"
            run = "true"

            [[targets]]
            name = "bar"
            run = "true"
            depends_on = ["foo"]

            [[execution_plans]]
            name = "build"
            targets = ["foo", "bar"]
            "#,
        )
        .unwrap();

        let manager = ConfigManager::with_path(path);
        let config = manager.load().await.unwrap();
        assert_eq!(config.targets.len(), 2);
        assert_eq!(manager.project_root(), temp.path());
    }

    #[test]
    fn find_local_config_walks_up() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE_NAME), "").unwrap();

        let found = ConfigManager::find_local_config(&nested).unwrap();
        assert_eq!(found, temp.path().join(CONFIG_FILE_NAME));
    }

    #[test]
    fn validate_rejects_duplicate_target() {
        let config = config_with(vec![Target::new("a", "true"), Target::new("a", "true")], vec![]);
        assert!(matches!(validate(&config), Err(GbuildError::DuplicateTarget(n)) if n == "a"));
    }

    #[test]
    fn validate_rejects_self_dependency() {
        let config = config_with(vec![Target::new("a", "true").depends_on(["a"])], vec![]);
        assert!(matches!(validate(&config), Err(GbuildError::SelfDependency(_))));
    }

    #[test]
    fn validate_rejects_unknown_plan_target() {
        let config = config_with(vec![Target::new("a", "true")], vec![plan("build", &["a", "b"])]);
        assert!(matches!(
            validate(&config),
            Err(GbuildError::PlanTargetUnknown { target, .. }) if target == "b"
        ));
    }

    #[test]
    fn validate_rejects_repeated_plan_target() {
        let config = config_with(vec![Target::new("a", "true")], vec![plan("build", &["a", "a"])]);
        assert!(matches!(validate(&config), Err(GbuildError::PlanTargetDuplicate { .. })));
    }

    #[test]
    fn validate_rejects_duplicate_plan() {
        let config = config_with(
            vec![Target::new("a", "true")],
            vec![plan("build", &["a"]), plan("build", &["a"])],
        );
        assert!(matches!(validate(&config), Err(GbuildError::DuplicatePlan(_))));
    }

    #[test]
    fn validate_rejects_cycles() {
        let config = config_with(
            vec![
                Target::new("a", "true").depends_on(["c"]),
                Target::new("b", "true").depends_on(["a"]),
                Target::new("c", "true").depends_on(["b"]),
            ],
            vec![],
        );
        match validate(&config) {
            Err(GbuildError::DependencyCycle(cycle)) => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 4);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn targets_for_plan_keeps_plan_order() {
        let config = config_with(
            vec![Target::new("a", "true"), Target::new("b", "true"), Target::new("c", "true")],
            vec![plan("build", &["c", "a"])],
        );
        let targets = targets_for_plan(&config, "build").unwrap();
        let names: Vec<_> = targets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a"]);
    }

    #[test]
    fn targets_for_missing_plan_errors() {
        let config = config_with(vec![Target::new("a", "true")], vec![]);
        assert!(matches!(
            targets_for_plan(&config, "deploy"),
            Err(GbuildError::PlanNotFound(_))
        ));
    }

    #[test]
    fn locate_prefers_explicit_path() {
        let dir = TempDir::new().unwrap();
        let explicit = dir.path().join("custom.toml");
        let manager = ConfigManager::locate(Some(explicit.clone()), dir.path()).unwrap();
        assert_eq!(manager.path(), explicit);
    }

    #[test]
    fn locate_without_config_errors() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            ConfigManager::locate(None, dir.path()),
            Err(GbuildError::ConfigNotFound(_))
        ));
    }

    #[tokio::test]
    async fn canonical_root_is_absolute() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join(CONFIG_FILE_NAME));
        let root = manager.canonical_root().await.unwrap();
        assert!(root.is_absolute());
    }
}
