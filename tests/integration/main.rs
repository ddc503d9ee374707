//! Integration tests for gbuild

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn gbuild() -> Command {
        let mut cmd = cargo_bin_cmd!("gbuild");
        cmd.env_remove("GBUILD_CONFIG");
        cmd
    }

    fn project(config: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".gbuild.toml"), config).unwrap();
        dir
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap_or_default()
    }

    const CHAIN: &str = r#"
[[targets]]
name = "first"
run = "echo first >> order.log"

[[targets]]
name = "second"
run = "echo second >> order.log"
depends_on = ["first"]

[[execution_plans]]
name = "build"
targets = ["first", "second"]
"#;

    #[test]
    fn help_displays() {
        gbuild()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("incremental local build orchestrator"));
    }

    #[test]
    fn version_displays() {
        gbuild()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("gbuild"));
    }

    #[test]
    fn run_executes_in_dependency_order() {
        let dir = project(CHAIN);

        gbuild()
            .current_dir(dir.path())
            .args(["run", "--no-cache"])
            .assert()
            .success()
            .stdout(predicate::str::contains("2 succeeded"));

        assert_eq!(read(&dir.path().join("order.log")), "first\nsecond\n");
    }

    #[test]
    fn run_finds_config_in_parent_directory() {
        let dir = project(CHAIN);
        let nested = dir.path().join("nested/deeper");
        fs::create_dir_all(&nested).unwrap();

        gbuild()
            .current_dir(&nested)
            .args(["run", "--no-cache"])
            .assert()
            .success();

        // Commands run at the project root, not the invoking directory
        assert_eq!(read(&dir.path().join("order.log")), "first\nsecond\n");
    }

    #[test]
    fn failing_target_fails_the_run() {
        let dir = project(
            r#"
[[targets]]
name = "broken"
run = "exit 3"

[[targets]]
name = "after"
run = "touch after.txt"
depends_on = ["broken"]

[[execution_plans]]
name = "build"
targets = ["broken", "after"]
"#,
        );

        gbuild()
            .current_dir(dir.path())
            .args(["run", "--no-cache"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Target broken failed"));

        assert!(!dir.path().join("after.txt").exists());
    }

    #[test]
    fn unknown_plan_fails_with_hint() {
        let dir = project(CHAIN);

        gbuild()
            .current_dir(dir.path())
            .args(["run", "-t", "deploy"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No targets found for plan deploy"))
            .stderr(predicate::str::contains("gbuild list"));
    }

    #[test]
    fn missing_config_fails() {
        let dir = TempDir::new().unwrap();

        gbuild()
            .current_dir(dir.path())
            .args(["run"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Configuration file not found"));
    }

    #[test]
    fn invalid_config_fails() {
        let dir = project(
            r#"
[[targets]]
name = "a"
run = "true"
depends_on = ["a"]
"#,
        );

        gbuild()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .failure()
            .stderr(predicate::str::contains("depends on itself"));
    }

    #[test]
    fn cached_run_skips_unchanged_target() {
        let dir = project(
            r#"
[[targets]]
name = "compile"
run = "echo run >> runs.log && mkdir -p out && cp src/input.txt out/result.txt"

[[targets.caches]]
inputs = ["src"]
outputs = ["out"]

[[execution_plans]]
name = "build"
targets = ["compile"]

[cache]
dir = ".store"
"#,
        );
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/input.txt"), "v1").unwrap();

        gbuild().current_dir(dir.path()).arg("run").assert().success();
        fs::remove_dir_all(dir.path().join("out")).unwrap();

        gbuild()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .success()
            .stdout(predicate::str::contains("1 cached"));

        assert_eq!(read(&dir.path().join("runs.log")), "run\n");
        assert_eq!(read(&dir.path().join("out/result.txt")), "v1");

        gbuild()
            .current_dir(dir.path())
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty().not());

        gbuild()
            .current_dir(dir.path())
            .args(["cache", "clear"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed"));
        assert!(!dir.path().join(".gbuild_cache").exists());
    }

    #[test]
    fn hash_single_file_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("greeting.txt"), "hello").unwrap();

        gbuild()
            .arg("hash")
            .arg(dir.path())
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
            ));
    }

    #[test]
    fn hash_missing_path_fails() {
        let dir = TempDir::new().unwrap();

        gbuild()
            .arg("hash")
            .arg(dir.path().join("missing"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("Path not found"));
    }

    #[test]
    fn list_json() {
        let dir = project(CHAIN);

        gbuild()
            .current_dir(dir.path())
            .args(["list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"name\": \"build\""))
            .stdout(predicate::str::contains("\"second\""));
    }

    #[test]
    fn list_empty() {
        let dir = project("");

        gbuild()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No execution plans defined"));
    }
}
