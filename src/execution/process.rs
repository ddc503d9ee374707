//! Running a target's command with plan-wide cancellation
//!
//! Each attempt spawns the command through the configured shell with the
//! caller's stdout/stderr. A watcher task polls the result log while the
//! command runs and kills it as soon as any other target has failed.

use crate::config::schema::Target;
use crate::execution::log::{self, ResultLog};
use crate::execution::result::TargetError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Spawns target commands
#[derive(Debug, Clone)]
pub struct CommandRunner {
    shell: String,
    poll_interval: Duration,
}

impl CommandRunner {
    pub fn new(shell: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            shell: shell.into(),
            poll_interval,
        }
    }

    /// Run one attempt of `target`'s command to completion or cancellation
    pub async fn run_attempt(&self, target: &Target, log: &ResultLog) -> Result<(), TargetError> {
        if let Some(dir) = &target.work_dir {
            let is_dir = tokio::fs::metadata(dir).await.is_ok_and(|m| m.is_dir());
            if !is_dir {
                return Err(TargetError::WorkDirMissing(dir.clone()));
            }
        }

        let mut child = self.command(target).spawn().map_err(TargetError::Spawn)?;
        debug!("Spawned {} (pid {:?})", target.name, child.id());

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        tokio::spawn(watch(
            log.clone(),
            target.name.clone(),
            self.poll_interval,
            cancel_tx,
        ));

        let outcome = tokio::select! {
            status = child.wait() => match status {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(TargetError::ExitStatus { code: status.code() }),
                Err(e) => Err(TargetError::Wait(e)),
            },
            Ok(cause) = &mut cancel_rx => {
                warn!("Killing {}: {} failed", target.name, cause);
                terminate(&mut child).await;
                Err(TargetError::Cancelled { cause })
            }
        };

        // Dropping the receiver stops the watcher
        drop(cancel_rx);
        outcome
    }

    fn command(&self, target: &Target) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg(shell_flag(&self.shell))
            .arg(&target.run)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if let Some(dir) = &target.work_dir {
            cmd.current_dir(dir);
        }

        // Own process group so cancellation reaches the shell's children
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

/// Flag that makes `shell` run its next argument as a command string
fn shell_flag(shell: &str) -> &'static str {
    let name = std::path::Path::new(shell)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(shell);
    if name.eq_ignore_ascii_case("cmd") {
        "/C"
    } else {
        "-c"
    }
}

/// Poll the log until the attempt ends or another target fails
async fn watch(
    log: ResultLog,
    name: String,
    interval: Duration,
    mut cancel: oneshot::Sender<String>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.closed() => return,
            _ = ticker.tick() => {}
        }

        let Ok(snapshot) = log.snapshot().await else {
            return;
        };
        if log::contains(&snapshot, &name) {
            return;
        }
        if let Some(failed) = log::first_failure(&snapshot) {
            let _ = cancel.send(failed.name().to_string());
            return;
        }
    }
}

/// Kill the command and everything it started
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        kill_process_group(pid);
    }
    if let Err(e) = child.kill().await {
        debug!("kill failed: {}", e);
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    // SAFETY: killpg only sends a signal; the group was created at spawn
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        debug!("killpg({}) failed: {}", pid, std::io::Error::last_os_error());
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::execution::result::TargetResult;
    use std::sync::Arc;
    use std::time::Instant;
    use tempfile::TempDir;

    fn runner() -> CommandRunner {
        CommandRunner::new("/bin/sh", Duration::from_millis(5))
    }

    #[test]
    fn shell_flags() {
        assert_eq!(shell_flag("/bin/sh"), "-c");
        assert_eq!(shell_flag("bash"), "-c");
        assert_eq!(shell_flag("cmd"), "/C");
        assert_eq!(shell_flag("cmd.exe"), "/C");
    }

    #[tokio::test]
    async fn successful_command() {
        let log = ResultLog::spawn();
        assert!(runner().run_attempt(&Target::new("ok", "true"), &log).await.is_ok());
    }

    #[tokio::test]
    async fn exit_status_is_reported() {
        let log = ResultLog::spawn();
        let err = runner()
            .run_attempt(&Target::new("bad", "exit 3"), &log)
            .await
            .unwrap_err();
        assert!(matches!(err, TargetError::ExitStatus { code: Some(3) }));
    }

    #[tokio::test]
    async fn runs_in_work_dir() {
        let dir = TempDir::new().unwrap();
        let log = ResultLog::spawn();
        let target = Target::new("touch", "touch marker").with_work_dir(dir.path());

        runner().run_attempt(&target, &log).await.unwrap();
        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn missing_work_dir() {
        let dir = TempDir::new().unwrap();
        let log = ResultLog::spawn();
        let target = Target::new("x", "true").with_work_dir(dir.path().join("missing"));

        let err = runner().run_attempt(&target, &log).await.unwrap_err();
        assert!(matches!(err, TargetError::WorkDirMissing(_)));
    }

    #[tokio::test]
    async fn killed_when_another_target_fails() {
        let log = ResultLog::spawn();
        log.append(TargetResult {
            target: Arc::new(Target::new("fast", "exit 1")),
            error: Some(TargetError::ExitStatus { code: Some(1) }),
            wait: Duration::ZERO,
            elapsed: Duration::ZERO,
            attempts: 1,
            cached: false,
        })
        .await
        .unwrap();

        let start = Instant::now();
        let err = runner()
            .run_attempt(&Target::new("slow", "sleep 5"), &log)
            .await
            .unwrap_err();

        assert!(start.elapsed() < Duration::from_secs(3));
        match err {
            TargetError::Cancelled { cause } => assert_eq!(cause, "fast"),
            other => panic!("expected cancellation, got {:?}", other),
        }
    }
}
