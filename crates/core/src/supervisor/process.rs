//! Bounded pool of child processes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tracing::{debug, info};

use super::command::LaunchCommand;
use super::SupervisorError;

/// A child started for a script. Lives until its exit is observed.
#[derive(Debug)]
pub struct LaunchedProcess {
    pub script: PathBuf,
    pub pid: Option<u32>,
    pub started_at: Instant,
    child: Child,
}

/// How a child ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exit code 0.
    Success,
    /// Non-zero exit code, or `None` if killed by a signal.
    Failed { code: Option<i32> },
    /// The exit status could not be collected.
    Lost { reason: String },
}

impl ExitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Success)
    }

    fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            ExitOutcome::Success
        } else {
            ExitOutcome::Failed {
                code: status.code(),
            }
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Success => write!(f, "exit code 0"),
            ExitOutcome::Failed { code: Some(code) } => write!(f, "exit code {code}"),
            ExitOutcome::Failed { code: None } => write!(f, "terminated by signal"),
            ExitOutcome::Lost { reason } => write!(f, "exit status lost: {reason}"),
        }
    }
}

/// An observed child exit.
#[derive(Debug, Clone)]
pub struct ProcessExit {
    pub script: PathBuf,
    pub outcome: ExitOutcome,
    pub elapsed: Duration,
}

/// Spawns scripts as child processes, never more than `ceiling` at a time,
/// and reports their exits through non-blocking polls.
///
/// Must be used from within a tokio runtime.
#[derive(Debug)]
pub struct ProcessSupervisor {
    command: LaunchCommand,
    chdir: bool,
    ceiling: usize,
    active: Vec<LaunchedProcess>,
    peak_active: usize,
}

impl ProcessSupervisor {
    /// A ceiling of 0 is raised to 1.
    pub fn new(command: LaunchCommand, chdir: bool, ceiling: usize) -> Self {
        Self {
            command,
            chdir,
            ceiling: ceiling.max(1),
            active: Vec::new(),
            peak_active: 0,
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Highest number of simultaneously active children so far.
    pub fn peak_active(&self) -> usize {
        self.peak_active
    }

    pub fn has_capacity(&self) -> bool {
        self.active.len() < self.ceiling
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    /// Scripts whose children are still running.
    pub fn active_scripts(&self) -> impl Iterator<Item = &Path> {
        self.active.iter().map(|p| p.script.as_path())
    }

    /// Starts a child for `script`. Returns its pid if known.
    pub fn spawn(&mut self, script: &Path) -> Result<Option<u32>, SupervisorError> {
        if !self.has_capacity() {
            return Err(SupervisorError::AtCapacity {
                ceiling: self.ceiling,
            });
        }

        let line = self.command.build(script, self.chdir);
        let mut command = Command::new(&line.program);
        command.args(&line.args).stdin(Stdio::null());
        if let Some(dir) = &line.current_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|e| SupervisorError::SpawnFailed {
            script: script.to_path_buf(),
            source: e,
        })?;
        let pid = child.id();

        info!(
            "Started {:?} (pid {})",
            script,
            pid.map_or_else(|| "?".to_string(), |p| p.to_string())
        );

        self.active.push(LaunchedProcess {
            script: script.to_path_buf(),
            pid,
            started_at: Instant::now(),
            child,
        });
        self.peak_active = self.peak_active.max(self.active.len());

        Ok(pid)
    }

    /// Collects every child that has exited since the last poll and frees
    /// its slot. Never blocks.
    pub fn poll(&mut self) -> Vec<ProcessExit> {
        let mut exits = Vec::new();
        let mut still_running = Vec::with_capacity(self.active.len());

        for mut process in self.active.drain(..) {
            let outcome = match process.child.try_wait() {
                Ok(Some(status)) => ExitOutcome::from_status(status),
                Ok(None) => {
                    still_running.push(process);
                    continue;
                }
                Err(e) => ExitOutcome::Lost {
                    reason: e.to_string(),
                },
            };

            let elapsed = process.started_at.elapsed();
            debug!("{:?} exited after {:?}: {}", process.script, elapsed, outcome);
            exits.push(ProcessExit {
                script: process.script,
                outcome,
                elapsed,
            });
        }

        self.active = still_running;
        exits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use tempfile::TempDir;

    fn sh_supervisor(ceiling: usize) -> ProcessSupervisor {
        ProcessSupervisor::new(LaunchCommand::parse("sh {}").unwrap(), false, ceiling)
    }

    async fn wait_for_exits(supervisor: &mut ProcessSupervisor) -> Vec<ProcessExit> {
        let mut exits = Vec::new();
        while !supervisor.is_idle() {
            exits.extend(supervisor.poll());
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        exits
    }

    #[tokio::test]
    async fn test_exit_codes_are_reported() {
        let temp = TempDir::new().unwrap();
        let ok = fixtures::write_script(temp.path(), "ok.sh", "exit 0");
        let bad = fixtures::write_script(temp.path(), "bad.sh", "exit 3");

        let mut supervisor = sh_supervisor(2);
        supervisor.spawn(&ok).unwrap();
        supervisor.spawn(&bad).unwrap();

        let exits = wait_for_exits(&mut supervisor).await;
        assert_eq!(exits.len(), 2);

        let ok_exit = exits.iter().find(|e| e.script == ok).unwrap();
        assert_eq!(ok_exit.outcome, ExitOutcome::Success);
        let bad_exit = exits.iter().find(|e| e.script == bad).unwrap();
        assert_eq!(bad_exit.outcome, ExitOutcome::Failed { code: Some(3) });
    }

    #[tokio::test]
    async fn test_ceiling_is_enforced() {
        let temp = TempDir::new().unwrap();
        let a = fixtures::write_script(temp.path(), "a.sh", "sleep 0.2");
        let b = fixtures::write_script(temp.path(), "b.sh", "sleep 0.2");

        let mut supervisor = sh_supervisor(1);
        supervisor.spawn(&a).unwrap();
        assert_eq!(supervisor.active_count(), 1);
        assert!(!supervisor.has_capacity());
        assert!(matches!(
            supervisor.spawn(&b),
            Err(SupervisorError::AtCapacity { ceiling: 1 })
        ));

        wait_for_exits(&mut supervisor).await;
        assert!(supervisor.has_capacity());
        assert_eq!(supervisor.active_count(), 0);
        assert_eq!(supervisor.peak_active(), 1);
    }

    #[test]
    fn test_zero_ceiling_is_raised_to_one() {
        assert_eq!(sh_supervisor(0).ceiling(), 1);
        assert_eq!(sh_supervisor(4).ceiling(), 4);
    }

    #[tokio::test]
    async fn test_poll_does_not_block_on_running_child() {
        let temp = TempDir::new().unwrap();
        let slow = fixtures::write_script(temp.path(), "slow.sh", "sleep 1");

        let mut supervisor = sh_supervisor(1);
        supervisor.spawn(&slow).unwrap();

        let started = Instant::now();
        assert!(supervisor.poll().is_empty());
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(supervisor.active_scripts().count(), 1);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_failure() {
        let temp = TempDir::new().unwrap();
        let script = fixtures::write_script(temp.path(), "run.sh", "exit 0");

        let mut supervisor = ProcessSupervisor::new(
            LaunchCommand::parse("/nonexistent/bin/submit {}").unwrap(),
            false,
            1,
        );
        let result = supervisor.spawn(&script);
        assert!(matches!(result, Err(SupervisorError::SpawnFailed { .. })));
        assert!(supervisor.is_idle());
    }

    #[tokio::test]
    async fn test_chdir_runs_in_script_directory() {
        let temp = TempDir::new().unwrap();
        let script = fixtures::write_script(temp.path(), "exp/rep/run.sh", "pwd > where.txt");

        let mut supervisor =
            ProcessSupervisor::new(LaunchCommand::parse("sh {}").unwrap(), true, 1);
        supervisor.spawn(&script).unwrap();
        let exits = wait_for_exits(&mut supervisor).await;
        assert!(exits[0].outcome.is_success());

        let written = std::fs::read_to_string(temp.path().join("exp/rep/where.txt")).unwrap();
        let expected = std::fs::canonicalize(temp.path().join("exp/rep")).unwrap();
        assert_eq!(std::fs::canonicalize(written.trim()).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_script_directory_is_used_without_chdir() {
        let temp = TempDir::new().unwrap();
        let script = fixtures::write_script(temp.path(), "exp/rep/run.sh", "echo \"$0\" > where.txt");

        let mut supervisor = sh_supervisor(1);
        supervisor.spawn(&script).unwrap();
        let exits = wait_for_exits(&mut supervisor).await;
        assert!(exits[0].outcome.is_success());

        let written = std::fs::read_to_string(temp.path().join("exp/rep/where.txt")).unwrap();
        assert_eq!(PathBuf::from(written.trim()), script);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(ExitOutcome::Success.to_string(), "exit code 0");
        assert_eq!(
            ExitOutcome::Failed { code: Some(2) }.to_string(),
            "exit code 2"
        );
        assert_eq!(
            ExitOutcome::Failed { code: None }.to_string(),
            "terminated by signal"
        );
    }
}
