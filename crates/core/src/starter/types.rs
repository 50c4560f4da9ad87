//! Types for the script starter.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::lock::LockError;
use crate::status::{ScriptStatus, StatusError};
use crate::supervisor::ExitOutcome;

/// Errors that can occur while starting scripts.
///
/// Only [`StarterError::Config`] is fatal; everything else is reported per
/// script and the run continues.
#[derive(Debug, Error)]
pub enum StarterError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Lock file could not be opened or locked.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// Status log could not be written.
    #[error("status error: {0}")]
    Status(#[from] StatusError),

    /// A blocking status task was cancelled or panicked.
    #[error("status task failed: {0}")]
    Task(String),
}

/// A script and its current status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptEntry {
    pub path: PathBuf,
    pub status: ScriptStatus,
}

/// What happened to a script this run was responsible for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptResult {
    /// Child exited; `finished` or `error` was recorded.
    Exited(ExitOutcome),
    /// Child could not be started; `error` was recorded.
    SpawnFailed(String),
}

/// Final outcome of one launched (or attempted) script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutcome {
    pub script: PathBuf,
    pub result: ScriptResult,
}

impl ScriptOutcome {
    /// Status recorded for the script.
    pub fn status(&self) -> ScriptStatus {
        match &self.result {
            ScriptResult::Exited(outcome) if outcome.is_success() => ScriptStatus::Finished,
            _ => ScriptStatus::Error,
        }
    }
}

/// Why a discovered script was not launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Status made it ineligible when discovered (normally `finished`).
    NotEligible(ScriptStatus),
    /// Another starter marked it `running` during this run.
    ClaimedElsewhere,
    /// Its log changed between discovery and dispatch.
    ChangedSinceDiscovery(ScriptStatus),
    /// Its lock or status log could not be used.
    Unavailable(String),
}

/// A discovered script that this run did not launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedScript {
    pub script: PathBuf,
    pub reason: SkipReason,
}

/// Summary of one run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Number of scripts found by discovery.
    pub discovered: usize,
    /// Number of scripts that were launch candidates.
    pub eligible: usize,
    /// Concurrency ceiling used for the run.
    pub ceiling: usize,
    /// Highest number of children that were active at the same time.
    pub peak_active: usize,
    pub outcomes: Vec<ScriptOutcome>,
    pub skipped: Vec<SkippedScript>,
}

impl RunReport {
    /// Children actually started.
    pub fn launched(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, ScriptResult::Exited(_)))
            .count()
    }

    pub fn finished(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status() == ScriptStatus::Finished)
            .count()
    }

    /// Scripts recorded as `error`, including spawn failures.
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status() == ScriptStatus::Error)
            .count()
    }

    pub fn outcome_for(&self, script: &std::path::Path) -> Option<&ScriptOutcome> {
        self.outcomes.iter().find(|o| o.script == script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(name: &str, result: ScriptResult) -> ScriptOutcome {
        ScriptOutcome {
            script: PathBuf::from(name),
            result,
        }
    }

    #[test]
    fn test_report_counts() {
        let report = RunReport {
            discovered: 4,
            eligible: 3,
            ceiling: 2,
            peak_active: 2,
            outcomes: vec![
                outcome("a.sh", ScriptResult::Exited(ExitOutcome::Success)),
                outcome(
                    "b.sh",
                    ScriptResult::Exited(ExitOutcome::Failed { code: Some(1) }),
                ),
                outcome("c.sh", ScriptResult::SpawnFailed("not found".to_string())),
            ],
            skipped: vec![SkippedScript {
                script: PathBuf::from("d.sh"),
                reason: SkipReason::NotEligible(ScriptStatus::Finished),
            }],
        };

        assert_eq!(report.launched(), 2);
        assert_eq!(report.finished(), 1);
        assert_eq!(report.failed(), 2);
        assert_eq!(
            report.outcome_for(std::path::Path::new("b.sh")).unwrap().status(),
            ScriptStatus::Error
        );
    }

    #[test]
    fn test_entry_serializes_status_in_log_spelling() {
        let entry = ScriptEntry {
            path: PathBuf::from("/exp/run.sh"),
            status: ScriptStatus::Finished,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "path": "/exp/run.sh", "status": "finished" })
        );
    }

    #[test]
    fn test_error_display() {
        let err = StarterError::Task("join error".to_string());
        assert_eq!(err.to_string(), "status task failed: join error");
    }
}
