//! Status values and log records.

use std::fmt;
use std::time::SystemTime;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStatus {
    /// No usable status log exists yet.
    Unset,
    /// Seen but never launched.
    Todo,
    /// Launched; no exit observed yet.
    Running,
    /// Exited with code 0. Terminal.
    Finished,
    /// Exited with a non-zero code or could not be spawned.
    Error,
}

impl ScriptStatus {
    /// Value written to the status line of a record.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptStatus::Unset => "unset",
            ScriptStatus::Todo => "todo",
            ScriptStatus::Running => "running",
            ScriptStatus::Finished => "finished",
            ScriptStatus::Error => "error",
        }
    }

    /// Parses a status line. Case-insensitive; accepts the legacy values
    /// `none` and `not started` (unset) and `unfinished` (todo). Unknown
    /// values read as `Todo` so the script stays eligible.
    pub fn parse_line(line: &str) -> Self {
        match line.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "not started" | "unset" => ScriptStatus::Unset,
            "todo" | "unfinished" => ScriptStatus::Todo,
            "running" => ScriptStatus::Running,
            "finished" => ScriptStatus::Finished,
            "error" => ScriptStatus::Error,
            other => {
                tracing::debug!("Unknown status value {:?}, treating as todo", other);
                ScriptStatus::Todo
            }
        }
    }

    /// Whether a script in this status may be launched.
    pub fn is_eligible(&self, rerun: bool) -> bool {
        rerun || *self != ScriptStatus::Finished
    }
}

impl fmt::Display for ScriptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(timestamp, status)` entry of a status log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Wall-clock time of the append; `None` if the line was not `HH:MM:SS`.
    pub timestamp: Option<NaiveTime>,
    pub status: ScriptStatus,
}

/// A point-in-time view of a status log.
///
/// The log is append-only, so an unchanged `log_len` means nobody appended
/// since the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status: ScriptStatus,
    /// Size of the log in bytes (0 if absent).
    pub log_len: u64,
    /// Last modification time of the log, if it exists.
    pub modified: Option<SystemTime>,
}

impl StatusSnapshot {
    pub fn unset() -> Self {
        Self {
            status: ScriptStatus::Unset,
            log_len: 0,
            modified: None,
        }
    }

    /// Whether the log was appended to since `other` was taken.
    pub fn changed_since(&self, other: &StatusSnapshot) -> bool {
        self.log_len != other.log_len
    }

    /// Whether this is a `running` record written at or after `since`.
    pub fn running_since(&self, since: SystemTime) -> bool {
        self.status == ScriptStatus::Running && self.modified.is_some_and(|m| m >= since)
    }
}
