//! Append-only status logs stored next to each script.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveTime};
use tracing::warn;

use super::types::{ScriptStatus, StatusRecord, StatusSnapshot};
use super::StatusError;
use crate::sidecar::{sidecar_path, STATUS_SUFFIX};

const TIMESTAMP_FORMAT: &str = "%H:%M:%S";

/// Reads and appends `<script>.status` logs.
///
/// Each record is two lines: a `HH:MM:SS` timestamp and a status value. The
/// current status is the status line of the last record. Reads are not
/// atomic with respect to other writers; hold the script's lock around any
/// read-then-append sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusStore;

impl StatusStore {
    pub fn new() -> Self {
        Self
    }

    /// Path of the status log for `script`.
    pub fn status_path(script: &Path) -> PathBuf {
        sidecar_path(script, STATUS_SUFFIX)
    }

    /// Current status of `script`. Missing, unreadable and malformed logs read
    /// as [`ScriptStatus::Unset`].
    pub fn get_status(&self, script: &Path) -> ScriptStatus {
        self.snapshot(script).status
    }

    /// Current status together with the log's size and modification time.
    pub fn snapshot(&self, script: &Path) -> StatusSnapshot {
        let path = Self::status_path(script);

        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return StatusSnapshot::unset(),
            Err(e) => {
                warn!("Cannot open status log {:?}: {}", path, e);
                return StatusSnapshot::unset();
            }
        };

        let (log_len, modified) = match file.metadata() {
            Ok(meta) => (meta.len(), meta.modified().ok()),
            Err(e) => {
                warn!("Cannot stat status log {:?}: {}", path, e);
                (0, None)
            }
        };

        let mut content = String::new();
        let status = match file.read_to_string(&mut content) {
            Ok(_) => current_status(&content).unwrap_or_else(|| {
                warn!("Status log {:?} ends with an incomplete record, treating as unset", path);
                ScriptStatus::Unset
            }),
            Err(e) => {
                warn!("Cannot read status log {:?}: {}", path, e);
                ScriptStatus::Unset
            }
        };

        StatusSnapshot {
            status,
            log_len,
            modified,
        }
    }

    /// All complete records of the log, oldest first. A missing log has no
    /// records.
    pub fn history(&self, script: &Path) -> Result<Vec<StatusRecord>, StatusError> {
        let path = Self::status_path(script);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(parse_records(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StatusError::Io { path, source: e }),
        }
    }

    /// Appends one record, creating the log if needed. Never rewrites.
    pub fn append_status(&self, script: &Path, status: ScriptStatus) -> Result<(), StatusError> {
        if status == ScriptStatus::Unset {
            return Err(StatusError::UnwritableStatus(status));
        }

        let path = Self::status_path(script);
        let record = format!(
            "{}\n{}\n",
            Local::now().format(TIMESTAMP_FORMAT),
            status.as_str()
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StatusError::Io {
                path: path.clone(),
                source: e,
            })?;

        // One write so concurrent appenders cannot interleave inside a record.
        file.write_all(record.as_bytes())
            .map_err(|e| StatusError::Io { path, source: e })
    }
}

fn non_blank_lines(content: &str) -> impl Iterator<Item = &str> {
    content.lines().map(str::trim).filter(|l| !l.is_empty())
}

fn parse_timestamp(line: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(line, TIMESTAMP_FORMAT).ok()
}

/// Status of the last record, `Unset` for an empty log, `None` if the log
/// ends with a timestamp whose status line was never written.
fn current_status(content: &str) -> Option<ScriptStatus> {
    match non_blank_lines(content).last() {
        None => Some(ScriptStatus::Unset),
        Some(last) if parse_timestamp(last).is_some() => None,
        Some(last) => Some(ScriptStatus::parse_line(last)),
    }
}

/// Pairs timestamp lines with the status line that follows. Status lines
/// without a timestamp become records with no timestamp; timestamps without a
/// status line are dropped.
fn parse_records(content: &str) -> Vec<StatusRecord> {
    let mut records = Vec::new();
    let mut pending: Option<NaiveTime> = None;

    for line in non_blank_lines(content) {
        match parse_timestamp(line) {
            Some(ts) => pending = Some(ts),
            None => records.push(StatusRecord {
                timestamp: pending.take(),
                status: ScriptStatus::parse_line(line),
            }),
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn script_in(temp: &TempDir) -> PathBuf {
        let script = temp.path().join("run.sh");
        std::fs::write(&script, "exit 0\n").unwrap();
        script
    }

    #[test]
    fn test_missing_log_is_unset() {
        let temp = TempDir::new().unwrap();
        let store = StatusStore::new();
        let script = script_in(&temp);

        assert_eq!(store.get_status(&script), ScriptStatus::Unset);
        assert_eq!(store.snapshot(&script), StatusSnapshot::unset());
        assert!(store.history(&script).unwrap().is_empty());
    }

    #[test]
    fn test_append_then_read_last_record() {
        let temp = TempDir::new().unwrap();
        let store = StatusStore::new();
        let script = script_in(&temp);

        store.append_status(&script, ScriptStatus::Todo).unwrap();
        assert_eq!(store.get_status(&script), ScriptStatus::Todo);

        store.append_status(&script, ScriptStatus::Running).unwrap();
        store.append_status(&script, ScriptStatus::Finished).unwrap();
        assert_eq!(store.get_status(&script), ScriptStatus::Finished);
    }

    #[test]
    fn test_append_never_rewrites() {
        let temp = TempDir::new().unwrap();
        let store = StatusStore::new();
        let script = script_in(&temp);

        store.append_status(&script, ScriptStatus::Todo).unwrap();
        let first = std::fs::read_to_string(StatusStore::status_path(&script)).unwrap();
        store.append_status(&script, ScriptStatus::Running).unwrap();
        let second = std::fs::read_to_string(StatusStore::status_path(&script)).unwrap();

        assert!(second.starts_with(&first));
        assert_eq!(second.lines().count(), 4);
        assert!(parse_timestamp(second.lines().next().unwrap()).is_some());
    }

    #[test]
    fn test_snapshot_tracks_log_growth() {
        let temp = TempDir::new().unwrap();
        let store = StatusStore::new();
        let script = script_in(&temp);

        store.append_status(&script, ScriptStatus::Todo).unwrap();
        let before = store.snapshot(&script);
        assert_eq!(before.status, ScriptStatus::Todo);
        assert!(before.modified.is_some());

        store.append_status(&script, ScriptStatus::Running).unwrap();
        let after = store.snapshot(&script);
        assert!(after.changed_since(&before));
        assert_eq!(after.status, ScriptStatus::Running);
    }

    #[test]
    fn test_history_in_order() {
        let temp = TempDir::new().unwrap();
        let store = StatusStore::new();
        let script = script_in(&temp);

        for status in [ScriptStatus::Todo, ScriptStatus::Running, ScriptStatus::Error] {
            store.append_status(&script, status).unwrap();
        }

        let statuses: Vec<_> = store
            .history(&script)
            .unwrap()
            .into_iter()
            .map(|r| r.status)
            .collect();
        assert_eq!(
            statuses,
            vec![ScriptStatus::Todo, ScriptStatus::Running, ScriptStatus::Error]
        );
    }

    #[test]
    fn test_unset_cannot_be_appended() {
        let temp = TempDir::new().unwrap();
        let store = StatusStore::new();
        let script = script_in(&temp);

        let result = store.append_status(&script, ScriptStatus::Unset);
        assert!(matches!(result, Err(StatusError::UnwritableStatus(_))));
        assert!(!StatusStore::status_path(&script).exists());
    }

    #[test]
    fn test_legacy_single_line_log() {
        let temp = TempDir::new().unwrap();
        let store = StatusStore::new();
        let script = script_in(&temp);

        std::fs::write(StatusStore::status_path(&script), "finished\n").unwrap();
        assert_eq!(store.get_status(&script), ScriptStatus::Finished);

        std::fs::write(StatusStore::status_path(&script), "none\n").unwrap();
        assert_eq!(store.get_status(&script), ScriptStatus::Unset);
    }

    #[test]
    fn test_empty_log_is_unset() {
        let temp = TempDir::new().unwrap();
        let store = StatusStore::new();
        let script = script_in(&temp);

        std::fs::write(StatusStore::status_path(&script), "\n\n").unwrap();
        assert_eq!(store.get_status(&script), ScriptStatus::Unset);
    }

    #[test]
    fn test_torn_record_is_unset() {
        let temp = TempDir::new().unwrap();
        let store = StatusStore::new();
        let script = script_in(&temp);

        std::fs::write(
            StatusStore::status_path(&script),
            "10:00:00\nrunning\n10:05:00\n",
        )
        .unwrap();
        assert_eq!(store.get_status(&script), ScriptStatus::Unset);

        let history = store.history(&script).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, ScriptStatus::Running);
    }

    #[test]
    fn test_parse_records_pairs_lines() {
        let records = parse_records("09:00:00\ntodo\n\n09:01:30\nrunning\nfinished\n");
        assert_eq!(records.len(), 3);
        assert_eq!(
            records[0].timestamp,
            NaiveTime::from_hms_opt(9, 0, 0)
        );
        assert_eq!(records[1].status, ScriptStatus::Running);
        assert_eq!(records[2].timestamp, None);
        assert_eq!(records[2].status, ScriptStatus::Finished);
    }
}
