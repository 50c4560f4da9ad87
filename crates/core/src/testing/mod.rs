//! Testing utilities for script trees.
//!
//! # Example
//!
//! ```rust,ignore
//! use jobstarter_core::testing::fixtures;
//!
//! let temp = tempfile::TempDir::new()?;
//! let script = fixtures::write_script(temp.path(), "exp_1/rep_1/run.sh", "exit 0");
//! fixtures::write_status_log(&script, "10:00:00\nrunning\n");
//! fixtures::backdate(&fixtures::status_log(&script), Duration::from_secs(3600));
//! ```

/// Test fixtures and helper functions.
///
/// These panic on I/O errors; they are meant for tests only.
pub mod fixtures {
    use std::fs::{self, File};
    use std::path::{Path, PathBuf};
    use std::time::{Duration, SystemTime};

    use crate::status::StatusStore;

    /// Write a shell script at `root/relative`, creating parent directories.
    ///
    /// The script is made executable so it can also be launched directly.
    pub fn write_script(root: &Path, relative: &str, body: &str) -> PathBuf {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create script directory");
        }
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Failed to write script");
        make_executable(&path);
        path
    }

    /// Script that appends one line to `<script>.runs` every time it runs,
    /// sleeping for `sleep_secs` first.
    pub fn counting_script(root: &Path, relative: &str, sleep_secs: f64) -> PathBuf {
        write_script(
            root,
            relative,
            &format!("sleep {sleep_secs}\necho run >> \"$0.runs\""),
        )
    }

    /// How many times a [`counting_script`] ran.
    pub fn run_count(script: &Path) -> usize {
        let mut runs = script.as_os_str().to_owned();
        runs.push(".runs");
        fs::read_to_string(PathBuf::from(runs))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    pub fn status_log(script: &Path) -> PathBuf {
        StatusStore::status_path(script)
    }

    /// Replace the status log of `script` with raw `contents`.
    pub fn write_status_log(script: &Path, contents: &str) {
        fs::write(status_log(script), contents).expect("Failed to write status log");
    }

    /// Move the modification time of `path` into the past.
    pub fn backdate(path: &Path, by: Duration) {
        let file = File::options()
            .write(true)
            .open(path)
            .expect("Failed to open file to backdate");
        let when = SystemTime::now() - by;
        file.set_modified(when).expect("Failed to set modification time");
    }

    #[cfg(unix)]
    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .expect("Failed to make script executable");
    }

    #[cfg(not(unix))]
    fn make_executable(_path: &Path) {}
}
