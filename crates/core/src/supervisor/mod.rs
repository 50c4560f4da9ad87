//! Child process supervision.
//!
//! Concurrency comes from independent OS processes, not threads: the
//! supervisor spawns children up to a ceiling and collects their exits with
//! non-blocking polls from a single control loop.

mod command;
mod process;

pub use command::{CommandLine, LaunchCommand, PLACEHOLDER};
pub use process::{ExitOutcome, LaunchedProcess, ProcessExit, ProcessSupervisor};

use std::path::PathBuf;

use thiserror::Error;

/// Errors from building or spawning child processes.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Invalid launch command {template:?}: {reason}")]
    InvalidCommand { template: String, reason: String },

    #[error("Failed to spawn {script}: {source}")]
    SpawnFailed {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("All {ceiling} process slots are in use")]
    AtCapacity { ceiling: usize },
}
