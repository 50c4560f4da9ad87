//! Per-script lifecycle status, persisted as an append-only log.
//!
//! ```text
//! unset --(first seen)--> todo
//! todo/error/running --(launched)--> running
//! running --(exit 0)--> finished
//! running --(exit != 0 or spawn failure)--> error
//! ```

mod store;
mod types;

pub use store::StatusStore;
pub use types::{ScriptStatus, StatusRecord, StatusSnapshot};

use std::path::PathBuf;

use thiserror::Error;

/// Errors from reading or appending status logs.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("I/O error on status log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Status {0} cannot be written to a log")]
    UnwritableStatus(ScriptStatus),
}
