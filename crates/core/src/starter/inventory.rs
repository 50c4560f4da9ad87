//! Read-only views of a script tree.
//!
//! None of these take locks: a status may change right after it was read.

use std::path::Path;

use crate::discovery::{DiscoveryError, ScriptDiscoverer};
use crate::status::StatusStore;

use super::types::ScriptEntry;

pub(super) fn entries(
    discoverer: &ScriptDiscoverer,
    directory: &Path,
    store: &StatusStore,
) -> Vec<ScriptEntry> {
    discoverer
        .discover(directory)
        .into_iter()
        .map(|path| {
            let status = store.get_status(&path);
            ScriptEntry { path, status }
        })
        .collect()
}

/// Every script matching `pattern` under `directory`, with its status.
pub fn list_scripts(directory: &Path, pattern: &str) -> Result<Vec<ScriptEntry>, DiscoveryError> {
    let discoverer = ScriptDiscoverer::new(pattern)?;
    Ok(entries(&discoverer, directory, &StatusStore::new()))
}

/// Number of scripts matching `pattern` under `directory`.
pub fn count_scripts(directory: &Path, pattern: &str) -> Result<usize, DiscoveryError> {
    Ok(ScriptDiscoverer::new(pattern)?.discover(directory).len())
}

/// Number of scripts that have not finished yet, i.e. that a run without
/// `rerun` would launch or is already running.
pub fn count_pending(directory: &Path, pattern: &str) -> Result<usize, DiscoveryError> {
    Ok(list_scripts(directory, pattern)?
        .iter()
        .filter(|e| e.status.is_eligible(false))
        .count())
}
