//! Recursive discovery of job scripts.
//!
//! Scripts are found anywhere under a root directory by matching their file
//! name against a shell wildcard. A missing root is not an error: it simply
//! means there is no work.

mod pattern;

pub use pattern::WildcardPattern;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::sidecar::is_sidecar;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Invalid filename pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Finds scripts matching a wildcard below a root directory.
#[derive(Debug, Clone)]
pub struct ScriptDiscoverer {
    pattern: WildcardPattern,
}

impl ScriptDiscoverer {
    pub fn new(pattern: &str) -> Result<Self, DiscoveryError> {
        Ok(Self {
            pattern: WildcardPattern::new(pattern)?,
        })
    }

    pub fn pattern(&self) -> &WildcardPattern {
        &self.pattern
    }

    /// Absolute paths of all matching files under `root`, sorted.
    ///
    /// Hidden directories below the root are not searched. Status and lock
    /// sidecar files are never reported. Unreadable entries are logged and
    /// skipped.
    pub fn discover(&self, root: &Path) -> Vec<PathBuf> {
        let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());

        if !root.is_dir() {
            debug!("Script directory {:?} does not exist, nothing to discover", root);
            return Vec::new();
        }

        let mut scripts = Vec::new();
        let walker = WalkDir::new(&root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden_dir(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {:?}: {}", root, e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let Some(name) = entry.file_name().to_str() else {
                debug!("Skipping non UTF-8 file name {:?}", entry.path());
                continue;
            };

            if is_sidecar(name) || !self.pattern.matches(name) {
                continue;
            }

            scripts.push(entry.into_path());
        }

        scripts.sort();
        debug!(
            "Discovered {} scripts matching {:?} under {:?}",
            scripts.len(),
            self.pattern.as_str(),
            root
        );
        scripts
    }
}

/// Convenience wrapper around [`ScriptDiscoverer`].
pub fn discover_scripts(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
    Ok(ScriptDiscoverer::new(pattern)?.discover(root))
}

fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}
