//! Per-script advisory locks shared between independent processes.
//!
//! The lock for a script is an `flock(2)` on `<script>.lock` (the platform
//! file lock elsewhere). The lock file carries no payload and is left in
//! place after release. Locks are advisory: they only exclude other
//! cooperating starters.
//!
//! Acquisition blocks without a timeout. A holder that hangs while holding
//! the lock blocks every other starter touching that script; a holder that
//! dies releases it, since the kernel drops `flock` locks when the descriptor
//! is closed.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::trace;

use crate::sidecar::{sidecar_path, LOCK_SUFFIX};

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Failed to open lock file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Holds a script's lock until dropped.
///
/// Dropping the guard (including during unwinding) unlocks and closes the
/// lock file.
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Closing alone leaves the lock held while any duplicate of the
        // descriptor is still open.
        let _ = flock(&self.file, FlockOp::Unlock);
        trace!("Released lock {:?}", self.path);
    }
}

/// Hands out per-script locks.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockManager;

impl LockManager {
    pub fn new() -> Self {
        Self
    }

    /// Path of the lock file for `script`.
    pub fn lock_path(script: &Path) -> PathBuf {
        sidecar_path(script, LOCK_SUFFIX)
    }

    /// Blocks until the lock for `script` is held.
    pub fn acquire(&self, script: &Path) -> Result<LockGuard, LockError> {
        let (file, path) = open_lock_file(script)?;
        flock(&file, FlockOp::Exclusive).map_err(|e| LockError::Lock {
            path: path.clone(),
            source: e,
        })?;
        trace!("Acquired lock {:?}", path);
        Ok(LockGuard { file, path })
    }

    /// Takes the lock for `script` if nobody holds it.
    pub fn try_acquire(&self, script: &Path) -> Result<Option<LockGuard>, LockError> {
        let (file, path) = open_lock_file(script)?;
        match flock(&file, FlockOp::TryExclusive) {
            Ok(()) => Ok(Some(LockGuard { file, path })),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(LockError::Lock { path, source: e }),
        }
    }

    /// Runs `f` while holding the lock for `script`.
    ///
    /// The lock is released when `f` returns, panics, or produces an error.
    pub fn with_lock<T, F>(&self, script: &Path, f: F) -> Result<T, LockError>
    where
        F: FnOnce() -> T,
    {
        let _guard = self.acquire(script)?;
        Ok(f())
    }
}

fn open_lock_file(script: &Path) -> Result<(File, PathBuf), LockError> {
    let path = LockManager::lock_path(script);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .map_err(|e| LockError::Open {
            path: path.clone(),
            source: e,
        })?;
    Ok((file, path))
}

#[derive(Debug, Clone, Copy)]
enum FlockOp {
    Exclusive,
    TryExclusive,
    Unlock,
}

#[cfg(unix)]
fn flock(file: &File, op: FlockOp) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let operation = match op {
        FlockOp::Exclusive => libc::LOCK_EX,
        FlockOp::TryExclusive => libc::LOCK_EX | libc::LOCK_NB,
        FlockOp::Unlock => libc::LOCK_UN,
    };

    loop {
        // SAFETY: the descriptor is owned by `file` and stays open for the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        return Err(err);
    }
}

#[cfg(not(unix))]
fn flock(file: &File, op: FlockOp) -> io::Result<()> {
    use std::fs::TryLockError;

    match op {
        FlockOp::Exclusive => file.lock(),
        FlockOp::TryExclusive => file.try_lock().map_err(|e| match e {
            TryLockError::WouldBlock => io::Error::from(io::ErrorKind::WouldBlock),
            TryLockError::Error(e) => e,
        }),
        FlockOp::Unlock => file.unlock(),
    }
}
