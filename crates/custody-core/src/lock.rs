//! Exclusive tail lock for the append path.
//!
//! The "current tail" of the chain is the only mutable shared resource in
//! the whole core. [`TailLock`] is the serialization scope that guards it:
//! an advisory file lock with a bounded, polling acquire and RAII release.
//! Held only for read-tail + hash + insert; every other path (reads,
//! verification, registry lookups) runs without it.

use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use crate::error::ErrorCode;

/// Poll interval while waiting for the lock.
const ACQUIRE_POLL: Duration = Duration::from_millis(10);

/// Tail lock acquisition errors.
#[derive(Debug)]
pub enum LockError {
    /// Another appender held the lock past the bounded wait.
    Timeout {
        /// Lock file path.
        path: PathBuf,
        /// How long acquisition waited before giving up.
        waited: Duration,
    },
    /// Filesystem failure while opening or locking.
    IoError(io::Error),
}

impl From<io::Error> for LockError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err)
    }
}

impl LockError {
    /// Machine-readable code associated with this lock error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::AppendContention,
            Self::IoError(_) => ErrorCode::EntryWriteFailed,
        }
    }
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { path, waited } => {
                write!(
                    f,
                    "{}: tail lock timed out after {:?} at {}",
                    self.code().code(),
                    waited,
                    path.display()
                )
            }
            Self::IoError(err) => write!(f, "{}: {}", self.code().code(), err),
        }
    }
}

impl std::error::Error for LockError {}

/// RAII guard for the exclusive append serialization scope.
///
/// Dropping the guard releases the lock, so a failed insert inside the
/// scope can never strand it.
#[derive(Debug)]
pub struct TailLock {
    file: File,
    path: PathBuf,
}

impl TailLock {
    /// Acquire the exclusive tail lock, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] when the bounded wait expires — the
    /// caller retries the whole append — or [`LockError::IoError`] on
    /// filesystem failure.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let parent = path.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "lock path has no parent")
        })?;
        fs::create_dir_all(parent)?;

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(path)?;

            if file.try_lock_exclusive().is_ok() {
                return Ok(Self {
                    file,
                    path: path.to_path_buf(),
                });
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path: path.to_path_buf(),
                    waited: start.elapsed(),
                });
            }

            thread::sleep(ACQUIRE_POLL);
        }
    }

    /// Explicitly release the lock. Release also happens on drop.
    pub fn release(self) {
        let _ = self.file.unlock();
    }

    /// Return the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TailLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
