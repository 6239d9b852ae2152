//! Append-only job queue shared with the out-of-band pipeline runner.
//!
//! Each entry is one shell command line. Writers take an exclusive,
//! non-blocking `flock` on the queue file itself; on contention they retry a
//! bounded number of times with a fixed delay. The whole line is written with
//! a single `write_all` while the lock is held, so readers never observe an
//! interleaved or partial entry from this process.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to write to {path} after {attempts} retries: queue file is locked")]
    LockExhausted { path: PathBuf, attempts: u32 },

    #[error("queue entry must be a single line")]
    MultiLineEntry,

    #[error("queue I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Writer for the job queue file.
#[derive(Debug, Clone)]
pub struct JobQueue {
    path: PathBuf,
    max_retries: u32,
    retry_delay: Duration,
}

impl JobQueue {
    pub fn new(path: impl Into<PathBuf>, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            path: path.into(),
            max_retries,
            retry_delay,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `entry` plus a newline under an exclusive lock.
    ///
    /// Makes exactly `max_retries` lock attempts before giving up with
    /// [`QueueError::LockExhausted`].
    pub fn append(&self, entry: &str) -> Result<(), QueueError> {
        if entry.contains('\n') {
            return Err(QueueError::MultiLineEntry);
        }
        let mut line = entry.to_string();
        line.push('\n');

        for attempt in 1..=self.max_retries {
            let file = self.open()?;
            match file.try_lock_exclusive() {
                Ok(()) => {
                    let written = write_locked(&file, line.as_bytes());
                    let unlocked = FileExt::unlock(&file);
                    written.map_err(|source| self.io(source))?;
                    unlocked.map_err(|source| self.io(source))?;
                    debug!(path = %self.path.display(), attempt, "queue entry appended");
                    return Ok(());
                }
                Err(err) if is_contended(&err) => {
                    info!(
                        path = %self.path.display(),
                        attempt,
                        max_retries = self.max_retries,
                        "queue file is locked, retrying"
                    );
                    if attempt < self.max_retries {
                        thread::sleep(self.retry_delay);
                    }
                }
                Err(err) => return Err(self.io(err)),
            }
        }

        error!(
            path = %self.path.display(),
            attempts = self.max_retries,
            entry,
            "queue lock retries exhausted"
        );
        Err(QueueError::LockExhausted {
            path: self.path.clone(),
            attempts: self.max_retries,
        })
    }

    fn open(&self) -> Result<File, QueueError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io(source))
    }

    fn io(&self, source: std::io::Error) -> QueueError {
        QueueError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn write_locked(mut file: &File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes)?;
    file.flush()
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
