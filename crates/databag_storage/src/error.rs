//! Storage failures.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Shorthand for results of backend calls.
pub type StorageResult<T> = Result<T, StorageError>;

/// Ways a backend call can fail.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The operating system rejected a file operation.
    #[error("journal file I/O failed: {0}")]
    Io(#[from] io::Error),

    /// A byte range reaches past the stored bytes.
    #[error("range {start}..{end} is outside the {size} stored bytes")]
    OutOfRange {
        /// First requested byte.
        start: u64,
        /// One past the last requested byte.
        end: u64,
        /// Bytes currently stored.
        size: u64,
    },

    /// The journal file is held by another open bag.
    #[error("{} is already open elsewhere", path.display())]
    Locked {
        /// Journal file that could not be locked.
        path: PathBuf,
    },

    /// The stored bytes cannot be used as a journal.
    #[error("unusable journal storage: {0}")]
    Corrupted(String),
}

impl StorageError {
    pub(crate) fn out_of_range(start: u64, len: u64, size: u64) -> Self {
        Self::OutOfRange {
            start,
            end: start.saturating_add(len),
            size,
        }
    }
}

/// Checks that `start..start + len` lies within `size` bytes.
pub(crate) fn check_range(start: u64, len: u64, size: u64) -> StorageResult<()> {
    match start.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(StorageError::out_of_range(start, len, size)),
    }
}
