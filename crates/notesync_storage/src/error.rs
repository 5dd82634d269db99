//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a [`crate::StorageBackend`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read reached past the end of the stored bytes.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: usize,
        /// Current size.
        size: u64,
    },

    /// Truncation was asked to grow the store.
    #[error("cannot truncate to {requested} bytes, store holds {size}")]
    TruncateBeyondEnd {
        /// Requested size.
        requested: u64,
        /// Current size.
        size: u64,
    },

    /// The backend refused the write (used by fault-injecting wrappers).
    #[error("write rejected: {0}")]
    WriteRejected(String),
}

impl StorageError {
    /// Returns true when retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            StorageError::WriteRejected(_) => true,
            StorageError::ReadPastEnd { .. } | StorageError::TruncateBeyondEnd { .. } => false,
        }
    }
}
