//! Error types for NoteSync core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the data domain.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] notesync_storage::StorageError),

    /// I/O error outside a backend (directory handling).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// CBOR encoding failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// CBOR decoding failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// A change request is structurally invalid.
    #[error("invalid change: {message}")]
    InvalidChange {
        /// What is wrong with the change.
        message: String,
    },

    /// A payload failed validation.
    #[error("invalid payload: {message}")]
    InvalidPayload {
        /// What is wrong with the payload.
        message: String,
    },

    /// The persisted change log is damaged.
    #[error("change log corruption at offset {offset}: {message}")]
    LogCorruption {
        /// Byte offset of the bad record.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Another process owns the data directory.
    #[error("data directory locked: another process has exclusive access")]
    DirectoryLocked,

    /// The data directory does not exist and creation was disabled.
    #[error("data directory not found: {path}")]
    DirectoryMissing {
        /// The missing path.
        path: String,
    },
}

impl CoreError {
    /// Creates an invalid change error.
    pub fn invalid_change(message: impl Into<String>) -> Self {
        Self::InvalidChange {
            message: message.into(),
        }
    }

    /// Creates an invalid payload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    /// Creates a log corruption error.
    pub fn log_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::LogCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Returns true if retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CoreError::Storage(err) => err.is_transient(),
            CoreError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Returns true for errors caused by the caller's input rather than
    /// by storage.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidChange { .. } | CoreError::InvalidPayload { .. }
        )
    }
}
