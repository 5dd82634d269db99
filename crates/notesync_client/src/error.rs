//! Error types for the sync client.

use notesync_core::{CoreError, EntityKey};
use notesync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for client operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur on the client side of sync.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server answered with an error reply.
    #[error("server error {code}: {message}")]
    Server {
        /// HTTP-like status code.
        code: u16,
        /// Server message.
        message: String,
    },

    /// A message could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A local change failed validation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The server replied with the wrong message type.
    #[error("expected {expected} reply, got {got}")]
    UnexpectedReply {
        /// Expected message type.
        expected: &'static str,
        /// Received message type.
        got: &'static str,
    },

    /// No parked conflict exists for this entity.
    #[error("no conflict pending for {0}")]
    ConflictNotFound(EntityKey),

    /// Some pushed entries failed on the server.
    #[error("{count} pushed entries failed")]
    EntriesFailed {
        /// Number of failed entries.
        count: usize,
        /// True if every failure was transient.
        retryable: bool,
    },

    /// A token refresh failed.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::EntriesFailed { retryable, .. } => *retryable,
            SyncError::Server { code, .. } => *code >= 500,
            _ => false,
        }
    }
}
