//! Error types for the sync server.

use notesync_core::{CoreError, EntityKey};
use notesync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A push batch failed validation; nothing was applied.
    #[error("invalid batch entry {index}: {message}")]
    InvalidBatch {
        /// Position of the first bad entry.
        index: usize,
        /// What is wrong with it.
        message: String,
    },

    /// A push batch exceeds the configured limit.
    #[error("push batch too large: {len} > {max}")]
    BatchTooLarge {
        /// Submitted entries.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// No conflict is recorded for the entity and none was supplied.
    #[error("no conflict recorded for {0}")]
    ConflictNotFound(EntityKey),

    /// A resolution kept losing races against other writers.
    #[error("resolution of {0} contended, retry later")]
    Contended(EntityKey),

    /// Core data domain error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Wire protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        match self {
            ServerError::InvalidRequest(_)
            | ServerError::InvalidBatch { .. }
            | ServerError::BatchTooLarge { .. }
            | ServerError::ConflictNotFound(_)
            | ServerError::Protocol(_) => true,
            ServerError::Core(err) => err.is_validation(),
            ServerError::Contended(_) | ServerError::Internal(_) => false,
        }
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// HTTP-like status code.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::BatchTooLarge { .. } => 413,
            ServerError::ConflictNotFound(_) => 404,
            ServerError::Contended(_) => 503,
            _ if self.is_client_error() => 400,
            _ => 500,
        }
    }
}
