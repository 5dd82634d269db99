//! Protocol errors.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding, decoding or interpreting wire data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// CBOR encoding failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// CBOR decoding failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// A push entry lacks a required field.
    #[error("push entry {index}: missing required field `{field}`")]
    MissingField {
        /// Position of the entry in its batch.
        index: usize,
        /// Wire name of the missing field.
        field: &'static str,
    },

    /// A sync token could not be recognized.
    #[error("unrecognized sync token: {0}")]
    InvalidToken(String),
}
