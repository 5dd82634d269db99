//! # NoteSync Protocol
//!
//! Wire types exchanged between sync clients and the server.
//!
//! This crate provides:
//! - Push / pull / resolve / status messages
//! - [`SyncMessage`] envelope with CBOR encoding
//! - [`SyncToken`] and the signing [`TokenCodec`]
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod messages;
mod token;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    ErrorResponse, FailedEntry, FullSyncResponse, PullRequest, PullResponse, PushEntry,
    PushRequest, PushResponse, ResolveRequest, ResolveResponse, ResolveStrategy, StatusRequest,
    SyncMessage, SyncStatus,
};
pub use token::{SyncToken, TokenCodec};

/// Protocol version spoken by this crate.
pub const PROTOCOL_VERSION: u16 = 1;
