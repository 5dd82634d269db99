//! # NoteSync Client
//!
//! Client side of NoteSync incremental sync.
//!
//! This crate provides:
//! - Sync state machine (idle → pulling → pushing → synced)
//! - Outbox of pending local changes, parked while in conflict
//! - Entity cache of the last server-known state
//! - Transport abstraction with a CBOR message transport
//! - Single-flight token refresh
//!
//! ## Architecture
//!
//! The engine pulls every page first, then pushes pending changes in
//! commit order. Conflicts are never settled automatically; they are
//! reported and wait for [`SyncEngine::resolve`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod engine;
mod error;
mod outbox;
mod refresh;
mod transport;

pub use cache::{CachedEntity, EntityCache};
pub use config::{ClientConfig, RetryConfig};
pub use engine::{SyncCycleResult, SyncEngine, SyncState, SyncStats};
pub use error::{SyncError, SyncResult};
pub use outbox::{Outbox, ParkedChange, PendingChange};
pub use refresh::TokenRefresher;
pub use transport::{MessageChannel, MessageTransport, MockTransport, SyncTransport};
