//! # NoteSync Core
//!
//! The per-user data domain behind NoteSync.
//!
//! This crate provides:
//! - Entity model for notes, folders, notebooks and tags
//! - Entity Store with per-entity version counters and tombstones
//! - Append-only Change Log with durable, CRC-checked framing
//! - The "apply change" primitive shared by CRUD handlers and sync
//! - Owner registry and on-disk data directory layout
//!
//! ## Invariants
//!
//! - Every accepted mutation bumps the entity version by exactly one
//! - Change Log sequences are gap-free per owner and start at 1
//! - A log entry and its store update are applied together or not at all
//! - Entries are immutable once appended; deletes leave tombstones

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod change;
mod config;
mod dir;
mod domain;
mod entity;
mod error;
mod log;
mod registry;
mod store;
mod types;

pub use change::{
    AppliedChange, ApplyOutcome, ChangeLogEntry, ChangeRequest, ConflictReason, ConflictRecord,
    Operation,
};
pub use config::Config;
pub use dir::DataDir;
pub use domain::{DomainStats, OwnerDomain};
pub use entity::{
    Entity, EntityId, EntityKey, EntityKind, EntityPayload, FolderPayload, NotePayload,
    NotebookPayload, TagPayload, DEFAULT_TAG_COLOR,
};
pub use error::{CoreError, CoreResult};
pub use log::{compute_crc32, decode_frames, encode_frame, ChangeLog, FrameScan};
pub use registry::{BackendFactory, MemoryBackends, Registry};
pub use store::EntityStore;
pub use types::{now_millis, ClientId, OwnerId};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
