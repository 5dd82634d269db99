//! # NoteSync Server
//!
//! Server side of NoteSync incremental synchronization.
//!
//! This crate provides:
//! - Push Pipeline with per-entry optimistic version checks
//! - Pull Pipeline with signed, paged sync tokens and cold-start snapshots
//! - Conflict Resolver (`takeLocal`, `takeRemote`, `keepBoth`)
//! - Deferred conflict inbox, sync status and full sync
//! - CRUD entry points sharing the sync version lineage
//!
//! # Protocol
//!
//! Clients pull, then push:
//! 1. Pull with the last token (none on first run) until `has_more` is false
//! 2. Push pending local changes with the versions they were based on
//! 3. Settle reported conflicts with a resolution strategy
//!
//! Transport and authentication are the embedding application's concern;
//! every call takes the already authenticated owner.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod conflicts;
mod error;
mod handler;
pub mod pull;
pub mod push;
pub mod resolver;
mod server;

pub use config::ServerConfig;
pub use conflicts::ConflictInbox;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use server::SyncServer;
