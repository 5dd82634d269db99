//! # NoteSync Storage
//!
//! Append-only byte stores that back the per-owner change logs.
//!
//! Backends know nothing about change-log framing, CBOR or entities. They
//! hand out offsets for appended bytes and read them back; the core crate
//! owns every byte layout on top of that.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - tests and ephemeral servers
//! - [`FileBackend`] - one file per owner log
//!
//! ## Example
//!
//! ```rust
//! use notesync_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"entry").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"entry");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
