//! # NoteSync Testkit
//!
//! Test utilities for NoteSync.
//!
//! This crate provides:
//! - Server fixtures (memory and file backed) and seeded scenarios
//! - Property-based generators for payloads and edit sequences
//! - Fault-injecting storage for partial-failure tests
//! - Concurrency stress helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use notesync_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_server() {
//!     with_temp_server(|server| {
//!         scenarios::draft_then_final(server, &alice());
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
