//! Test fixtures and server helpers.

use notesync_core::{ClientId, NotePayload, OwnerId};
use notesync_server::{ServerConfig, SyncServer};
use std::path::PathBuf;
use tempfile::TempDir;

/// Token secret shared by fixtures so tokens survive a reopen.
pub const TEST_SECRET: &[u8] = b"notesync-test-secret";

/// Configuration used by fixtures.
pub fn test_config() -> ServerConfig {
    ServerConfig::default()
        .with_token_secret(TEST_SECRET.to_vec())
        .with_sync_on_append(false)
}

/// The default test owner.
pub fn alice() -> OwnerId {
    OwnerId::new("alice")
}

/// A second owner for isolation tests.
pub fn bob() -> OwnerId {
    OwnerId::new("bob")
}

/// Client id helper.
pub fn client(name: &str) -> ClientId {
    ClientId::new(name)
}

/// Note payload with a title and empty content.
pub fn note(title: &str) -> NotePayload {
    NotePayload::new(title, "")
}

/// A test server with automatic cleanup.
pub struct TestServer {
    /// The server instance.
    pub server: SyncServer,
    _temp_dir: Option<TempDir>,
}

impl TestServer {
    /// Creates a memory-only test server.
    pub fn memory() -> Self {
        Self {
            server: SyncServer::new(test_config()),
            _temp_dir: None,
        }
    }

    /// Creates a file-backed test server in a fresh temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let server =
            SyncServer::open(temp_dir.path(), test_config()).expect("Failed to open file server");
        Self {
            server,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Data directory if file-backed.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().to_path_buf())
    }

    /// Drops the server and reopens it over the same directory.
    ///
    /// Memory servers are returned unchanged.
    pub fn reopen(self) -> Self {
        let TestServer { server, _temp_dir } = self;
        let Some(temp_dir) = _temp_dir else {
            return TestServer {
                server,
                _temp_dir: None,
            };
        };
        drop(server);
        let server =
            SyncServer::open(temp_dir.path(), test_config()).expect("Failed to reopen server");
        Self {
            server,
            _temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestServer {
    type Target = SyncServer;

    fn deref(&self) -> &Self::Target {
        &self.server
    }
}

/// Runs a test with a temporary in-memory server.
pub fn with_temp_server<F, R>(f: F) -> R
where
    F: FnOnce(&SyncServer) -> R,
{
    let test_server = TestServer::memory();
    f(&test_server.server)
}

/// Runs a test with a temporary file-backed server.
pub fn with_file_server<F, R>(f: F) -> R
where
    F: FnOnce(&SyncServer) -> R,
{
    let test_server = TestServer::file();
    f(&test_server.server)
}

/// Seeded scenarios.
pub mod scenarios {
    use super::*;
    use notesync_core::{ApplyOutcome, EntityKind};

    fn expect_applied(outcome: ApplyOutcome) {
        assert!(
            matches!(outcome, ApplyOutcome::Applied(_)),
            "seeding conflicted: {outcome:?}"
        );
    }

    /// Note `n1` created as "draft" (v1) then updated to "final" (v2) by
    /// client `A`.
    pub fn draft_then_final(server: &SyncServer, owner: &OwnerId) {
        let a = client("A");
        expect_applied(server.create(owner, &a, "n1", note("draft")).expect("create n1"));
        expect_applied(server.update(owner, &a, "n1", note("final")).expect("update n1"));
    }

    /// Notes `n1`, `n2`, `n3` created, then `n2` deleted.
    pub fn three_notes_one_deleted(server: &SyncServer, owner: &OwnerId) {
        let a = client("A");
        for (id, title) in [("n1", "one"), ("n2", "two"), ("n3", "three")] {
            expect_applied(server.create(owner, &a, id, note(title)).expect("create"));
        }
        expect_applied(
            server
                .delete(owner, &a, EntityKind::Note, "n2")
                .expect("delete n2"),
        );
    }

    /// `count` notes named `note-0`, `note-1`, ...
    pub fn many_notes(server: &SyncServer, owner: &OwnerId, count: usize) {
        let a = client("A");
        for i in 0..count {
            expect_applied(
                server
                    .create(owner, &a, format!("note-{i}"), note(&format!("note {i}")))
                    .expect("create"),
            );
        }
    }
}
