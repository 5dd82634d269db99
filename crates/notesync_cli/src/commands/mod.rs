//! CLI command implementations.

pub mod dump_log;
pub mod inspect;
pub mod verify;

use notesync_core::{decode_frames, DataDir, FrameScan, OwnerId};
use notesync_storage::{FileBackend, StorageBackend};
use std::path::Path;

/// Result type of CLI commands.
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Opens an existing data directory, taking its lock.
pub fn open_dir(path: &Path) -> CliResult<DataDir> {
    Ok(DataDir::open(path, false)?)
}

/// Raw bytes of an owner's log file.
pub fn read_log_bytes(dir: &DataDir, owner: &OwnerId) -> CliResult<Vec<u8>> {
    let path = dir.owner_log_path(owner);
    if !path.exists() {
        return Err(format!("no change log for owner {owner}").into());
    }
    let backend = FileBackend::open(&path)?;
    let size = usize::try_from(backend.size()?)?;
    Ok(backend.read_at(0, size)?)
}

/// Decoded frames of an owner's log.
pub fn scan_log(dir: &DataDir, owner: &OwnerId) -> CliResult<FrameScan> {
    let bytes = read_log_bytes(dir, owner)?;
    Ok(decode_frames(&bytes)?)
}

#[cfg(test)]
pub(crate) mod testing {
    use notesync_core::{ChangeRequest, Config, EntityKind, NotePayload, OwnerId, Registry};
    use std::path::Path;

    /// Seeds `alice` with n1 (created, updated), n2 (deleted), n3 and
    /// `bob` with one note.
    pub fn seed(path: &Path) {
        let registry = Registry::open(path, &Config::default()).unwrap();
        let alice = registry.domain(&OwnerId::new("alice")).unwrap();
        for id in ["n1", "n2", "n3"] {
            alice
                .apply(ChangeRequest::create(id, NotePayload::new(id, ""), "A"))
                .unwrap();
        }
        alice
            .apply(ChangeRequest::update("n1", NotePayload::new("n1 final", ""), 1, "A"))
            .unwrap();
        alice
            .apply(ChangeRequest::delete(EntityKind::Note, "n2", 1, "B"))
            .unwrap();
        let bob = registry.domain(&OwnerId::new("bob")).unwrap();
        bob.apply(ChangeRequest::create("b1", NotePayload::new("b1", ""), "B"))
            .unwrap();
    }
}
