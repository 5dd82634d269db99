//! Verify command implementation.

use super::{open_dir, read_log_bytes, CliResult};
use notesync_core::{decode_frames, EntityStore, OwnerId};
use std::path::Path;

/// Verification result of one owner's log.
#[derive(Debug)]
pub struct VerifyResult {
    /// Owner.
    pub owner: OwnerId,
    /// Entries decoded.
    pub entries_checked: usize,
    /// A partial frame follows the last complete one.
    pub torn_tail: bool,
    /// Problems found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            entries_checked: 0,
            torn_tail: false,
            errors: Vec::new(),
        }
    }

    /// True if no errors were found. A torn tail is not an error; it is
    /// truncated on the next open.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks framing and CRCs, gap-free sequences and version lineage.
pub fn verify_bytes(owner: OwnerId, bytes: &[u8]) -> VerifyResult {
    let mut result = VerifyResult::new(owner);
    let scan = match decode_frames(bytes) {
        Ok(scan) => scan,
        Err(e) => {
            result.errors.push(e.to_string());
            return result;
        }
    };
    result.torn_tail = scan.torn_tail;

    let store = EntityStore::new(result.owner.clone());
    for (i, entry) in scan.entries.iter().enumerate() {
        result.entries_checked += 1;
        let expected = i as u64 + 1;
        if entry.sequence != expected {
            result.errors.push(format!(
                "sequence gap: expected {expected}, found {}",
                entry.sequence
            ));
            break;
        }
        if let Err(e) = store.replay(entry) {
            result.errors.push(e.to_string());
        }
    }
    result
}

/// Runs the verify command.
pub fn run(path: &Path, only: Option<&str>) -> CliResult<()> {
    println!("Verifying data directory at {}", path.display());
    println!();

    let dir = open_dir(path)?;
    let owners = match only {
        Some(owner) => vec![OwnerId::new(owner)],
        None => dir.list_owners()?,
    };

    let mut failed = 0usize;
    for owner in owners {
        let bytes = read_log_bytes(&dir, &owner)?;
        let result = verify_bytes(owner, &bytes);
        print_result(&result);
        if !result.is_ok() {
            failed += 1;
        }
    }

    println!();
    if failed == 0 {
        println!("✓ Verification passed");
        Ok(())
    } else {
        println!("✗ Verification failed for {failed} owner(s)");
        Err("Verification failed".into())
    }
}

fn print_result(result: &VerifyResult) {
    println!("Owner {}", result.owner);
    println!("  Entries checked: {}", result.entries_checked);
    if result.torn_tail {
        println!("  Torn tail: yes (truncated on next open)");
    }
    for error in &result.errors {
        println!("  ERROR: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::seed;
    use notesync_core::{encode_frame, ChangeLogEntry, ClientId, EntityKind, NotePayload, Operation};
    use tempfile::TempDir;

    fn entry(sequence: u64, id: &str, version: u64) -> ChangeLogEntry {
        ChangeLogEntry {
            sequence,
            kind: EntityKind::Note,
            entity_id: id.into(),
            operation: if version == 1 {
                Operation::Create
            } else {
                Operation::Update
            },
            before: None,
            after: Some(NotePayload::new(id, "").into()),
            resulting_version: version,
            origin: ClientId::new("A"),
            applied_at: 0,
        }
    }

    fn log(entries: &[ChangeLogEntry]) -> Vec<u8> {
        entries
            .iter()
            .flat_map(|e| encode_frame(e).unwrap())
            .collect()
    }

    #[test]
    fn seeded_directory_verifies() {
        let dir = TempDir::new().unwrap();
        seed(dir.path());
        assert!(run(dir.path(), None).is_ok());
    }

    #[test]
    fn detects_sequence_gap() {
        let bytes = log(&[entry(1, "n1", 1), entry(3, "n1", 2)]);
        let result = verify_bytes(OwnerId::new("alice"), &bytes);
        assert!(!result.is_ok());
        assert!(result.errors[0].contains("gap"));
    }

    #[test]
    fn detects_version_jump() {
        let bytes = log(&[entry(1, "n1", 1), entry(2, "n1", 3)]);
        let result = verify_bytes(OwnerId::new("alice"), &bytes);
        assert!(!result.is_ok());
    }

    #[test]
    fn detects_crc_damage() {
        let mut bytes = log(&[entry(1, "n1", 1), entry(2, "n1", 2)]);
        let mid = bytes.len() / 4;
        bytes[mid] ^= 0xFF;
        let result = verify_bytes(OwnerId::new("alice"), &bytes);
        assert!(!result.is_ok());
    }

    #[test]
    fn torn_tail_is_not_an_error() {
        let mut bytes = log(&[entry(1, "n1", 1), entry(2, "n1", 2)]);
        bytes.truncate(bytes.len() - 3);
        let result = verify_bytes(OwnerId::new("alice"), &bytes);
        assert!(result.is_ok());
        assert!(result.torn_tail);
        assert_eq!(result.entries_checked, 1);
    }
}
