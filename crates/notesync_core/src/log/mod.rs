//! Append-only, per-owner change log.
//!
//! The log keeps every entry in memory for fast paging and mirrors each
//! append to a [`StorageBackend`] as a CRC-checked frame. Sequences are
//! assigned under the writer lock, so they are gap-free and strictly
//! ascending; a failed write is rolled back before the lock is released.

mod record;

pub use record::{compute_crc32, decode_frames, encode_frame, FrameScan, LOG_MAGIC, LOG_VERSION};

use crate::change::ChangeLogEntry;
use crate::error::{CoreError, CoreResult};
use notesync_storage::StorageBackend;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{info, warn};

struct Writer {
    backend: Box<dyn StorageBackend>,
    /// Byte length of the log made of committed frames.
    tail: u64,
}

/// Ordered record of every accepted mutation of one owner.
pub struct ChangeLog {
    entries: RwLock<Vec<Arc<ChangeLogEntry>>>,
    writer: Mutex<Writer>,
    sync_on_append: bool,
}

impl ChangeLog {
    /// Opens a log over `backend`, replaying any frames already present.
    ///
    /// A torn final frame is cut off. Sequences must run 1, 2, 3, ...
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LogCorruption`] for damaged frames or a
    /// sequence gap, and storage errors from the backend.
    pub fn open(mut backend: Box<dyn StorageBackend>, sync_on_append: bool) -> CoreResult<Self> {
        let bytes = backend.read_from(0)?;
        let scan = decode_frames(&bytes)?;

        if scan.torn_tail {
            warn!(
                valid_len = scan.valid_len,
                file_len = bytes.len(),
                "dropping torn change log tail"
            );
            backend.truncate(scan.valid_len)?;
        }

        for (index, entry) in scan.entries.iter().enumerate() {
            let expected = index as u64 + 1;
            if entry.sequence != expected {
                return Err(CoreError::log_corruption(
                    0,
                    format!(
                        "sequence gap: expected {expected}, found {}",
                        entry.sequence
                    ),
                ));
            }
        }

        if !scan.entries.is_empty() {
            info!(entries = scan.entries.len(), "replayed change log");
        }

        Ok(Self {
            entries: RwLock::new(scan.entries.into_iter().map(Arc::new).collect()),
            writer: Mutex::new(Writer {
                backend,
                tail: scan.valid_len,
            }),
            sync_on_append,
        })
    }

    /// Appends an entry, assigning it the next sequence.
    ///
    /// The `sequence` field of `entry` is overwritten.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the frame could not be written. The
    /// log is left exactly as it was, so no sequence is consumed.
    pub fn append(&self, mut entry: ChangeLogEntry) -> CoreResult<Arc<ChangeLogEntry>> {
        let mut writer = self.writer.lock();
        entry.sequence = self.head() + 1;
        let frame = encode_frame(&entry)?;

        if let Err(err) = self.write_frame(&mut writer, &frame) {
            let tail = writer.tail;
            if let Err(rollback) = writer.backend.truncate(tail) {
                warn!(error = %rollback, "change log rollback failed; retrying on next append");
            }
            return Err(err);
        }
        writer.tail += frame.len() as u64;

        let entry = Arc::new(entry);
        self.entries.write().push(Arc::clone(&entry));
        Ok(entry)
    }

    fn write_frame(&self, writer: &mut Writer, frame: &[u8]) -> CoreResult<()> {
        if writer.backend.size()? != writer.tail {
            let tail = writer.tail;
            writer.backend.truncate(tail)?;
        }
        writer.backend.append(frame)?;
        if self.sync_on_append {
            writer.backend.flush()?;
        }
        Ok(())
    }

    /// Highest assigned sequence (0 when empty).
    pub fn head(&self) -> u64 {
        self.entries.read().len() as u64
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing was ever appended.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns up to `limit` entries with `sequence > after`, ascending.
    pub fn entries_after(&self, after: u64, limit: usize) -> Vec<Arc<ChangeLogEntry>> {
        let entries = self.entries.read();
        let start = usize::try_from(after).unwrap_or(usize::MAX).min(entries.len());
        entries[start..].iter().take(limit).cloned().collect()
    }

    /// Returns the entry at `sequence`.
    pub fn get(&self, sequence: u64) -> Option<Arc<ChangeLogEntry>> {
        let index = usize::try_from(sequence.checked_sub(1)?).ok()?;
        self.entries.read().get(index).cloned()
    }

    /// Returns every entry, ascending.
    pub fn entries(&self) -> Vec<Arc<ChangeLogEntry>> {
        self.entries.read().clone()
    }

    /// Flushes the backend.
    ///
    /// # Errors
    ///
    /// Returns the backend's flush error.
    pub fn flush(&self) -> CoreResult<()> {
        self.writer.lock().backend.flush()?;
        Ok(())
    }

    /// Bytes of committed frames.
    pub fn byte_len(&self) -> u64 {
        self.writer.lock().tail
    }
}

impl std::fmt::Debug for ChangeLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeLog")
            .field("head", &self.head())
            .field("sync_on_append", &self.sync_on_append)
            .finish_non_exhaustive()
    }
}
