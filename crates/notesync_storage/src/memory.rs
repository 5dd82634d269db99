//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// A heap-backed store.
///
/// Clones share the same buffer, so a test can keep a handle while the
/// change log owns another and later reopen a log over the same bytes.
///
/// ```rust
/// use notesync_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// assert_eq!(backend.append(b"abc").unwrap(), 0);
/// assert_eq!(backend.size().unwrap(), 3);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend preloaded with `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_offsets() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.size().unwrap(), 11);
        assert_eq!(backend.read_at(6, 5).unwrap(), b"world");
    }

    #[test]
    fn read_past_end_fails() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hello").unwrap();
        assert!(matches!(
            backend.read_at(3, 10),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn clones_share_bytes() {
        let mut writer = InMemoryBackend::new();
        let reader = writer.clone();
        writer.append(b"shared").unwrap();
        assert_eq!(reader.data(), b"shared");
    }

    #[test]
    fn read_from_offset() {
        let backend = InMemoryBackend::with_data(b"0123456789".to_vec());
        assert_eq!(backend.read_from(7).unwrap(), b"789");
        assert!(backend.read_from(10).unwrap().is_empty());
    }

    #[test]
    fn truncate_shrinks_only() {
        let mut backend = InMemoryBackend::with_data(b"hello world".to_vec());
        backend.truncate(5).unwrap();
        assert_eq!(backend.data(), b"hello");
        assert!(matches!(
            backend.truncate(50),
            Err(StorageError::TruncateBeyondEnd { .. })
        ));
    }
}
