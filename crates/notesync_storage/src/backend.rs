//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-only byte store.
///
/// # Invariants
///
/// - `append` returns the offset of the first written byte
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - after `flush` returns, appended bytes survive process exit
/// - `truncate` only ever shrinks; the change log uses it to drop a torn
///   tail found during replay or a record whose write failed half-way
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to durable storage.
    fn flush(&mut self) -> StorageResult<()>;

    /// Current size in bytes, i.e. the offset of the next append.
    fn size(&self) -> StorageResult<u64>;

    /// Shrinks the store to `new_size` bytes.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Reads everything from `offset` to the end.
    fn read_from(&self, offset: u64) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        if offset >= size {
            return Ok(Vec::new());
        }
        self.read_at(offset, (size - offset) as usize)
    }
}

impl<B: StorageBackend + ?Sized> StorageBackend for Box<B> {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        (**self).read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        (**self).append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        (**self).flush()
    }

    fn size(&self) -> StorageResult<u64> {
        (**self).size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        (**self).truncate(new_size)
    }
}
