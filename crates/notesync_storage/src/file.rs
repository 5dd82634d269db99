//! File-based storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A store backed by a single file.
///
/// `flush` calls `sync_data` so that an acknowledged change-log append is
/// on disk before the caller reports it as applied.
///
/// ```no_run
/// use notesync_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("owner.log")).unwrap();
/// backend.append(b"entry").unwrap();
/// backend.flush().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    inner: Mutex<FileState>,
}

#[derive(Debug)]
struct FileState {
    file: File,
    size: u64,
}

impl FileBackend {
    /// Opens or creates the file at `path`.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(FileState { file, size }),
        })
    }

    /// Opens the file, creating missing parent directories first.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut state = self.inner.lock();
        let size = state.size;
        if offset.saturating_add(len as u64) > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        state.file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        state.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let state = self.inner.get_mut();
        let offset = state.size;
        if data.is_empty() {
            return Ok(offset);
        }

        state.file.seek(SeekFrom::Start(offset))?;
        state.file.write_all(data)?;
        state.size += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        let state = self.inner.get_mut();
        state.file.flush()?;
        state.file.sync_data()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().size)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let state = self.inner.get_mut();
        if new_size > state.size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: state.size,
            });
        }
        state.file.set_len(new_size)?;
        state.file.sync_all()?;
        state.size = new_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_new_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("owner.log");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
        assert_eq!(backend.path(), path);
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("owner.log")).unwrap();

        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.read_at(0, 11).unwrap(), b"hello world");
        assert!(matches!(
            backend.read_at(8, 10),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("owner.log");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"persistent").unwrap();
            backend.flush().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.read_from(0).unwrap(), b"persistent");
    }

    #[test]
    fn truncate_then_append_overwrites_tail() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("owner.log")).unwrap();
        backend.append(b"keep-torn").unwrap();
        backend.truncate(4).unwrap();
        backend.append(b"!").unwrap();
        assert_eq!(backend.read_from(0).unwrap(), b"keep!");
    }

    #[test]
    fn nested_dirs_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("owners").join("deep").join("a.log");
        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
    }
}
