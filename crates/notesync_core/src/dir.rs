//! Data directory layout.
//!
//! ```text
//! <data_dir>/
//! ├─ LOCK                 # advisory lock, one process at a time
//! └─ owners/
//!    └─ <hex owner>.log   # framed change log of one owner
//! ```

use crate::error::{CoreError, CoreResult};
use crate::types::OwnerId;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const OWNERS_DIR: &str = "owners";
const LOG_EXTENSION: &str = "log";

/// An opened, exclusively locked data directory.
#[derive(Debug)]
pub struct DataDir {
    path: PathBuf,
    _lock_file: File,
}

impl DataDir {
    /// Opens (or creates) a data directory and takes its lock.
    ///
    /// # Errors
    ///
    /// - [`CoreError::DirectoryMissing`] if absent and `create_if_missing` is false
    /// - [`CoreError::DirectoryLocked`] if another process holds the lock
    /// - I/O errors
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if !create_if_missing {
                return Err(CoreError::DirectoryMissing {
                    path: path.display().to_string(),
                });
            }
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(CoreError::DirectoryMissing {
                path: path.display().to_string(),
            });
        }
        fs::create_dir_all(path.join(OWNERS_DIR))?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DirectoryLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding owner logs.
    #[must_use]
    pub fn owners_dir(&self) -> PathBuf {
        self.path.join(OWNERS_DIR)
    }

    /// Log file of `owner`.
    #[must_use]
    pub fn owner_log_path(&self, owner: &OwnerId) -> PathBuf {
        self.owners_dir()
            .join(format!("{}.{LOG_EXTENSION}", owner.to_file_stem()))
    }

    /// Owners that have a log file, sorted.
    ///
    /// Files whose names do not decode to an owner are skipped.
    pub fn list_owners(&self) -> CoreResult<Vec<OwnerId>> {
        let mut owners = Vec::new();
        for dirent in fs::read_dir(self.owners_dir())? {
            let path = dirent?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            if let Some(owner) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(OwnerId::from_file_stem)
            {
                owners.push(owner);
            }
        }
        owners.sort();
        Ok(owners)
    }
}
