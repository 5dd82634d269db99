//! Fault injection for storage.
//!
//! [`FlakyBackends`] hands every owner a backend whose appends fail while
//! a shared [`FaultSwitch`] is armed, optionally leaving half a frame
//! behind as a torn write would.

use crate::fixtures::test_config;
use notesync_core::{BackendFactory, CoreResult, MemoryBackends, OwnerId, Registry};
use notesync_server::SyncServer;
use notesync_storage::{StorageBackend, StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Shared control over injected append failures.
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch {
    remaining: Arc<AtomicU64>,
    injected: Arc<AtomicU64>,
    torn: Arc<AtomicBool>,
}

impl FaultSwitch {
    /// Creates a disarmed switch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `count` appends.
    pub fn fail_next(&self, count: u64) {
        self.remaining.store(count, Ordering::SeqCst);
    }

    /// Fails every append until [`Self::heal`].
    pub fn fail_always(&self) {
        self.remaining.store(u64::MAX, Ordering::SeqCst);
    }

    /// Stops injecting failures.
    pub fn heal(&self) {
        self.remaining.store(0, Ordering::SeqCst);
    }

    /// Makes failing appends write half their bytes first.
    pub fn set_torn(&self, torn: bool) {
        self.torn.store(torn, Ordering::SeqCst);
    }

    /// Number of failures injected so far.
    pub fn injected(&self) -> u64 {
        self.injected.load(Ordering::SeqCst)
    }

    fn trip(&self) -> bool {
        let tripped = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                u64::MAX => Some(u64::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if tripped {
            self.injected.fetch_add(1, Ordering::SeqCst);
        }
        tripped
    }
}

/// A backend that fails appends on demand.
pub struct FlakyBackend {
    inner: Box<dyn StorageBackend>,
    switch: FaultSwitch,
}

impl FlakyBackend {
    /// Wraps `inner`.
    pub fn new(inner: Box<dyn StorageBackend>, switch: FaultSwitch) -> Self {
        Self { inner, switch }
    }
}

impl StorageBackend for FlakyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.switch.trip() {
            if self.switch.torn.load(Ordering::SeqCst) {
                self.inner.append(&data[..data.len() / 2])?;
            }
            return Err(StorageError::WriteRejected("injected append failure".into()));
        }
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }
}

/// Backend factory producing [`FlakyBackend`]s over shared memory buffers.
#[derive(Debug, Clone, Default)]
pub struct FlakyBackends {
    buffers: MemoryBackends,
    switch: FaultSwitch,
}

impl FlakyBackends {
    /// Creates a factory controlled by `switch`.
    pub fn new(switch: FaultSwitch) -> Self {
        Self {
            buffers: MemoryBackends::new(),
            switch,
        }
    }

    /// Underlying buffers, for reopening without faults.
    pub fn buffers(&self) -> &MemoryBackends {
        &self.buffers
    }
}

impl BackendFactory for FlakyBackends {
    fn open_backend(&self, owner: &OwnerId) -> CoreResult<Box<dyn StorageBackend>> {
        let inner = self.buffers.open_backend(owner)?;
        Ok(Box::new(FlakyBackend::new(inner, self.switch.clone())))
    }

    fn known_owners(&self) -> CoreResult<Vec<OwnerId>> {
        self.buffers.known_owners()
    }
}

/// A memory server whose storage fails on demand.
///
/// Returns the server, its fault switch and the raw buffers.
pub fn flaky_server() -> (SyncServer, FaultSwitch, MemoryBackends) {
    let switch = FaultSwitch::new();
    let factory = FlakyBackends::new(switch.clone());
    let buffers = factory.buffers().clone();
    let server = SyncServer::with_registry(test_config(), Registry::new(Box::new(factory), false));
    (server, switch, buffers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_storage::InMemoryBackend;

    #[test]
    fn switch_counts_down() {
        let switch = FaultSwitch::new();
        let mut backend = FlakyBackend::new(Box::new(InMemoryBackend::new()), switch.clone());
        switch.fail_next(2);
        assert!(backend.append(b"a").is_err());
        assert!(backend.append(b"b").is_err());
        assert!(backend.append(b"c").is_ok());
        assert_eq!(switch.injected(), 2);
    }

    #[test]
    fn torn_failure_leaves_partial_bytes() {
        let switch = FaultSwitch::new();
        let mut backend = FlakyBackend::new(Box::new(InMemoryBackend::new()), switch.clone());
        switch.set_torn(true);
        switch.fail_always();
        assert!(backend.append(b"abcd").is_err());
        assert_eq!(backend.size().unwrap(), 2);
        switch.heal();
        assert!(backend.append(b"ef").is_ok());
    }
}
