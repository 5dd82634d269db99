//! Lazily opened owner domains.

use crate::config::Config;
use crate::dir::DataDir;
use crate::domain::OwnerDomain;
use crate::error::CoreResult;
use crate::types::OwnerId;
use notesync_storage::{FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Supplies the storage backend behind each owner's change log.
pub trait BackendFactory: Send + Sync {
    /// Opens (or creates) the backend of `owner`.
    fn open_backend(&self, owner: &OwnerId) -> CoreResult<Box<dyn StorageBackend>>;

    /// Owners that already have persisted data.
    fn known_owners(&self) -> CoreResult<Vec<OwnerId>>;
}

/// Memory-only backends that survive a [`Registry`] being dropped.
///
/// Clones share the same buffers, so a test can reopen a registry over
/// the same bytes to simulate a restart.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackends {
    buffers: Arc<Mutex<HashMap<OwnerId, InMemoryBackend>>>,
}

impl MemoryBackends {
    /// Creates an empty set of buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes of an owner's log.
    pub fn bytes(&self, owner: &OwnerId) -> Option<Vec<u8>> {
        self.buffers.lock().get(owner).map(InMemoryBackend::data)
    }
}

impl BackendFactory for MemoryBackends {
    fn open_backend(&self, owner: &OwnerId) -> CoreResult<Box<dyn StorageBackend>> {
        let backend = self.buffers.lock().entry(owner.clone()).or_default().clone();
        Ok(Box::new(backend))
    }

    fn known_owners(&self) -> CoreResult<Vec<OwnerId>> {
        let mut owners: Vec<OwnerId> = self.buffers.lock().keys().cloned().collect();
        owners.sort();
        Ok(owners)
    }
}

impl BackendFactory for DataDir {
    fn open_backend(&self, owner: &OwnerId) -> CoreResult<Box<dyn StorageBackend>> {
        Ok(Box::new(FileBackend::open_with_create_dirs(&self.owner_log_path(owner))?))
    }

    fn known_owners(&self) -> CoreResult<Vec<OwnerId>> {
        self.list_owners()
    }
}

/// Maps owners to their domains, opening each on first use.
pub struct Registry {
    factory: Box<dyn BackendFactory>,
    sync_on_append: bool,
    domains: RwLock<HashMap<OwnerId, Arc<OwnerDomain>>>,
}

impl Registry {
    /// Creates a registry over an arbitrary backend factory.
    pub fn new(factory: Box<dyn BackendFactory>, sync_on_append: bool) -> Self {
        Self {
            factory,
            sync_on_append,
            domains: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a memory-only registry.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackends::new()), false)
    }

    /// Opens a registry over a data directory.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`DataDir::open`].
    pub fn open(path: &Path, config: &Config) -> CoreResult<Self> {
        let dir = DataDir::open(path, config.create_if_missing)?;
        Ok(Self::new(Box::new(dir), config.sync_on_append))
    }

    /// Returns the domain of `owner`, opening it if needed.
    ///
    /// # Errors
    ///
    /// Returns backend or replay errors from the first open.
    pub fn domain(&self, owner: &OwnerId) -> CoreResult<Arc<OwnerDomain>> {
        if let Some(domain) = self.domains.read().get(owner) {
            return Ok(Arc::clone(domain));
        }
        let mut domains = self.domains.write();
        if let Some(domain) = domains.get(owner) {
            return Ok(Arc::clone(domain));
        }
        let backend = self.factory.open_backend(owner)?;
        let domain = Arc::new(OwnerDomain::open(
            owner.clone(),
            backend,
            self.sync_on_append,
        )?);
        domains.insert(owner.clone(), Arc::clone(&domain));
        Ok(domain)
    }

    /// Every owner with persisted data or an open domain, sorted.
    ///
    /// # Errors
    ///
    /// Returns the factory's listing error.
    pub fn owners(&self) -> CoreResult<Vec<OwnerId>> {
        let mut owners = self.factory.known_owners()?;
        owners.extend(self.domains.read().keys().cloned());
        owners.sort();
        owners.dedup();
        Ok(owners)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("open_domains", &self.domains.read().len())
            .field("sync_on_append", &self.sync_on_append)
            .finish_non_exhaustive()
    }
}
