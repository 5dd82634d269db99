//! Last server-known state of entities.

use notesync_core::{
    AppliedChange, ChangeLogEntry, ConflictRecord, EntityId, EntityKey, EntityKind,
    EntityPayload, Operation,
};
use parking_lot::RwLock;
use std::collections::HashMap;

/// An entity as the server last reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntity {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity identifier.
    pub id: EntityId,
    /// Server version.
    pub version: u64,
    /// Payload; `None` for tombstones.
    pub payload: Option<EntityPayload>,
    /// True once the server reported a delete.
    pub deleted: bool,
}

impl CachedEntity {
    /// Store key of this entity.
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.id.clone())
    }
}

/// Read-through cache keyed by `(kind, id)`.
///
/// Pull entries and push acknowledgements overwrite entries unless they
/// carry an older version than the one cached.
#[derive(Debug, Default)]
pub struct EntityCache {
    entries: RwLock<HashMap<EntityKey, CachedEntity>>,
}

impl EntityCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached entity, tombstones included.
    pub fn get(&self, key: &EntityKey) -> Option<CachedEntity> {
        self.entries.read().get(key).cloned()
    }

    /// Cached version, 0 when unknown.
    pub fn version(&self, key: &EntityKey) -> u64 {
        self.entries.read().get(key).map_or(0, |e| e.version)
    }

    /// Live entities of `kind`, ordered by id.
    pub fn live(&self, kind: EntityKind) -> Vec<CachedEntity> {
        let mut live: Vec<CachedEntity> = self
            .entries
            .read()
            .values()
            .filter(|e| e.kind == kind && !e.deleted)
            .cloned()
            .collect();
        live.sort_by(|a, b| a.id.cmp(&b.id));
        live
    }

    /// Number of cached entries, tombstones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drops everything; used before a full resync.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn put(&self, entity: CachedEntity) {
        let mut entries = self.entries.write();
        match entries.get(&entity.key()) {
            Some(existing) if existing.version > entity.version => {}
            _ => {
                entries.insert(entity.key(), entity);
            }
        }
    }

    /// Applies a pulled change log entry.
    pub fn apply_entry(&self, entry: &ChangeLogEntry) {
        self.put(CachedEntity {
            kind: entry.kind,
            id: entry.entity_id.clone(),
            version: entry.resulting_version,
            payload: entry.after.clone(),
            deleted: entry.operation == Operation::Delete,
        });
    }

    /// Records a change the server accepted, with the payload that was sent.
    pub fn apply_pushed(&self, applied: &AppliedChange, payload: Option<EntityPayload>) {
        let deleted = applied.operation == Operation::Delete;
        self.put(CachedEntity {
            kind: applied.kind,
            id: applied.entity_id.clone(),
            version: applied.version,
            payload: if deleted { None } else { payload },
            deleted,
        });
    }

    /// Records the server side of a conflict.
    pub fn apply_conflict(&self, conflict: &ConflictRecord) {
        if conflict.remote_current_version == 0 {
            self.entries.write().remove(&conflict.key());
            return;
        }
        self.put(CachedEntity {
            kind: conflict.kind,
            id: conflict.entity_id.clone(),
            version: conflict.remote_current_version,
            payload: conflict.remote_payload.clone(),
            deleted: conflict.remote_deleted(),
        });
    }
}
