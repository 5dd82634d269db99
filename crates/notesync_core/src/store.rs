//! Entity Store: current state and version counters of one owner.

use crate::change::{ChangeLogEntry, Operation};
use crate::entity::{Entity, EntityKey, EntityKind};
use crate::error::{CoreError, CoreResult};
use crate::types::OwnerId;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Lock-protected state of a single entity; `None` until first created.
pub(crate) type Slot = Arc<Mutex<Option<Entity>>>;

/// Authoritative entity state for one owner.
///
/// Each entity lives behind its own mutex. Writers hold that mutex for
/// the version check and the log append, so writes to different entities
/// never wait on each other.
#[derive(Debug)]
pub struct EntityStore {
    owner: OwnerId,
    slots: RwLock<HashMap<EntityKey, Slot>>,
}

impl EntityStore {
    /// Creates an empty store.
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Owner of every entity in this store.
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Returns the slot for `key`, creating an empty one if needed.
    pub(crate) fn slot(&self, key: &EntityKey) -> Slot {
        if let Some(slot) = self.slots.read().get(key) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write();
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    /// Drops the slot for `key` if it holds no entity and `slot` is the
    /// only handle outside the map.
    pub(crate) fn release_if_vacant(&self, key: &EntityKey, slot: Slot) {
        let mut slots = self.slots.write();
        if Arc::strong_count(&slot) == 2 && slot.lock().is_none() {
            slots.remove(key);
        }
    }

    /// Number of allocated slots, vacant ones included.
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.read().len()
    }

    /// Returns the current state of an entity, tombstones included.
    pub fn get(&self, key: &EntityKey) -> Option<Entity> {
        let slot = self.slots.read().get(key).cloned()?;
        let state = slot.lock().clone();
        state
    }

    /// Current version of an entity (0 if it never existed).
    pub fn version(&self, key: &EntityKey) -> u64 {
        self.get(key).map_or(0, |e| e.version)
    }

    /// Every stored entity, tombstones included, sorted by key.
    pub fn all(&self) -> Vec<Entity> {
        let slots: Vec<Slot> = self.slots.read().values().cloned().collect();
        let mut entities: Vec<Entity> = slots.iter().filter_map(|s| s.lock().clone()).collect();
        entities.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.id.cmp(&b.id)));
        entities
    }

    /// Every live entity, sorted by key.
    pub fn live(&self) -> Vec<Entity> {
        self.all().into_iter().filter(Entity::is_live).collect()
    }

    /// Live entity counts per kind; every kind is present.
    pub fn live_counts(&self) -> BTreeMap<EntityKind, usize> {
        let mut counts: BTreeMap<EntityKind, usize> =
            EntityKind::ALL.iter().map(|k| (*k, 0)).collect();
        for entity in self.live() {
            *counts.entry(entity.kind).or_default() += 1;
        }
        counts
    }

    /// Rebuilds state from a replayed log entry.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LogCorruption`] if the entry breaks the
    /// entity's 1, 2, 3, ... version lineage.
    pub fn replay(&self, entry: &ChangeLogEntry) -> CoreResult<()> {
        let slot = self.slot(&entry.key());
        let mut state = slot.lock();
        let current = state.as_ref().map_or(0, |e| e.version);
        if entry.resulting_version != current + 1 {
            return Err(CoreError::log_corruption(
                0,
                format!(
                    "sequence {}: {} jumps from version {current} to {}",
                    entry.sequence,
                    entry.key(),
                    entry.resulting_version
                ),
            ));
        }
        if entry.operation == Operation::Create && current != 0 {
            return Err(CoreError::log_corruption(
                0,
                format!("sequence {}: {} created twice", entry.sequence, entry.key()),
            ));
        }
        *state = Some(state_after(&self.owner, entry));
        Ok(())
    }
}

/// Entity state produced by `entry`.
pub(crate) fn state_after(owner: &OwnerId, entry: &ChangeLogEntry) -> Entity {
    Entity {
        id: entry.entity_id.clone(),
        owner_id: owner.clone(),
        kind: entry.kind,
        payload: entry.after.clone(),
        version: entry.resulting_version,
        updated_at: entry.applied_at,
        deleted: entry.operation == Operation::Delete,
        last_sequence: entry.sequence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::NotePayload;

    fn entry(seq: u64, id: &str, op: Operation, version: u64) -> ChangeLogEntry {
        ChangeLogEntry {
            sequence: seq,
            kind: EntityKind::Note,
            entity_id: id.into(),
            operation: op,
            before: None,
            after: (op != Operation::Delete).then(|| NotePayload::new(id, "").into()),
            resulting_version: version,
            origin: "c1".into(),
            applied_at: seq * 10,
        }
    }

    #[test]
    fn replay_builds_state() {
        let store = EntityStore::new("alice".into());
        store.replay(&entry(1, "n1", Operation::Create, 1)).unwrap();
        store.replay(&entry(2, "n1", Operation::Update, 2)).unwrap();
        store.replay(&entry(3, "n2", Operation::Create, 1)).unwrap();
        store.replay(&entry(4, "n2", Operation::Delete, 2)).unwrap();

        let n1 = store.get(&EntityKey::new(EntityKind::Note, "n1")).unwrap();
        assert_eq!((n1.version, n1.last_sequence, n1.updated_at), (2, 2, 20));
        let n2 = store.get(&EntityKey::new(EntityKind::Note, "n2")).unwrap();
        assert!(n2.deleted);
        assert!(n2.payload.is_none());

        assert_eq!(store.all().len(), 2);
        assert_eq!(store.live().len(), 1);
        assert_eq!(store.live_counts()[&EntityKind::Note], 1);
        assert_eq!(store.live_counts()[&EntityKind::Tag], 0);
    }

    #[test]
    fn replay_rejects_version_jump() {
        let store = EntityStore::new("alice".into());
        store.replay(&entry(1, "n1", Operation::Create, 1)).unwrap();
        let err = store
            .replay(&entry(2, "n1", Operation::Update, 3))
            .unwrap_err();
        assert!(matches!(err, CoreError::LogCorruption { .. }));
    }

    #[test]
    fn unknown_entity_has_version_zero() {
        let store = EntityStore::new("alice".into());
        let key = EntityKey::new(EntityKind::Tag, "t1");
        assert_eq!(store.version(&key), 0);
        let _ = store.slot(&key);
        assert!(store.get(&key).is_none());
        assert!(store.all().is_empty());
    }
}
