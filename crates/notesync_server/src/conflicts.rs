//! Deferred conflict inbox.

use notesync_core::{ConflictRecord, EntityKey, OwnerId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Conflicts awaiting a resolution choice, per owner and entity.
///
/// Only the newest conflict of an entity is kept.
#[derive(Debug, Default)]
pub struct ConflictInbox {
    records: RwLock<HashMap<OwnerId, BTreeMap<EntityKey, ConflictRecord>>>,
}

impl ConflictInbox {
    /// Creates an empty inbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `conflict`, replacing any older one for the same entity.
    pub fn record(&self, owner: &OwnerId, conflict: ConflictRecord) {
        self.records
            .write()
            .entry(owner.clone())
            .or_default()
            .insert(conflict.key(), conflict);
    }

    /// Conflicts of `owner`, oldest first.
    pub fn list(&self, owner: &OwnerId) -> Vec<ConflictRecord> {
        let mut conflicts: Vec<ConflictRecord> = self
            .records
            .read()
            .get(owner)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        conflicts.sort_by(|a, b| {
            a.detected_at
                .cmp(&b.detected_at)
                .then_with(|| a.key().cmp(&b.key()))
        });
        conflicts
    }

    /// The conflict recorded for `key`.
    pub fn get(&self, owner: &OwnerId, key: &EntityKey) -> Option<ConflictRecord> {
        self.records.read().get(owner)?.get(key).cloned()
    }

    /// Removes and returns the conflict recorded for `key`.
    pub fn take(&self, owner: &OwnerId, key: &EntityKey) -> Option<ConflictRecord> {
        self.records.write().get_mut(owner)?.remove(key)
    }

    /// Puts back a conflict taken for resolution, unless a newer one for
    /// the same entity was recorded in the meantime.
    pub fn restore(&self, owner: &OwnerId, conflict: ConflictRecord) {
        self.records
            .write()
            .entry(owner.clone())
            .or_default()
            .entry(conflict.key())
            .or_insert(conflict);
    }

    /// Number of conflicts of `owner`.
    pub fn count(&self, owner: &OwnerId) -> usize {
        self.records.read().get(owner).map_or(0, BTreeMap::len)
    }
}
