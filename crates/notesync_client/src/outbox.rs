//! Pending local changes awaiting push.

use notesync_core::{ChangeRequest, ConflictRecord, EntityKey, Operation};
use std::collections::{BTreeMap, HashSet, VecDeque};

/// A local change waiting for the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    /// Local operation id, increasing in commit order.
    pub op_id: u64,
    /// The change as it will be pushed.
    pub request: ChangeRequest,
}

/// A change the server answered with a conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParkedChange {
    /// The rejected change.
    pub change: PendingChange,
    /// What the server reported.
    pub conflict: ConflictRecord,
}

/// Commit-ordered queue of local changes.
///
/// A change that conflicts is parked, and later changes to the same
/// entity are held back until the conflict is resolved.
#[derive(Debug, Default)]
pub struct Outbox {
    next_op_id: u64,
    pending: VecDeque<PendingChange>,
    parked: BTreeMap<EntityKey, ParkedChange>,
}

impl Outbox {
    /// Creates an empty outbox.
    pub fn new() -> Self {
        Self {
            next_op_id: 1,
            ..Self::default()
        }
    }

    /// Queues a change and returns its op id.
    pub fn enqueue(&mut self, request: ChangeRequest) -> u64 {
        let op_id = self.next_op_id.max(1);
        self.next_op_id = op_id + 1;
        self.pending.push_back(PendingChange { op_id, request });
        op_id
    }

    /// Queued (not parked) changes.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if nothing is queued or parked.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.parked.is_empty()
    }

    /// Number of parked conflicts.
    pub fn parked_len(&self) -> usize {
        self.parked.len()
    }

    /// Changes to `key` not yet accepted by the server, parked one included.
    pub fn outstanding_for(&self, key: &EntityKey) -> usize {
        let queued = self.pending.iter().filter(|c| &c.request.key() == key).count();
        queued + usize::from(self.parked.contains_key(key))
    }

    /// Next batch to push.
    ///
    /// Takes at most one change per entity and skips entities with a
    /// parked conflict, so outcomes map back to changes by key.
    pub fn next_batch(&self, limit: usize) -> Vec<PendingChange> {
        let mut seen = HashSet::new();
        let mut batch = Vec::new();
        for change in &self.pending {
            if batch.len() >= limit {
                break;
            }
            let key = change.request.key();
            if self.parked.contains_key(&key) || !seen.insert(key) {
                continue;
            }
            batch.push(change.clone());
        }
        batch
    }

    /// Removes an accepted change.
    pub fn acknowledge(&mut self, op_id: u64) -> Option<PendingChange> {
        let index = self.pending.iter().position(|c| c.op_id == op_id)?;
        self.pending.remove(index)
    }

    /// Moves a change into the parked set.
    pub fn park(&mut self, op_id: u64, conflict: ConflictRecord) -> bool {
        let Some(change) = self.acknowledge(op_id) else {
            return false;
        };
        self.parked
            .insert(change.request.key(), ParkedChange { change, conflict });
        true
    }

    /// Parked change of `key`.
    pub fn parked(&self, key: &EntityKey) -> Option<&ParkedChange> {
        self.parked.get(key)
    }

    /// Conflicts of all parked changes, by key.
    pub fn conflicts(&self) -> Vec<ConflictRecord> {
        self.parked.values().map(|p| p.conflict.clone()).collect()
    }

    /// Removes and returns the parked change of `key`.
    pub fn take_parked(&mut self, key: &EntityKey) -> Option<ParkedChange> {
        self.parked.remove(key)
    }

    /// Re-bases queued updates and deletes of `key` on `version`.
    pub fn rebase(&mut self, key: &EntityKey, version: u64) {
        let mut next = version;
        for change in self.pending.iter_mut().filter(|c| &c.request.key() == key) {
            if change.request.operation != Operation::Create {
                change.request.base_version = next;
            }
            next += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_core::{ConflictReason, EntityKind, NotePayload};

    fn conflict_for(request: &ChangeRequest) -> ConflictRecord {
        ConflictRecord {
            kind: request.kind,
            entity_id: request.entity_id.clone(),
            operation: request.operation,
            local_payload: request.payload.clone(),
            remote_payload: None,
            local_base_version: request.base_version,
            remote_current_version: 5,
            reason: ConflictReason::VersionMismatch,
            origin: request.origin.clone(),
            detected_at: 0,
        }
    }

    #[test]
    fn batches_take_one_change_per_entity() {
        let mut outbox = Outbox::new();
        outbox.enqueue(ChangeRequest::create("n1", NotePayload::new("a", ""), "A"));
        outbox.enqueue(ChangeRequest::update("n1", NotePayload::new("b", ""), 1, "A"));
        outbox.enqueue(ChangeRequest::create("n2", NotePayload::new("c", ""), "A"));

        let batch = outbox.next_batch(10);
        let ids: Vec<u64> = batch.iter().map(|c| c.op_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(outbox.next_batch(1).len(), 1);
    }

    #[test]
    fn parked_entities_are_held_back() {
        let mut outbox = Outbox::new();
        let request = ChangeRequest::update("n1", NotePayload::new("b", ""), 1, "A");
        let op = outbox.enqueue(request.clone());
        outbox.enqueue(ChangeRequest::update("n1", NotePayload::new("c", ""), 2, "A"));
        assert!(outbox.park(op, conflict_for(&request)));

        let key = EntityKey::new(EntityKind::Note, "n1");
        assert!(outbox.next_batch(10).is_empty());
        assert_eq!(outbox.outstanding_for(&key), 2);
        assert_eq!(outbox.conflicts().len(), 1);

        outbox.take_parked(&key);
        outbox.rebase(&key, 5);
        let batch = outbox.next_batch(10);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].request.base_version, 5);
    }

    #[test]
    fn acknowledge_removes_change() {
        let mut outbox = Outbox::new();
        let op = outbox.enqueue(ChangeRequest::create("n1", NotePayload::new("a", ""), "A"));
        assert!(outbox.acknowledge(op).is_some());
        assert!(outbox.acknowledge(op).is_none());
        assert!(outbox.is_empty());
    }
}
