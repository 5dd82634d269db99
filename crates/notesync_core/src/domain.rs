//! Per-owner data domain and the apply-change primitive.

use crate::change::{
    AppliedChange, ApplyOutcome, ChangeLogEntry, ChangeRequest, ConflictReason, ConflictRecord,
    Operation,
};
use crate::entity::{Entity, EntityKey, EntityKind};
use crate::error::CoreResult;
use crate::log::ChangeLog;
use crate::store::{state_after, EntityStore, Slot};
use crate::types::{now_millis, OwnerId};
use notesync_storage::{InMemoryBackend, StorageBackend};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Summary of one owner's domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainStats {
    /// Owner.
    pub owner: OwnerId,
    /// Highest change log sequence.
    pub head_sequence: u64,
    /// Live entities per kind.
    pub live: BTreeMap<EntityKind, usize>,
    /// Tombstoned entities.
    pub deleted: usize,
    /// Size of the persisted log in bytes.
    pub log_bytes: u64,
}

/// Entity Store and Change Log of a single owner.
///
/// All mutation goes through [`OwnerDomain::apply`].
#[derive(Debug)]
pub struct OwnerDomain {
    owner: OwnerId,
    store: EntityStore,
    log: ChangeLog,
}

impl OwnerDomain {
    /// Opens a domain over `backend`, rebuilding the store from its log.
    ///
    /// # Errors
    ///
    /// Returns a storage error or [`crate::CoreError::LogCorruption`] if
    /// the log is damaged or breaks an entity's version lineage.
    pub fn open(
        owner: OwnerId,
        backend: Box<dyn StorageBackend>,
        sync_on_append: bool,
    ) -> CoreResult<Self> {
        let log = ChangeLog::open(backend, sync_on_append)?;
        let store = EntityStore::new(owner.clone());
        for entry in log.entries() {
            store.replay(&entry)?;
        }
        info!(owner = %owner, head = log.head(), "opened owner domain");
        Ok(Self { owner, store, log })
    }

    /// Opens an empty, memory-only domain.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches [`Self::open`].
    pub fn in_memory(owner: OwnerId) -> CoreResult<Self> {
        Self::open(owner, Box::new(InMemoryBackend::new()), false)
    }

    /// Owner of this domain.
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Applies one change with optimistic version checking.
    ///
    /// The entity is locked for the duration of the check and the log
    /// append. Checks, in order:
    ///
    /// 1. create on an id that exists (even as a tombstone): duplicate create
    /// 2. update or delete on an id that never existed: missing entity
    /// 3. update or delete on a tombstone: deleted
    /// 4. `base_version` differs from the stored version: version mismatch
    ///
    /// A conflict leaves the store and log untouched.
    ///
    /// # Errors
    ///
    /// Validation errors for a malformed request; storage errors if the
    /// log append fails, in which case nothing was applied.
    pub fn apply(&self, request: ChangeRequest) -> CoreResult<ApplyOutcome> {
        let request = request.validated()?;
        let key = request.key();
        let slot = self.store.slot(&key);
        let outcome = self.apply_locked(&slot, &key, request);
        self.store.release_if_vacant(&key, slot);
        outcome
    }

    fn apply_locked(
        &self,
        slot: &Slot,
        key: &EntityKey,
        request: ChangeRequest,
    ) -> CoreResult<ApplyOutcome> {
        let mut state = slot.lock();

        let current = state.as_ref().map_or(0, |e| e.version);
        let reason = match (request.operation, state.as_ref()) {
            (Operation::Create, Some(_)) => Some(ConflictReason::DuplicateCreate),
            (Operation::Create, None) => None,
            (_, None) => Some(ConflictReason::MissingEntity),
            (_, Some(entity)) if entity.deleted => Some(ConflictReason::Deleted),
            _ => None,
        }
        .or_else(|| (request.base_version != current).then_some(ConflictReason::VersionMismatch));

        let remote_payload = state.as_ref().and_then(|e| e.payload.clone());

        if let Some(reason) = reason {
            warn!(
                owner = %self.owner,
                entity = %key,
                base = request.base_version,
                current,
                %reason,
                "change rejected"
            );
            return Ok(ApplyOutcome::Conflict(ConflictRecord {
                kind: request.kind,
                entity_id: request.entity_id,
                operation: request.operation,
                local_payload: request.payload,
                remote_payload,
                local_base_version: request.base_version,
                remote_current_version: current,
                reason,
                origin: request.origin,
                detected_at: now_millis(),
            }));
        }

        let entry = self.log.append(ChangeLogEntry {
            sequence: 0,
            kind: request.kind,
            entity_id: request.entity_id,
            operation: request.operation,
            before: remote_payload,
            after: request.payload,
            resulting_version: current + 1,
            origin: request.origin,
            applied_at: now_millis(),
        })?;
        *state = Some(state_after(&self.owner, &entry));

        debug!(
            owner = %self.owner,
            entity = %key,
            op = %entry.operation,
            version = entry.resulting_version,
            sequence = entry.sequence,
            "change applied"
        );
        Ok(ApplyOutcome::Applied(AppliedChange {
            kind: entry.kind,
            entity_id: entry.entity_id.clone(),
            operation: entry.operation,
            version: entry.resulting_version,
            sequence: entry.sequence,
        }))
    }

    /// Current state of an entity, tombstones included.
    pub fn get(&self, key: &EntityKey) -> Option<Entity> {
        self.store.get(key)
    }

    /// Current version of an entity (0 if it never existed).
    pub fn version(&self, key: &EntityKey) -> u64 {
        self.store.version(key)
    }

    /// Highest change log sequence.
    pub fn head(&self) -> u64 {
        self.log.head()
    }

    /// Up to `limit` log entries after `sequence`, ascending.
    pub fn entries_after(&self, sequence: u64, limit: usize) -> Vec<Arc<ChangeLogEntry>> {
        self.log.entries_after(sequence, limit)
    }

    /// Live entities, sorted by key.
    pub fn live_entities(&self) -> Vec<Entity> {
        self.store.live()
    }

    /// All entities including tombstones, sorted by key.
    pub fn all_entities(&self) -> Vec<Entity> {
        self.store.all()
    }

    /// Entity Store of this domain.
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Change Log of this domain.
    pub fn log(&self) -> &ChangeLog {
        &self.log
    }

    /// Summary counters.
    pub fn stats(&self) -> DomainStats {
        DomainStats {
            owner: self.owner.clone(),
            head_sequence: self.log.head(),
            live: self.store.live_counts(),
            deleted: self.store.all().iter().filter(|e| e.deleted).count(),
            log_bytes: self.log.byte_len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityPayload, NotePayload, TagPayload};

    fn domain() -> OwnerDomain {
        OwnerDomain::in_memory("alice".into()).unwrap()
    }

    fn note_key(id: &str) -> EntityKey {
        EntityKey::new(EntityKind::Note, id)
    }

    fn applied(outcome: ApplyOutcome) -> AppliedChange {
        match outcome {
            ApplyOutcome::Applied(applied) => applied,
            ApplyOutcome::Conflict(c) => panic!("unexpected conflict: {c:?}"),
        }
    }

    fn conflict(outcome: ApplyOutcome) -> ConflictRecord {
        match outcome {
            ApplyOutcome::Conflict(c) => c,
            ApplyOutcome::Applied(a) => panic!("unexpected apply: {a:?}"),
        }
    }

    #[test]
    fn create_update_delete_lineage() {
        let d = domain();
        let a = applied(d.apply(ChangeRequest::create("n1", NotePayload::new("a", ""), "c1")).unwrap());
        assert_eq!((a.version, a.sequence), (1, 1));
        let b = applied(
            d.apply(ChangeRequest::update("n1", NotePayload::new("b", ""), 1, "c1"))
                .unwrap(),
        );
        assert_eq!((b.version, b.sequence), (2, 2));
        let c = applied(
            d.apply(ChangeRequest::delete(EntityKind::Note, "n1", 2, "c1"))
                .unwrap(),
        );
        assert_eq!(c.version, 3);

        let entries = d.entries_after(0, 10);
        let versions: Vec<u64> = entries.iter().map(|e| e.resulting_version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(entries[1].before.as_ref().unwrap().label(), "a");
        assert!(entries[2].after.is_none());
        assert!(d.get(&note_key("n1")).unwrap().deleted);
    }

    #[test]
    fn stale_update_conflicts_without_mutation() {
        let d = domain();
        d.apply(ChangeRequest::create("n1", NotePayload::new("draft", ""), "A"))
            .unwrap();
        d.apply(ChangeRequest::update("n1", NotePayload::new("final", ""), 1, "A"))
            .unwrap();

        let c = conflict(
            d.apply(ChangeRequest::update("n1", NotePayload::new("mine", ""), 1, "B"))
                .unwrap(),
        );
        assert_eq!(c.reason, ConflictReason::VersionMismatch);
        assert_eq!((c.local_base_version, c.remote_current_version), (1, 2));
        assert_eq!(c.remote_payload.unwrap().label(), "final");
        assert_eq!(c.local_payload.unwrap().label(), "mine");
        assert_eq!(d.head(), 2);
        assert_eq!(d.version(&note_key("n1")), 2);
    }

    #[test]
    fn duplicate_create_is_conflict() {
        let d = domain();
        d.apply(ChangeRequest::create("t1", TagPayload { name: "x".into(), ..TagPayload::default() }, "A"))
            .unwrap();
        let c = conflict(
            d.apply(ChangeRequest::create("t1", TagPayload { name: "y".into(), ..TagPayload::default() }, "B"))
                .unwrap(),
        );
        assert_eq!(c.reason, ConflictReason::DuplicateCreate);
        assert_eq!(d.head(), 1);
    }

    #[test]
    fn rejected_changes_to_unknown_ids_leave_no_slots() {
        let d = domain();
        for i in 0..100 {
            let id = format!("ghost{i}");
            let c = conflict(
                d.apply(ChangeRequest::update(id.as_str(), NotePayload::new("x", ""), 1, "A"))
                    .unwrap(),
            );
            assert_eq!(c.reason, ConflictReason::MissingEntity);
            d.apply(ChangeRequest::delete(EntityKind::Note, id.as_str(), 1, "A"))
                .unwrap();
        }
        let mut stale_create = ChangeRequest::create("late", NotePayload::new("x", ""), "A");
        stale_create.base_version = 4;
        conflict(d.apply(stale_create).unwrap());

        assert_eq!(d.head(), 0);
        assert_eq!(d.store().slot_count(), 0);

        d.apply(ChangeRequest::create("n1", NotePayload::new("a", ""), "A"))
            .unwrap();
        d.apply(ChangeRequest::update("n1", NotePayload::new("b", ""), 5, "A"))
            .unwrap();
        assert_eq!(d.store().slot_count(), 1);
    }

    #[test]
    fn update_of_missing_or_deleted() {
        let d = domain();
        let c = conflict(
            d.apply(ChangeRequest::update("ghost", NotePayload::new("x", ""), 0, "A"))
                .unwrap(),
        );
        assert_eq!(c.reason, ConflictReason::MissingEntity);

        d.apply(ChangeRequest::create("n1", NotePayload::new("a", ""), "A"))
            .unwrap();
        d.apply(ChangeRequest::delete(EntityKind::Note, "n1", 1, "A"))
            .unwrap();
        let c = conflict(
            d.apply(ChangeRequest::update("n1", NotePayload::new("b", ""), 2, "A"))
                .unwrap(),
        );
        assert_eq!(c.reason, ConflictReason::Deleted);
        assert!(c.remote_deleted());
        assert!(c.remote_payload.is_none());
    }

    #[test]
    fn malformed_request_is_error() {
        let d = domain();
        let mut req = ChangeRequest::create("n1", NotePayload::new("a", ""), "A");
        req.payload = None;
        assert!(d.apply(req).unwrap_err().is_validation());
        assert_eq!(d.head(), 0);
    }

    #[test]
    fn reopen_rebuilds_store() {
        let backend = InMemoryBackend::new();
        {
            let d = OwnerDomain::open("alice".into(), Box::new(backend.clone()), true).unwrap();
            d.apply(ChangeRequest::create("n1", NotePayload::new("a", ""), "A"))
                .unwrap();
            d.apply(ChangeRequest::update("n1", NotePayload::new("b", ""), 1, "A"))
                .unwrap();
        }
        let d = OwnerDomain::open("alice".into(), Box::new(backend), true).unwrap();
        let n1 = d.get(&note_key("n1")).unwrap();
        assert_eq!(n1.version, 2);
        assert_eq!(n1.payload, Some(EntityPayload::from(NotePayload::new("b", ""))));
        let stats = d.stats();
        assert_eq!(stats.head_sequence, 2);
        assert_eq!(stats.live[&EntityKind::Note], 1);
    }
}
