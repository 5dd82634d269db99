//! Change requests, change log entries and apply outcomes.

use crate::entity::{EntityId, EntityKey, EntityKind, EntityPayload};
use crate::error::{CoreError, CoreResult};
use crate::types::ClientId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Entity created.
    Create,
    /// Entity payload replaced.
    Update,
    /// Entity tombstoned.
    Delete,
}

impl Operation {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Returns true if the operation carries a payload.
    #[must_use]
    pub const fn carries_payload(self) -> bool {
        !matches!(self, Operation::Delete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single mutation submitted to an owner's domain.
///
/// This is the one primitive through which both the CRUD layer and the
/// Push Pipeline mutate entities, so both share a single version lineage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRequest {
    /// Entity kind.
    pub kind: EntityKind,
    /// Target entity.
    pub entity_id: EntityId,
    /// Mutation type.
    pub operation: Operation,
    /// New payload; required for create and update, ignored for delete.
    pub payload: Option<EntityPayload>,
    /// Version the submitter last observed (0 for create).
    pub base_version: u64,
    /// Originating client.
    pub origin: ClientId,
}

impl ChangeRequest {
    /// Builds a create request.
    pub fn create(
        entity_id: impl Into<EntityId>,
        payload: impl Into<EntityPayload>,
        origin: impl Into<ClientId>,
    ) -> Self {
        let payload = payload.into();
        Self {
            kind: payload.kind(),
            entity_id: entity_id.into(),
            operation: Operation::Create,
            payload: Some(payload),
            base_version: 0,
            origin: origin.into(),
        }
    }

    /// Builds an update request against `base_version`.
    pub fn update(
        entity_id: impl Into<EntityId>,
        payload: impl Into<EntityPayload>,
        base_version: u64,
        origin: impl Into<ClientId>,
    ) -> Self {
        let payload = payload.into();
        Self {
            kind: payload.kind(),
            entity_id: entity_id.into(),
            operation: Operation::Update,
            payload: Some(payload),
            base_version,
            origin: origin.into(),
        }
    }

    /// Builds a delete request against `base_version`.
    pub fn delete(
        kind: EntityKind,
        entity_id: impl Into<EntityId>,
        base_version: u64,
        origin: impl Into<ClientId>,
    ) -> Self {
        Self {
            kind,
            entity_id: entity_id.into(),
            operation: Operation::Delete,
            payload: None,
            base_version,
            origin: origin.into(),
        }
    }

    /// Returns the store key of the target entity.
    #[must_use]
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.entity_id.clone())
    }

    /// Checks structure and normalizes the payload.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the id or origin is blank, a
    /// create/update has no payload, the payload kind disagrees with
    /// `kind`, or a required payload field is blank.
    pub fn validated(mut self) -> CoreResult<Self> {
        if self.entity_id.is_blank() {
            return Err(CoreError::invalid_change("entity id is required"));
        }
        if self.origin.is_blank() {
            return Err(CoreError::invalid_change("origin client id is required"));
        }
        if self.operation.carries_payload() {
            let payload = self.payload.take().ok_or_else(|| {
                CoreError::invalid_change(format!(
                    "{} of {} {} requires a payload",
                    self.operation, self.kind, self.entity_id
                ))
            })?;
            if payload.kind() != self.kind {
                return Err(CoreError::invalid_change(format!(
                    "payload kind {} does not match entity kind {}",
                    payload.kind(),
                    self.kind
                )));
            }
            self.payload = Some(payload.normalized()?);
        } else {
            self.payload = None;
        }
        Ok(self)
    }
}

/// One immutable record of the change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    /// Per-owner position, gap-free from 1.
    pub sequence: u64,
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity identifier.
    pub entity_id: EntityId,
    /// Mutation type.
    pub operation: Operation,
    /// Payload before the mutation.
    pub before: Option<EntityPayload>,
    /// Payload after the mutation; `None` for deletes.
    pub after: Option<EntityPayload>,
    /// Entity version produced by this entry.
    pub resulting_version: u64,
    /// Originating client.
    pub origin: ClientId,
    /// Append time (ms since epoch).
    pub applied_at: u64,
}

impl ChangeLogEntry {
    /// Returns the store key of the entity this entry touched.
    #[must_use]
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.entity_id.clone())
    }
}

/// Acknowledgement of an accepted change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedChange {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity identifier.
    pub entity_id: EntityId,
    /// Mutation type.
    pub operation: Operation,
    /// New entity version.
    pub version: u64,
    /// Sequence of the appended log entry.
    pub sequence: u64,
}

/// Why a change was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictReason {
    /// `base_version` differs from the stored version.
    VersionMismatch,
    /// A create targeted an id that already exists.
    DuplicateCreate,
    /// An update or delete targeted an id that never existed.
    MissingEntity,
    /// An update or delete targeted a tombstone.
    Deleted,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConflictReason::VersionMismatch => "version mismatch",
            ConflictReason::DuplicateCreate => "duplicate create",
            ConflictReason::MissingEntity => "missing entity",
            ConflictReason::Deleted => "entity deleted",
        };
        f.write_str(s)
    }
}

/// A rejected change together with the state it collided with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity identifier.
    pub entity_id: EntityId,
    /// Operation that was rejected.
    pub operation: Operation,
    /// Payload the client tried to write.
    pub local_payload: Option<EntityPayload>,
    /// Payload currently stored (`None` if absent or deleted).
    pub remote_payload: Option<EntityPayload>,
    /// Version the client based its change on.
    pub local_base_version: u64,
    /// Version currently stored (0 if absent).
    pub remote_current_version: u64,
    /// Classification.
    pub reason: ConflictReason,
    /// Client that submitted the rejected change.
    pub origin: ClientId,
    /// Detection time (ms since epoch).
    pub detected_at: u64,
}

impl ConflictRecord {
    /// Returns the store key of the conflicting entity.
    #[must_use]
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.entity_id.clone())
    }

    /// Returns true if the server side no longer holds a live entity.
    #[must_use]
    pub fn remote_deleted(&self) -> bool {
        matches!(
            self.reason,
            ConflictReason::Deleted | ConflictReason::MissingEntity
        )
    }
}

/// Result of applying one change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The change was accepted and logged.
    Applied(AppliedChange),
    /// The change was rejected; the store is unchanged.
    Conflict(ConflictRecord),
}

impl ApplyOutcome {
    /// Returns the applied change, if any.
    #[must_use]
    pub fn applied(&self) -> Option<&AppliedChange> {
        match self {
            ApplyOutcome::Applied(applied) => Some(applied),
            ApplyOutcome::Conflict(_) => None,
        }
    }

    /// Returns the conflict, if any.
    #[must_use]
    pub fn conflict(&self) -> Option<&ConflictRecord> {
        match self {
            ApplyOutcome::Applied(_) => None,
            ApplyOutcome::Conflict(conflict) => Some(conflict),
        }
    }
}
