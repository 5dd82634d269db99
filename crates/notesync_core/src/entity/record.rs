//! Stored entity record.

use crate::entity::{EntityId, EntityKey, EntityKind, EntityPayload};
use crate::types::OwnerId;
use serde::{Deserialize, Serialize};

/// Current state of one entity in the Entity Store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Entity identifier.
    pub id: EntityId,
    /// Owning user.
    pub owner_id: OwnerId,
    /// Entity kind.
    pub kind: EntityKind,
    /// Current payload; `None` once deleted.
    pub payload: Option<EntityPayload>,
    /// Version, starting at 1 on creation.
    pub version: u64,
    /// Time of the last accepted mutation (ms since epoch).
    pub updated_at: u64,
    /// Tombstone flag.
    pub deleted: bool,
    /// Sequence of the change log entry that produced this state.
    pub last_sequence: u64,
}

impl Entity {
    /// Returns the store key.
    #[must_use]
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.id.clone())
    }

    /// Returns true if the entity is live (not a tombstone).
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.deleted
    }
}
