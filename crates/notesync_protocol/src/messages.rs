//! Protocol messages for sync.

use crate::error::{ProtocolError, ProtocolResult};
use notesync_core::{
    AppliedChange, ChangeLogEntry, ChangeRequest, ClientId, ConflictRecord, Entity, EntityId,
    EntityKind, EntityPayload, Operation, OwnerId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One change as submitted by a client.
///
/// Fields are optional on the wire so a missing one can be reported as a
/// validation error instead of a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PushEntry {
    /// Entity kind.
    pub entity_kind: Option<EntityKind>,
    /// Entity identifier.
    pub entity_id: Option<EntityId>,
    /// Mutation type.
    pub operation: Option<Operation>,
    /// New payload (create and update).
    pub payload: Option<EntityPayload>,
    /// Version the client based the change on; required for update and delete.
    pub base_version: Option<u64>,
    /// Originating client; defaults to the batch's client.
    pub origin_client_id: Option<ClientId>,
}

impl PushEntry {
    /// Wraps a core change request.
    #[must_use]
    pub fn from_request(request: ChangeRequest) -> Self {
        Self {
            entity_kind: Some(request.kind),
            entity_id: Some(request.entity_id),
            operation: Some(request.operation),
            payload: request.payload,
            base_version: Some(request.base_version),
            origin_client_id: Some(request.origin),
        }
    }

    /// Converts to a core change request.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingField`] naming the first absent
    /// required field.
    pub fn to_request(&self, index: usize, batch_client: &ClientId) -> ProtocolResult<ChangeRequest> {
        let missing = |field| ProtocolError::MissingField { index, field };
        let kind = self.entity_kind.ok_or_else(|| missing("entityKind"))?;
        let entity_id = self.entity_id.clone().ok_or_else(|| missing("entityId"))?;
        let operation = self.operation.ok_or_else(|| missing("operation"))?;
        let base_version = match (operation, self.base_version) {
            (Operation::Create, base) => base.unwrap_or(0),
            (_, Some(base)) => base,
            (_, None) => return Err(missing("baseVersion")),
        };
        if operation.carries_payload() && self.payload.is_none() {
            return Err(missing("payload"));
        }
        Ok(ChangeRequest {
            kind,
            entity_id,
            operation,
            payload: self.payload.clone(),
            base_version,
            origin: self
                .origin_client_id
                .clone()
                .unwrap_or_else(|| batch_client.clone()),
        })
    }
}

impl From<ChangeRequest> for PushEntry {
    fn from(request: ChangeRequest) -> Self {
        Self::from_request(request)
    }
}

/// A batch of client changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// Submitting client.
    pub client_id: ClientId,
    /// Changes, applied in order.
    pub entries: Vec<PushEntry>,
}

impl PushRequest {
    /// Creates a push request.
    pub fn new(client_id: impl Into<ClientId>, entries: Vec<PushEntry>) -> Self {
        Self {
            client_id: client_id.into(),
            entries,
        }
    }
}

/// A batch entry that hit a storage failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedEntry {
    /// Position in the batch.
    pub index: usize,
    /// Entity kind.
    pub entity_kind: EntityKind,
    /// Entity identifier.
    pub entity_id: EntityId,
    /// Error description.
    pub error: String,
    /// True if resubmitting unchanged may succeed.
    pub retryable: bool,
}

/// Per-entry outcome of a push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// Accepted changes with their new versions.
    pub applied: Vec<AppliedChange>,
    /// Rejected changes.
    pub conflicts: Vec<ConflictRecord>,
    /// Changes that failed for storage reasons.
    pub failed: Vec<FailedEntry>,
}

impl PushResponse {
    /// Number of entries accounted for.
    #[must_use]
    pub fn total(&self) -> usize {
        self.applied.len() + self.conflicts.len() + self.failed.len()
    }

    /// True if every entry was applied.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.failed.is_empty()
    }
}

/// Request for changes since a token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PullRequest {
    /// Token from the previous pull; `None` for a cold start.
    pub token: Option<String>,
    /// Maximum entries to return.
    pub page_size: Option<usize>,
    /// Restrict entries to these kinds.
    pub entity_kinds: Option<Vec<EntityKind>>,
    /// Pulling client, recorded for sync status.
    pub client_id: Option<ClientId>,
}

impl PullRequest {
    /// Pull with an optional token.
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            ..Self::default()
        }
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Restricts the kinds returned.
    #[must_use]
    pub fn with_kinds(mut self, kinds: Vec<EntityKind>) -> Self {
        self.entity_kinds = Some(kinds);
        self
    }

    /// Sets the pulling client.
    #[must_use]
    pub fn with_client(mut self, client_id: impl Into<ClientId>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

/// Changes after a token, plus the token to use next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Entries in ascending sequence order.
    pub entries: Vec<ChangeLogEntry>,
    /// Token covering exactly the returned entries.
    pub next_token: String,
    /// More entries are waiting.
    pub has_more: bool,
    /// The supplied token was rejected and this is a full snapshot.
    pub resync_required: bool,
    /// Highest sequence of the owner's log at read time.
    pub head_sequence: u64,
}

/// How to settle a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolveStrategy {
    /// Overwrite the server state with the local payload.
    TakeLocal,
    /// Discard the local change.
    TakeRemote,
    /// Keep the server entity and store the local payload as a new one.
    KeepBoth,
}

impl fmt::Display for ResolveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResolveStrategy::TakeLocal => "takeLocal",
            ResolveStrategy::TakeRemote => "takeRemote",
            ResolveStrategy::KeepBoth => "keepBoth",
        })
    }
}

impl std::str::FromStr for ResolveStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "takelocal" | "local" => Ok(ResolveStrategy::TakeLocal),
            "takeremote" | "remote" | "server" => Ok(ResolveStrategy::TakeRemote),
            "keepboth" | "both" => Ok(ResolveStrategy::KeepBoth),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

/// Request to resolve a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    /// Resolving client.
    pub client_id: ClientId,
    /// Entity kind.
    pub entity_kind: EntityKind,
    /// Entity identifier.
    pub entity_id: EntityId,
    /// Chosen strategy.
    pub strategy: ResolveStrategy,
    /// Local payload; overrides the one kept with a deferred conflict.
    #[serde(default)]
    pub local_payload: Option<EntityPayload>,
}

/// Result of a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    /// Strategy actually applied (`takeLocal` against a deleted entity
    /// becomes `keepBoth`).
    pub strategy: ResolveStrategy,
    /// The change pushed to settle the conflict, if any.
    pub applied: Option<AppliedChange>,
}

impl ResolveResponse {
    /// Id of the entity created by `keepBoth`.
    #[must_use]
    pub fn created_id(&self) -> Option<&EntityId> {
        match (self.strategy, &self.applied) {
            (ResolveStrategy::KeepBoth, Some(applied)) => Some(&applied.entity_id),
            _ => None,
        }
    }
}

/// Request for sync status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    /// Asking client.
    pub client_id: ClientId,
}

/// Sync status of one owner as seen by one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Owner.
    pub owner: OwnerId,
    /// Highest change log sequence.
    pub head_sequence: u64,
    /// Last successful pull by this client (ms since epoch).
    pub last_synced_at: Option<u64>,
    /// Deferred conflicts awaiting resolution.
    pub conflict_count: usize,
    /// Live entities per kind.
    pub entity_counts: BTreeMap<EntityKind, usize>,
}

/// Every live entity grouped by kind, plus a fresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSyncResponse {
    /// Live entities per kind.
    pub entities: BTreeMap<EntityKind, Vec<Entity>>,
    /// Token positioned at the snapshot's head.
    pub token: String,
    /// Head sequence of the snapshot.
    pub head_sequence: u64,
}

/// Error reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// HTTP-like status code (4xx client, 5xx server).
    pub code: u16,
    /// Description.
    pub message: String,
}

/// A sync protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum SyncMessage {
    /// Push request.
    PushRequest(PushRequest),
    /// Push response.
    PushResponse(PushResponse),
    /// Pull request.
    PullRequest(PullRequest),
    /// Pull response.
    PullResponse(PullResponse),
    /// Conflict resolution request.
    ResolveRequest(ResolveRequest),
    /// Conflict resolution response.
    ResolveResponse(ResolveResponse),
    /// List deferred conflicts.
    ListConflictsRequest,
    /// Deferred conflicts.
    ListConflictsResponse(Vec<ConflictRecord>),
    /// Status request.
    StatusRequest(StatusRequest),
    /// Status response.
    StatusResponse(SyncStatus),
    /// Full snapshot request.
    FullSyncRequest,
    /// Full snapshot response.
    FullSyncResponse(FullSyncResponse),
    /// Error.
    Error(ErrorResponse),
}

impl SyncMessage {
    /// Returns the message type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            SyncMessage::PushRequest(_) => "pushRequest",
            SyncMessage::PushResponse(_) => "pushResponse",
            SyncMessage::PullRequest(_) => "pullRequest",
            SyncMessage::PullResponse(_) => "pullResponse",
            SyncMessage::ResolveRequest(_) => "resolveRequest",
            SyncMessage::ResolveResponse(_) => "resolveResponse",
            SyncMessage::ListConflictsRequest => "listConflictsRequest",
            SyncMessage::ListConflictsResponse(_) => "listConflictsResponse",
            SyncMessage::StatusRequest(_) => "statusRequest",
            SyncMessage::StatusResponse(_) => "statusResponse",
            SyncMessage::FullSyncRequest => "fullSyncRequest",
            SyncMessage::FullSyncResponse(_) => "fullSyncResponse",
            SyncMessage::Error(_) => "error",
        }
    }

    /// Encodes to CBOR.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(bytes)
    }

    /// Decodes from CBOR.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Decode`] for malformed bytes.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_core::NotePayload;

    fn batch_client() -> ClientId {
        ClientId::new("laptop")
    }

    #[test]
    fn entry_converts_with_batch_origin() {
        let entry = PushEntry {
            entity_kind: Some(EntityKind::Note),
            entity_id: Some("n1".into()),
            operation: Some(Operation::Create),
            payload: Some(NotePayload::new("draft", "").into()),
            ..PushEntry::default()
        };
        let request = entry.to_request(0, &batch_client()).unwrap();
        assert_eq!(request.base_version, 0);
        assert_eq!(request.origin, batch_client());
    }

    #[test]
    fn entry_missing_fields() {
        let err = PushEntry::default().to_request(3, &batch_client()).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::MissingField {
                index: 3,
                field: "entityKind"
            }
        );

        let update_without_base = PushEntry {
            entity_kind: Some(EntityKind::Note),
            entity_id: Some("n1".into()),
            operation: Some(Operation::Update),
            payload: Some(NotePayload::new("x", "").into()),
            ..PushEntry::default()
        };
        let err = update_without_base.to_request(0, &batch_client()).unwrap_err();
        assert!(err.to_string().contains("baseVersion"));

        let create_without_payload = PushEntry {
            entity_kind: Some(EntityKind::Note),
            entity_id: Some("n1".into()),
            operation: Some(Operation::Create),
            ..PushEntry::default()
        };
        let err = create_without_payload
            .to_request(0, &batch_client())
            .unwrap_err();
        assert!(err.to_string().contains("payload"));
    }

    #[test]
    fn delete_needs_no_payload() {
        let entry = PushEntry::from(ChangeRequest::delete(EntityKind::Tag, "t1", 4, "phone"));
        let request = entry.to_request(0, &batch_client()).unwrap();
        assert_eq!(request.base_version, 4);
        assert_eq!(request.origin, ClientId::new("phone"));
    }

    #[test]
    fn message_cbor_roundtrip() {
        let msg = SyncMessage::PushRequest(PushRequest::new(
            "laptop",
            vec![ChangeRequest::create("n1", NotePayload::new("draft", "body"), "laptop").into()],
        ));
        let decoded = SyncMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.type_name(), "pushRequest");

        let unit = SyncMessage::ListConflictsRequest;
        assert_eq!(SyncMessage::decode(&unit.encode().unwrap()).unwrap(), unit);
    }

    #[test]
    fn decode_garbage_fails() {
        assert!(matches!(
            SyncMessage::decode(&[0xFF, 0x00, 0x13]),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!("keep-both".parse(), Ok(ResolveStrategy::KeepBoth));
        assert_eq!("takeLocal".parse(), Ok(ResolveStrategy::TakeLocal));
        assert_eq!("remote".parse(), Ok(ResolveStrategy::TakeRemote));
        assert!("merge".parse::<ResolveStrategy>().is_err());
    }
}
