//! Request handlers for sync endpoints.

use crate::config::ServerConfig;
use crate::conflicts::ConflictInbox;
use crate::error::{ServerError, ServerResult};
use crate::{pull, push, resolver};
use notesync_core::{
    now_millis, ClientId, ConflictReason, ConflictRecord, Entity, EntityKey, EntityKind,
    EntityPayload, Operation, OwnerDomain, OwnerId, Registry,
};
use notesync_protocol::{
    ErrorResponse, FullSyncResponse, PullRequest, PullResponse, PushRequest, PushResponse,
    ResolveRequest, ResolveResponse, StatusRequest, SyncMessage, SyncStatus, SyncToken,
    TokenCodec,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared state behind every handler.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Owner domains.
    pub registry: Registry,
    /// Deferred conflicts.
    pub inbox: ConflictInbox,
    codec: TokenCodec,
    /// (owner, client) -> last successful sync (ms since epoch).
    sessions: RwLock<HashMap<(OwnerId, ClientId), u64>>,
}

impl HandlerContext {
    /// Creates a handler context.
    pub fn new(config: ServerConfig, registry: Registry) -> Self {
        let codec = TokenCodec::new(config.token_secret.clone());
        Self {
            config,
            registry,
            inbox: ConflictInbox::new(),
            codec,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Domain of `owner`.
    ///
    /// # Errors
    ///
    /// Returns the registry's open error.
    pub fn domain(&self, owner: &OwnerId) -> ServerResult<Arc<OwnerDomain>> {
        Ok(self.registry.domain(owner)?)
    }

    /// Token codec.
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    fn mark_synced(&self, owner: &OwnerId, client: &ClientId) {
        self.sessions
            .write()
            .insert((owner.clone(), client.clone()), now_millis());
    }

    fn last_synced_at(&self, owner: &OwnerId, client: &ClientId) -> Option<u64> {
        self.sessions
            .read()
            .get(&(owner.clone(), client.clone()))
            .copied()
    }
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Handler for sync requests.
///
/// The caller's identity (`owner`) is established by the transport layer
/// and passed in; nothing here crosses owner boundaries.
#[derive(Debug, Clone)]
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles a push request.
    ///
    /// # Errors
    ///
    /// Batch-level validation errors; per-entry failures are in the response.
    pub fn handle_push(&self, owner: &OwnerId, request: PushRequest) -> ServerResult<PushResponse> {
        let domain = self.context.domain(owner)?;
        let response = push::run_push(&domain, &request, self.context.config.max_push_batch)?;
        if self.context.config.defer_conflicts {
            for conflict in &response.conflicts {
                self.context.inbox.record(owner, conflict.clone());
            }
        }
        if response.failed.is_empty() {
            self.context.mark_synced(owner, &request.client_id);
        }
        Ok(response)
    }

    /// Handles a pull request.
    ///
    /// # Errors
    ///
    /// Returns an error only if the domain cannot be opened or the next
    /// token cannot be encoded.
    pub fn handle_pull(&self, owner: &OwnerId, request: PullRequest) -> ServerResult<PullResponse> {
        let domain = self.context.domain(owner)?;
        let page_size = self.context.config.page_size(request.page_size);
        let response = pull::run_pull(&domain, self.context.codec(), &request, page_size)?;
        if let Some(client) = &request.client_id {
            self.context.mark_synced(owner, client);
        }
        Ok(response)
    }

    /// Handles a conflict resolution.
    ///
    /// The conflict comes from the inbox; a `local_payload` in the request
    /// overrides the stored one. Without either there is nothing to resolve.
    /// The inbox record is taken before resolving, so one deferred conflict
    /// is resolved at most once; it is put back if resolving fails.
    ///
    /// # Errors
    ///
    /// [`ServerError::ConflictNotFound`] when there is nothing to resolve,
    /// [`ServerError::InvalidRequest`] when the payload kind differs from
    /// the entity kind, plus resolver errors.
    pub fn handle_resolve(
        &self,
        owner: &OwnerId,
        request: ResolveRequest,
    ) -> ServerResult<ResolveResponse> {
        let domain = self.context.domain(owner)?;
        let key = EntityKey::new(request.entity_kind, request.entity_id.clone());
        let local_payload = request
            .local_payload
            .map(|payload| checked_payload(&key, payload))
            .transpose()?;
        let stored = self.context.inbox.take(owner, &key);
        let taken = stored.clone();

        let conflict = match (stored, local_payload) {
            (Some(mut stored), Some(payload)) => {
                stored.local_payload = Some(payload);
                stored
            }
            (Some(stored), None) => stored,
            (None, Some(payload)) => {
                let current = domain.get(&key);
                ConflictRecord {
                    kind: key.kind,
                    entity_id: key.id.clone(),
                    operation: Operation::Update,
                    local_payload: Some(payload),
                    remote_payload: current.as_ref().and_then(|e| e.payload.clone()),
                    local_base_version: 0,
                    remote_current_version: current.as_ref().map_or(0, |e| e.version),
                    reason: ConflictReason::VersionMismatch,
                    origin: request.client_id.clone(),
                    detected_at: now_millis(),
                }
            }
            (None, None) => return Err(ServerError::ConflictNotFound(key)),
        };

        resolver::resolve(&domain, &conflict, request.strategy, &request.client_id).inspect_err(
            |_| {
                if let Some(taken) = taken {
                    self.context.inbox.restore(owner, taken);
                }
            },
        )
    }

    /// Lists deferred conflicts of `owner`, oldest first.
    pub fn handle_list_conflicts(&self, owner: &OwnerId) -> Vec<ConflictRecord> {
        self.context.inbox.list(owner)
    }

    /// Reports sync status of `owner` for one client.
    ///
    /// # Errors
    ///
    /// Returns the domain open error.
    pub fn handle_status(&self, owner: &OwnerId, request: &StatusRequest) -> ServerResult<SyncStatus> {
        let domain = self.context.domain(owner)?;
        Ok(SyncStatus {
            owner: owner.clone(),
            head_sequence: domain.head(),
            last_synced_at: self.context.last_synced_at(owner, &request.client_id),
            conflict_count: self.context.inbox.count(owner),
            entity_counts: domain.store().live_counts(),
        })
    }

    /// Returns every live entity grouped by kind and a token at their head.
    ///
    /// # Errors
    ///
    /// Returns the domain open or token encoding error.
    pub fn handle_full_sync(&self, owner: &OwnerId) -> ServerResult<FullSyncResponse> {
        let domain = self.context.domain(owner)?;
        let head = domain.head();
        let mut entities: BTreeMap<EntityKind, Vec<Entity>> =
            EntityKind::ALL.iter().map(|k| (*k, Vec::new())).collect();
        let mut token = SyncToken::new(owner.clone());
        token.last_sequence = head;
        for entity in domain.live_entities() {
            token.versions.insert(entity.key(), entity.version);
            entities.entry(entity.kind).or_default().push(entity);
        }
        debug!(owner = %owner, head, "full sync");
        Ok(FullSyncResponse {
            entities,
            token: self.context.codec().encode(&token)?,
            head_sequence: head,
        })
    }

    /// Dispatches a message; errors become [`SyncMessage::Error`].
    pub fn handle_message(&self, owner: &OwnerId, message: SyncMessage) -> SyncMessage {
        let result = match message {
            SyncMessage::PushRequest(req) => self.handle_push(owner, req).map(SyncMessage::PushResponse),
            SyncMessage::PullRequest(req) => self.handle_pull(owner, req).map(SyncMessage::PullResponse),
            SyncMessage::ResolveRequest(req) => self
                .handle_resolve(owner, req)
                .map(SyncMessage::ResolveResponse),
            SyncMessage::ListConflictsRequest => Ok(SyncMessage::ListConflictsResponse(
                self.handle_list_conflicts(owner),
            )),
            SyncMessage::StatusRequest(req) => self
                .handle_status(owner, &req)
                .map(SyncMessage::StatusResponse),
            SyncMessage::FullSyncRequest => self
                .handle_full_sync(owner)
                .map(SyncMessage::FullSyncResponse),
            other => Err(ServerError::InvalidRequest(format!(
                "unexpected message type: {}",
                other.type_name()
            ))),
        };
        result.unwrap_or_else(|err| {
            warn!(owner = %owner, error = %err, "request failed");
            SyncMessage::Error(ErrorResponse {
                code: err.status_code(),
                message: err.to_string(),
            })
        })
    }
}

fn checked_payload(key: &EntityKey, payload: EntityPayload) -> ServerResult<EntityPayload> {
    if payload.kind() != key.kind {
        return Err(ServerError::InvalidRequest(format!(
            "{} payload cannot resolve {key}",
            payload.kind()
        )));
    }
    Ok(payload.normalized()?)
}
