//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use notesync_core::{
    ApplyOutcome, ChangeRequest, ClientId, Config, ConflictRecord, Entity, EntityId, EntityKey,
    EntityKind, EntityPayload, OwnerId, Registry,
};
use notesync_protocol::{
    FullSyncResponse, PullRequest, PullResponse, PushRequest, PushResponse, ResolveRequest,
    ResolveResponse, StatusRequest, SyncMessage, SyncStatus,
};
use std::path::Path;
use std::sync::Arc;

/// The sync server.
///
/// Owns every owner's domain and exposes the sync operations together
/// with the CRUD entry points, which go through the same apply primitive.
///
/// # Example
///
/// ```
/// use notesync_core::{NotePayload, OwnerId};
/// use notesync_protocol::PullRequest;
/// use notesync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
/// let owner = OwnerId::new("alice");
/// server.create(&owner, &"web".into(), "n1", NotePayload::new("Hello", "")).unwrap();
///
/// let pulled = server.pull(&owner, PullRequest::default()).unwrap();
/// assert_eq!(pulled.entries.len(), 1);
/// ```
#[derive(Debug)]
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a memory-only server.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry(config, Registry::in_memory())
    }

    /// Opens a server over a data directory.
    ///
    /// # Errors
    ///
    /// Returns directory open errors (missing, locked).
    pub fn open(path: &Path, config: ServerConfig) -> ServerResult<Self> {
        let core = Config::default().with_sync_on_append(config.sync_on_append);
        let registry = Registry::open(path, &core)?;
        Ok(Self::with_registry(config, registry))
    }

    /// Creates a server over an existing registry.
    pub fn with_registry(config: ServerConfig, registry: Registry) -> Self {
        let context = Arc::new(HandlerContext::new(config, registry));
        let handler = RequestHandler::new(Arc::clone(&context));
        Self { handler, context }
    }

    /// Request handler.
    pub fn handler(&self) -> &RequestHandler {
        &self.handler
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Applies a client batch.
    ///
    /// # Errors
    ///
    /// See [`RequestHandler::handle_push`].
    pub fn push(&self, owner: &OwnerId, request: PushRequest) -> ServerResult<PushResponse> {
        self.handler.handle_push(owner, request)
    }

    /// Returns changes after a token.
    ///
    /// # Errors
    ///
    /// See [`RequestHandler::handle_pull`].
    pub fn pull(&self, owner: &OwnerId, request: PullRequest) -> ServerResult<PullResponse> {
        self.handler.handle_pull(owner, request)
    }

    /// Resolves a conflict.
    ///
    /// # Errors
    ///
    /// See [`RequestHandler::handle_resolve`].
    pub fn resolve(&self, owner: &OwnerId, request: ResolveRequest) -> ServerResult<ResolveResponse> {
        self.handler.handle_resolve(owner, request)
    }

    /// Deferred conflicts of `owner`.
    pub fn list_conflicts(&self, owner: &OwnerId) -> Vec<ConflictRecord> {
        self.handler.handle_list_conflicts(owner)
    }

    /// Sync status of `owner` for `client`.
    ///
    /// # Errors
    ///
    /// Returns the domain open error.
    pub fn status(&self, owner: &OwnerId, client: &ClientId) -> ServerResult<SyncStatus> {
        self.handler.handle_status(
            owner,
            &StatusRequest {
                client_id: client.clone(),
            },
        )
    }

    /// Every live entity of `owner`, grouped by kind.
    ///
    /// # Errors
    ///
    /// See [`RequestHandler::handle_full_sync`].
    pub fn full_sync(&self, owner: &OwnerId) -> ServerResult<FullSyncResponse> {
        self.handler.handle_full_sync(owner)
    }

    /// Handles a sync message.
    pub fn handle_message(&self, owner: &OwnerId, message: SyncMessage) -> SyncMessage {
        self.handler.handle_message(owner, message)
    }

    /// Decodes a CBOR message, handles it and encodes the reply.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the request cannot be decoded or the
    /// reply cannot be encoded.
    pub fn handle_bytes(&self, owner: &OwnerId, bytes: &[u8]) -> ServerResult<Vec<u8>> {
        let message = SyncMessage::decode(bytes)?;
        Ok(self.handle_message(owner, message).encode()?)
    }

    /// Creates an entity from the CRUD layer.
    ///
    /// # Errors
    ///
    /// Validation and storage errors of the apply primitive.
    pub fn create(
        &self,
        owner: &OwnerId,
        client: &ClientId,
        id: impl Into<EntityId>,
        payload: impl Into<EntityPayload>,
    ) -> ServerResult<ApplyOutcome> {
        let domain = self.context.domain(owner)?;
        Ok(domain.apply(ChangeRequest::create(id, payload, client.clone()))?)
    }

    /// Replaces an entity's payload from the CRUD layer, based on its
    /// current version.
    ///
    /// # Errors
    ///
    /// Validation and storage errors of the apply primitive.
    pub fn update(
        &self,
        owner: &OwnerId,
        client: &ClientId,
        id: impl Into<EntityId>,
        payload: impl Into<EntityPayload>,
    ) -> ServerResult<ApplyOutcome> {
        let domain = self.context.domain(owner)?;
        let payload = payload.into();
        let id = id.into();
        let base = domain.version(&EntityKey::new(payload.kind(), id.clone()));
        Ok(domain.apply(ChangeRequest::update(id, payload, base, client.clone()))?)
    }

    /// Deletes an entity from the CRUD layer, based on its current version.
    ///
    /// # Errors
    ///
    /// Validation and storage errors of the apply primitive.
    pub fn delete(
        &self,
        owner: &OwnerId,
        client: &ClientId,
        kind: EntityKind,
        id: impl Into<EntityId>,
    ) -> ServerResult<ApplyOutcome> {
        let domain = self.context.domain(owner)?;
        let id = id.into();
        let base = domain.version(&EntityKey::new(kind, id.clone()));
        Ok(domain.apply(ChangeRequest::delete(kind, id, base, client.clone()))?)
    }

    /// Current state of an entity, tombstones included.
    ///
    /// # Errors
    ///
    /// Returns the domain open error.
    pub fn entity(&self, owner: &OwnerId, key: &EntityKey) -> ServerResult<Option<Entity>> {
        Ok(self.context.domain(owner)?.get(key))
    }

    /// Highest change log sequence of `owner`.
    ///
    /// # Errors
    ///
    /// Returns the domain open error.
    pub fn head(&self, owner: &OwnerId) -> ServerResult<u64> {
        Ok(self.context.domain(owner)?.head())
    }

    /// Owners known to this server.
    ///
    /// # Errors
    ///
    /// Returns the registry listing error.
    pub fn owners(&self) -> ServerResult<Vec<OwnerId>> {
        self.context.registry.owners().map_err(ServerError::from)
    }
}
