//! Sync engine state machine.

use crate::cache::{CachedEntity, EntityCache};
use crate::config::ClientConfig;
use crate::error::{SyncError, SyncResult};
use crate::outbox::{Outbox, PendingChange};
use crate::transport::SyncTransport;
use notesync_core::{
    ChangeRequest, ConflictRecord, EntityId, EntityKey, EntityKind, EntityPayload,
};
use notesync_protocol::{
    FailedEntry, PullRequest, PushEntry, PushRequest, ResolveRequest, ResolveResponse,
    ResolveStrategy,
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, not syncing.
    Idle,
    /// Engine is pulling changes from the server.
    Pulling,
    /// Engine is pushing changes to the server.
    Pushing,
    /// Engine has completed a sync cycle.
    Synced,
    /// Engine encountered an error.
    Error,
    /// Engine is waiting before retrying.
    RetryWait,
}

impl SyncState {
    /// Returns true if the engine is in an active sync state.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Pulling | SyncState::Pushing)
    }

    /// Returns true if the engine can start a new sync.
    pub fn can_start_sync(&self) -> bool {
        matches!(
            self,
            SyncState::Idle | SyncState::Synced | SyncState::Error | SyncState::RetryWait
        )
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Sync cycles completed.
    pub cycles_completed: u64,
    /// Entries received from pulls.
    pub entries_pulled: u64,
    /// Changes accepted by the server.
    pub changes_pushed: u64,
    /// Conflicts reported by the server.
    pub conflicts_encountered: u64,
    /// Conflicts resolved through [`SyncEngine::resolve`].
    pub conflicts_resolved: u64,
    /// Full resyncs forced by a rejected token.
    pub resyncs: u64,
    /// Retries.
    pub retries: u64,
    /// Last sync time.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a sync cycle.
#[derive(Debug, Clone)]
pub struct SyncCycleResult {
    /// Entries pulled.
    pub pulled: u64,
    /// Changes accepted.
    pub pushed: u64,
    /// Conflicts raised by this cycle's pushes.
    pub conflicts: Vec<ConflictRecord>,
    /// The server rejected the token and sent a full snapshot.
    pub resynced: bool,
    /// Duration of the cycle.
    pub duration: Duration,
}

/// Client sync engine: pull every page, then push pending changes.
pub struct SyncEngine<T: SyncTransport> {
    config: ClientConfig,
    transport: T,
    cache: EntityCache,
    outbox: Mutex<Outbox>,
    token: RwLock<Option<String>>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    cancelled: AtomicBool,
}

struct PushSummary {
    pushed: u64,
    conflicts: Vec<ConflictRecord>,
    failed: Vec<FailedEntry>,
}

impl<T: SyncTransport> SyncEngine<T> {
    /// Creates an engine that has never synced.
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            cache: EntityCache::new(),
            outbox: Mutex::new(Outbox::new()),
            token: RwLock::new(None),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Creates an engine resuming from a saved token.
    pub fn with_token(config: ClientConfig, transport: T, token: impl Into<String>) -> Self {
        let engine = Self::new(config, transport);
        *engine.token.write() = Some(token.into());
        engine
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The token to present on the next pull.
    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    /// Last server-known entity.
    pub fn cached(&self, kind: EntityKind, id: impl Into<EntityId>) -> Option<CachedEntity> {
        self.cache.get(&EntityKey::new(kind, id))
    }

    /// The entity cache.
    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    /// Changes waiting to be pushed, parked ones excluded.
    pub fn pending_len(&self) -> usize {
        self.outbox.lock().len()
    }

    /// Conflicts waiting for [`Self::resolve`].
    pub fn conflicts(&self) -> Vec<ConflictRecord> {
        self.outbox.lock().conflicts()
    }

    /// Cancels any ongoing sync.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    fn expected_version(&self, outbox: &Outbox, key: &EntityKey) -> u64 {
        self.cache.version(key) + outbox.outstanding_for(key) as u64
    }

    /// Queues a locally validated change and returns its op id.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Core`] if the change is malformed; such a
    /// change would fail the whole batch on the server.
    pub fn record(&self, request: ChangeRequest) -> SyncResult<u64> {
        let request = request.validated()?;
        let op_id = self.outbox.lock().enqueue(request);
        Ok(op_id)
    }

    /// Queues the creation of an entity.
    ///
    /// # Errors
    ///
    /// See [`Self::record`].
    pub fn create(
        &self,
        id: impl Into<EntityId>,
        payload: impl Into<EntityPayload>,
    ) -> SyncResult<u64> {
        self.record(ChangeRequest::create(id, payload, self.config.client_id.clone()))
    }

    /// Queues a payload replacement based on the locally expected version.
    ///
    /// # Errors
    ///
    /// See [`Self::record`].
    pub fn update(
        &self,
        id: impl Into<EntityId>,
        payload: impl Into<EntityPayload>,
    ) -> SyncResult<u64> {
        let payload = payload.into();
        let id = id.into();
        let mut outbox = self.outbox.lock();
        let base = self.expected_version(&outbox, &EntityKey::new(payload.kind(), id.clone()));
        let request =
            ChangeRequest::update(id, payload, base, self.config.client_id.clone()).validated()?;
        Ok(outbox.enqueue(request))
    }

    /// Queues a delete based on the locally expected version.
    ///
    /// # Errors
    ///
    /// See [`Self::record`].
    pub fn delete(&self, kind: EntityKind, id: impl Into<EntityId>) -> SyncResult<u64> {
        let id = id.into();
        let mut outbox = self.outbox.lock();
        let base = self.expected_version(&outbox, &EntityKey::new(kind, id.clone()));
        let request =
            ChangeRequest::delete(kind, id, base, self.config.client_id.clone()).validated()?;
        Ok(outbox.enqueue(request))
    }

    /// Performs one sync cycle: pull then push.
    ///
    /// # Errors
    ///
    /// Returns transport and server errors, or
    /// [`SyncError::EntriesFailed`] if some pushed entries failed. The
    /// engine is left in [`SyncState::Error`].
    pub fn sync(&self) -> SyncResult<SyncCycleResult> {
        let start = Instant::now();
        self.cancelled.store(false, Ordering::SeqCst);

        let current = self.state();
        if !current.can_start_sync() {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{current:?}"),
                to: "Pulling".into(),
            });
        }

        self.set_state(SyncState::Pulling);
        let (pulled, resynced) = match self.pull_all() {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.fail(e)),
        };

        self.set_state(SyncState::Pushing);
        let summary = match self.push_all() {
            Ok(summary) => summary,
            Err(e) => return Err(self.fail(e)),
        };

        {
            let mut stats = self.stats.write();
            stats.entries_pulled += pulled;
            stats.changes_pushed += summary.pushed;
            stats.conflicts_encountered += summary.conflicts.len() as u64;
            if resynced {
                stats.resyncs += 1;
            }
        }

        if !summary.failed.is_empty() {
            let retryable = summary.failed.iter().all(|f| f.retryable);
            return Err(self.fail(SyncError::EntriesFailed {
                count: summary.failed.len(),
                retryable,
            }));
        }

        self.set_state(SyncState::Synced);
        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.last_sync_time = Some(Instant::now());
            stats.last_error = None;
        }
        info!(
            client = %self.config.client_id,
            pulled,
            pushed = summary.pushed,
            conflicts = summary.conflicts.len(),
            resynced,
            "sync cycle completed"
        );

        Ok(SyncCycleResult {
            pulled,
            pushed: summary.pushed,
            conflicts: summary.conflicts,
            resynced,
            duration: start.elapsed(),
        })
    }

    /// Performs a sync, retrying with backoff on retryable errors.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, or the first
    /// non-retryable one.
    pub fn sync_with_retry(&self) -> SyncResult<SyncCycleResult> {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                self.set_state(SyncState::RetryWait);
                std::thread::sleep(retry.delay_for_attempt(attempt));
                self.stats.write().retries += 1;
            }
            match self.sync() {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt + 1 < retry.max_attempts => {
                    warn!(attempt, error = %e, "sync failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn fail(&self, error: SyncError) -> SyncError {
        self.set_state(SyncState::Error);
        self.stats.write().last_error = Some(error.to_string());
        error
    }

    fn pull_all(&self) -> SyncResult<(u64, bool)> {
        let mut pulled = 0u64;
        let mut resynced = false;
        let mut cold = self.token().is_none();

        loop {
            self.check_cancelled()?;
            let request = PullRequest {
                token: self.token(),
                page_size: Some(self.config.page_size),
                entity_kinds: self.config.entity_kinds.clone(),
                client_id: Some(self.config.client_id.clone()),
            };
            let response = self.transport.pull(&request)?;

            if response.resync_required {
                warn!(client = %self.config.client_id, "token rejected, resyncing from snapshot");
                resynced = true;
                cold = true;
            }
            if cold {
                self.cache.clear();
                cold = false;
            }

            for entry in &response.entries {
                self.cache.apply_entry(entry);
            }
            pulled += response.entries.len() as u64;
            *self.token.write() = Some(response.next_token);

            debug!(
                returned = response.entries.len(),
                head = response.head_sequence,
                has_more = response.has_more,
                "pulled page"
            );
            if !response.has_more {
                break;
            }
        }

        Ok((pulled, resynced))
    }

    fn push_all(&self) -> SyncResult<PushSummary> {
        let mut summary = PushSummary {
            pushed: 0,
            conflicts: Vec::new(),
            failed: Vec::new(),
        };

        loop {
            self.check_cancelled()?;
            let batch = self.outbox.lock().next_batch(self.config.push_batch_size.max(1));
            if batch.is_empty() {
                break;
            }

            let request = PushRequest::new(
                self.config.client_id.clone(),
                batch
                    .iter()
                    .map(|c| PushEntry::from(c.request.clone()))
                    .collect(),
            );
            let response = self.transport.push(&request)?;

            let mut outbox = self.outbox.lock();
            for applied in &response.applied {
                let key = EntityKey::new(applied.kind, applied.entity_id.clone());
                if let Some(change) = find(&batch, &key) {
                    outbox.acknowledge(change.op_id);
                    self.cache.apply_pushed(applied, change.request.payload.clone());
                    summary.pushed += 1;
                }
            }
            for conflict in &response.conflicts {
                if let Some(change) = find(&batch, &conflict.key()) {
                    outbox.park(change.op_id, conflict.clone());
                    self.cache.apply_conflict(conflict);
                    summary.conflicts.push(conflict.clone());
                }
            }
            drop(outbox);

            if !response.failed.is_empty() {
                for failed in &response.failed {
                    warn!(
                        entity = %failed.entity_id,
                        retryable = failed.retryable,
                        error = %failed.error,
                        "pushed entry failed"
                    );
                }
                summary.failed.extend(response.failed);
                break;
            }
        }

        Ok(summary)
    }

    /// Settles a parked conflict with `strategy`.
    ///
    /// The parked change is dropped; later queued changes to the same
    /// entity are re-based on the resulting server version.
    ///
    /// # Errors
    ///
    /// [`SyncError::ConflictNotFound`] if nothing is parked for the
    /// entity, or the transport error of the resolve call.
    pub fn resolve(
        &self,
        kind: EntityKind,
        id: impl Into<EntityId>,
        strategy: ResolveStrategy,
    ) -> SyncResult<ResolveResponse> {
        let key = EntityKey::new(kind, id);
        let parked = self
            .outbox
            .lock()
            .parked(&key)
            .cloned()
            .ok_or_else(|| SyncError::ConflictNotFound(key.clone()))?;

        let request = ResolveRequest {
            client_id: self.config.client_id.clone(),
            entity_kind: key.kind,
            entity_id: key.id.clone(),
            strategy,
            local_payload: parked.change.request.payload.clone(),
        };
        let response = self.transport.resolve(&request)?;

        let mut outbox = self.outbox.lock();
        outbox.take_parked(&key);
        let mut resolved_version = parked.conflict.remote_current_version;
        if let Some(applied) = &response.applied {
            self.cache
                .apply_pushed(applied, parked.change.request.payload.clone());
            if applied.entity_id == key.id && applied.kind == key.kind {
                resolved_version = applied.version;
            }
        }
        outbox.rebase(&key, resolved_version);
        drop(outbox);

        self.stats.write().conflicts_resolved += 1;
        info!(entity = %key, strategy = %response.strategy, "conflict resolved");
        Ok(response)
    }
}

fn find<'a>(batch: &'a [PendingChange], key: &EntityKey) -> Option<&'a PendingChange> {
    batch.iter().find(|c| &c.request.key() == key)
}
