//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use crate::refresh::TokenRefresher;
use notesync_core::ClientId;
use notesync_protocol::{
    PullRequest, PullResponse, PushRequest, PushResponse, ResolveRequest, ResolveResponse,
    StatusRequest, SyncMessage, SyncStatus,
};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

/// A sync transport carries requests to one owner's sync endpoint.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, WebSocket, in-process, mock for testing).
pub trait SyncTransport: Send + Sync {
    /// Pulls changes after a token.
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse>;

    /// Pushes a batch of changes.
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse>;

    /// Resolves a conflict.
    fn resolve(&self, request: &ResolveRequest) -> SyncResult<ResolveResponse>;

    /// Asks for the sync status of this client.
    fn status(&self, client_id: &ClientId) -> SyncResult<SyncStatus>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Closes the transport.
    fn close(&self) -> SyncResult<()>;
}

/// Byte channel to a sync endpoint.
///
/// Implement this for the actual carrier (HTTP client, socket, or a
/// server in the same process).
pub trait MessageChannel: Send + Sync {
    /// Sends an encoded message and returns the encoded reply.
    fn exchange(&self, body: Vec<u8>) -> Result<Vec<u8>, String>;

    /// Checks if the channel is healthy.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Transport exchanging CBOR [`SyncMessage`]s over a [`MessageChannel`].
pub struct MessageTransport<C: MessageChannel> {
    channel: C,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: MessageChannel> MessageTransport<C> {
    /// Creates a transport over `channel`.
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// The underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Returns the last channel error.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Marks the transport connected again after a channel failure.
    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Renews the session credential through `refresher`, then reconnects.
    ///
    /// Tasks that find the session dropped at the same time share one
    /// refresh and all receive its credential.
    ///
    /// # Errors
    ///
    /// The refresh error; the transport then stays disconnected.
    pub async fn refresh_session<F, Fut>(
        &self,
        refresher: &TokenRefresher<String>,
        refresh: F,
    ) -> SyncResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, String>>,
    {
        let credential = refresher.refresh(refresh).await?;
        self.reconnect();
        Ok(credential)
    }

    fn exchange(&self, message: SyncMessage) -> SyncResult<SyncMessage> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        let body = message.encode()?;
        let reply = self.channel.exchange(body).map_err(|e| {
            *self.last_error.write() = Some(e.clone());
            self.connected.store(false, Ordering::SeqCst);
            SyncError::transport_retryable(e)
        })?;
        *self.last_error.write() = None;

        match SyncMessage::decode(&reply)? {
            SyncMessage::Error(error) => Err(SyncError::Server {
                code: error.code,
                message: error.message,
            }),
            other => Ok(other),
        }
    }
}

fn unexpected(expected: &'static str, got: &SyncMessage) -> SyncError {
    SyncError::UnexpectedReply {
        expected,
        got: got.type_name(),
    }
}

impl<C: MessageChannel> SyncTransport for MessageTransport<C> {
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        match self.exchange(SyncMessage::PullRequest(request.clone()))? {
            SyncMessage::PullResponse(response) => Ok(response),
            other => Err(unexpected("pullResponse", &other)),
        }
    }

    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        match self.exchange(SyncMessage::PushRequest(request.clone()))? {
            SyncMessage::PushResponse(response) => Ok(response),
            other => Err(unexpected("pushResponse", &other)),
        }
    }

    fn resolve(&self, request: &ResolveRequest) -> SyncResult<ResolveResponse> {
        match self.exchange(SyncMessage::ResolveRequest(request.clone()))? {
            SyncMessage::ResolveResponse(response) => Ok(response),
            other => Err(unexpected("resolveResponse", &other)),
        }
    }

    fn status(&self, client_id: &ClientId) -> SyncResult<SyncStatus> {
        let request = StatusRequest {
            client_id: client_id.clone(),
        };
        match self.exchange(SyncMessage::StatusRequest(request))? {
            SyncMessage::StatusResponse(status) => Ok(status),
            other => Err(unexpected("statusResponse", &other)),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.channel.is_healthy()
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// A scripted transport for testing.
///
/// Responses are queued per operation and consumed in order; requests
/// are recorded.
#[derive(Debug, Default)]
pub struct MockTransport {
    disconnected: AtomicBool,
    pull_responses: Mutex<VecDeque<SyncResult<PullResponse>>>,
    push_responses: Mutex<VecDeque<SyncResult<PushResponse>>>,
    resolve_responses: Mutex<VecDeque<SyncResult<ResolveResponse>>>,
    pulls: Mutex<Vec<PullRequest>>,
    pushes: Mutex<Vec<PushRequest>>,
}

impl MockTransport {
    /// Creates a connected mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a pull response.
    pub fn queue_pull(&self, response: SyncResult<PullResponse>) {
        self.pull_responses.lock().push_back(response);
    }

    /// Queues a push response.
    pub fn queue_push(&self, response: SyncResult<PushResponse>) {
        self.push_responses.lock().push_back(response);
    }

    /// Queues a resolve response.
    pub fn queue_resolve(&self, response: SyncResult<ResolveResponse>) {
        self.resolve_responses.lock().push_back(response);
    }

    /// Pull requests received so far.
    pub fn pulls(&self) -> Vec<PullRequest> {
        self.pulls.lock().clone()
    }

    /// Push requests received so far.
    pub fn pushes(&self) -> Vec<PushRequest> {
        self.pushes.lock().clone()
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.disconnected.store(!connected, Ordering::SeqCst);
    }

    fn check_connected(&self) -> SyncResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SyncError::NotConnected)
        }
    }
}

fn next<T>(queue: &Mutex<VecDeque<SyncResult<T>>>, what: &str) -> SyncResult<T> {
    queue
        .lock()
        .pop_front()
        .unwrap_or_else(|| Err(SyncError::transport_fatal(format!("no mock {what} response queued"))))
}

impl SyncTransport for MockTransport {
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.check_connected()?;
        self.pulls.lock().push(request.clone());
        next(&self.pull_responses, "pull")
    }

    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.check_connected()?;
        self.pushes.lock().push(request.clone());
        next(&self.push_responses, "push")
    }

    fn resolve(&self, _request: &ResolveRequest) -> SyncResult<ResolveResponse> {
        self.check_connected()?;
        next(&self.resolve_responses, "resolve")
    }

    fn status(&self, _client_id: &ClientId) -> SyncResult<SyncStatus> {
        Err(SyncError::transport_fatal("mock transport has no status"))
    }

    fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }

    fn close(&self) -> SyncResult<()> {
        self.set_connected(false);
        Ok(())
    }
}
