//! Client engines syncing against an in-process server.

use notesync_client::{
    ClientConfig, MessageChannel, MessageTransport, RetryConfig, SyncEngine, SyncError,
    SyncState, SyncTransport, TokenRefresher,
};
use notesync_core::{EntityKind, OwnerId};
use notesync_protocol::ResolveStrategy;
use notesync_server::SyncServer;
use notesync_testkit::prelude::*;
use std::sync::Arc;
use tokio::sync::Notify;

/// Routes encoded messages straight into a server.
struct ServerChannel {
    server: Arc<SyncServer>,
    owner: OwnerId,
}

impl MessageChannel for ServerChannel {
    fn exchange(&self, body: Vec<u8>) -> Result<Vec<u8>, String> {
        self.server
            .handle_bytes(&self.owner, &body)
            .map_err(|e| e.to_string())
    }
}

type Engine = SyncEngine<MessageTransport<ServerChannel>>;

fn engine(server: &Arc<SyncServer>, name: &str) -> Engine {
    SyncEngine::new(
        ClientConfig::new(name)
            .with_page_size(2)
            .with_retry(RetryConfig::no_retry()),
        MessageTransport::new(ServerChannel {
            server: Arc::clone(server),
            owner: alice(),
        }),
    )
}

fn title(engine: &Engine, id: &str) -> Option<String> {
    engine
        .cached(EntityKind::Note, id)
        .and_then(|e| e.payload)
        .map(|p| p.label().to_string())
}

#[test]
fn changes_flow_between_clients() {
    let server = Arc::new(SyncServer::new(test_config()));
    let a = engine(&server, "A");
    let b = engine(&server, "B");

    a.create("n1", note("draft")).unwrap();
    a.create("n2", note("other")).unwrap();
    let result = a.sync().unwrap();
    assert_eq!(result.pushed, 2);
    assert_eq!(a.state(), SyncState::Synced);

    let result = b.sync().unwrap();
    assert_eq!(result.pulled, 2);
    assert_eq!(title(&b, "n1").as_deref(), Some("draft"));

    a.update("n1", note("final")).unwrap();
    a.sync().unwrap();
    b.sync().unwrap();
    assert_eq!(title(&b, "n1").as_deref(), Some("final"));
    assert_eq!(b.cached(EntityKind::Note, "n1").unwrap().version, 2);
}

#[test]
fn stale_edit_is_parked_then_kept_both() {
    let server = Arc::new(SyncServer::new(test_config()));
    let a = engine(&server, "A");
    let b = engine(&server, "B");

    a.create("n1", note("draft")).unwrap();
    a.sync().unwrap();
    b.sync().unwrap();

    a.update("n1", note("final")).unwrap();
    a.sync().unwrap();

    // B edited on top of version 1 while offline.
    b.update("n1", note("mine")).unwrap();
    let result = b.sync().unwrap();
    assert_eq!(result.conflicts.len(), 1);
    let conflict = &result.conflicts[0];
    assert_eq!(conflict.local_base_version, 1);
    assert_eq!(conflict.remote_current_version, 2);
    assert_eq!(conflict.remote_payload.as_ref().unwrap().label(), "final");
    assert_eq!(b.conflicts().len(), 1);
    assert_eq!(title(&b, "n1").as_deref(), Some("final"));
    assert_eq!(server.head(&alice()).unwrap(), 2);

    let resolved = b
        .resolve(EntityKind::Note, "n1", ResolveStrategy::KeepBoth)
        .unwrap();
    let copy = resolved.created_id().cloned().unwrap();
    assert!(b.conflicts().is_empty());
    assert_eq!(b.stats().conflicts_resolved, 1);

    a.sync().unwrap();
    assert_eq!(title(&a, copy.as_str()).as_deref(), Some("mine"));
    assert_eq!(title(&a, "n1").as_deref(), Some("final"));
}

#[test]
fn take_local_rebases_later_edits() {
    let server = Arc::new(SyncServer::new(test_config()));
    scenarios::draft_then_final(&server, &alice());
    let b = engine(&server, "B");

    b.record(notesync_core::ChangeRequest::update("n1", note("mine"), 1, "B"))
        .unwrap();
    let result = b.sync().unwrap();
    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].remote_current_version, 2);

    b.update("n1", note("mine, edited")).unwrap();
    let resolved = b
        .resolve(EntityKind::Note, "n1", ResolveStrategy::TakeLocal)
        .unwrap();
    assert_eq!(resolved.applied.unwrap().version, 3);

    let result = b.sync().unwrap();
    assert_eq!(result.pushed, 1);
    assert!(result.conflicts.is_empty());
    assert_eq!(title(&b, "n1").as_deref(), Some("mine, edited"));
    assert_eq!(b.cached(EntityKind::Note, "n1").unwrap().version, 4);
}

#[test]
fn cold_start_fills_cache_with_live_entities() {
    let server = Arc::new(SyncServer::new(test_config()));
    scenarios::three_notes_one_deleted(&server, &alice());
    let c = engine(&server, "C");

    let result = c.sync().unwrap();
    assert_eq!(result.pulled, 2);
    assert!(!result.resynced);
    let ids: Vec<String> = c
        .cache()
        .live(EntityKind::Note)
        .into_iter()
        .map(|e| e.id.as_str().to_string())
        .collect();
    assert_eq!(ids, vec!["n1", "n3"]);
}

#[test]
fn unknown_token_triggers_resync() {
    let server = Arc::new(SyncServer::new(test_config()));
    scenarios::three_notes_one_deleted(&server, &alice());
    let c = SyncEngine::with_token(
        ClientConfig::new("C"),
        MessageTransport::new(ServerChannel {
            server: Arc::clone(&server),
            owner: alice(),
        }),
        "bogus",
    );
    let result = c.sync().unwrap();
    assert!(result.resynced);
    assert_eq!(c.stats().resyncs, 1);
    assert_eq!(c.cache().live(EntityKind::Note).len(), 2);

    let again = c.sync().unwrap();
    assert!(!again.resynced);
    assert_eq!(again.pulled, 0);
}

#[test]
fn status_reports_last_sync() {
    use notesync_client::SyncTransport;

    let server = Arc::new(SyncServer::new(test_config()));
    let a = engine(&server, "A");
    a.create("n1", note("x")).unwrap();
    a.sync().unwrap();
    let status = a.transport().status(&client("A")).unwrap();
    assert_eq!(status.head_sequence, 1);
    assert!(status.last_synced_at.is_some());
}

#[tokio::test]
async fn dropped_session_is_refreshed_once_then_sync_resumes() {
    let server = Arc::new(SyncServer::new(test_config()));
    let a = engine(&server, "A");
    a.create("n1", note("draft")).unwrap();

    a.transport().close().unwrap();
    assert!(matches!(a.sync(), Err(SyncError::NotConnected)));
    assert_eq!(a.state(), SyncState::Error);

    let refresher = TokenRefresher::<String>::new();
    let gate = Notify::new();
    let (leader, follower, ()) = tokio::join!(
        a.transport().refresh_session(&refresher, || async {
            gate.notified().await;
            Ok("session-2".to_string())
        }),
        a.transport()
            .refresh_session(&refresher, || async { Ok("unused".to_string()) }),
        async { gate.notify_one() },
    );
    assert_eq!(leader.unwrap(), "session-2");
    assert_eq!(follower.unwrap(), "session-2");
    assert_eq!(refresher.refresh_count(), 1);
    assert!(a.transport().is_connected());

    let result = a.sync().unwrap();
    assert_eq!(result.pushed, 1);
    assert_eq!(a.state(), SyncState::Synced);
}

#[tokio::test]
async fn failed_refresh_keeps_transport_disconnected() {
    let server = Arc::new(SyncServer::new(test_config()));
    let a = engine(&server, "A");
    a.transport().close().unwrap();

    let refresher = TokenRefresher::<String>::new();
    let err = a
        .transport()
        .refresh_session(&refresher, || async { Err("refresh token expired".to_string()) })
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::RefreshFailed(_)));
    assert!(!a.transport().is_connected());
}
