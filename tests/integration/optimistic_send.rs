//! End-to-end optimistic send: a sent message is confirmed against the
//! dev server and appears exactly once even though it also comes back
//! over the sender's own push socket. A failed send leaves no trace.

use std::sync::Arc;
use std::time::Duration;

use pairchat::api::rest::RestBackend;
use pairchat::convo::send::SendError;
use pairchat::convo::store::{LoadState, SharedStore};
use pairchat::session::{ChatSession, SessionError, SessionOptions};
use pairchat_proto::message::UserId;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn start_server() -> (String, String, tokio::task::JoinHandle<()>) {
    let (addr, handle) = pairchat_devserver::server::start_server("127.0.0.1:0")
        .await
        .expect("failed to start dev server");
    (format!("http://{addr}"), format!("ws://{addr}"), handle)
}

fn backend(base: &str, user: &str) -> Arc<RestBackend> {
    Arc::new(RestBackend::new(base, user).expect("failed to build backend"))
}

fn session(
    backend: Arc<RestBackend>,
    me: &str,
    ws_base: Option<String>,
) -> ChatSession<RestBackend> {
    ChatSession::new(
        backend,
        UserId::new(me),
        SessionOptions {
            ws_base,
            ..SessionOptions::default()
        },
    )
}

async fn wait_until_loaded(store: &SharedStore) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if store.lock().state() != LoadState::Loading {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("store never left the loading state");
}

// ===========================================================================
// Confirmation and echo dedup
// ===========================================================================

#[tokio::test]
async fn sent_message_is_confirmed_with_server_identity() {
    let (base, _ws, _server) = start_server().await;

    let session = session(backend(&base, "alice"), "alice", None);
    let (store, _events) = session.activate(&UserId::new("bob")).await.unwrap();
    wait_until_loaded(&store).await;

    let id = session.send("hello bob").await.unwrap();

    let store = store.lock();
    assert_eq!(store.len(), 1);
    assert!(store.contains(&id));
    assert!(store.entries().iter().all(|e| !e.is_transient()));
}

#[tokio::test]
async fn own_push_echo_does_not_duplicate_the_sent_message() {
    let (base, ws, _server) = start_server().await;

    // With the push socket open, alice's own send comes back as an echo.
    let session = session(backend(&base, "alice"), "alice", Some(ws));
    let (store, _events) = session.activate(&UserId::new("bob")).await.unwrap();
    wait_until_loaded(&store).await;
    assert!(session.channel_connected());

    let id = session.send("echoed").await.unwrap();

    // Give the echo time to arrive, then confirm nothing doubled.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let store = store.lock();
    assert_eq!(store.len(), 1);
    assert!(store.contains(&id));
}

#[tokio::test]
async fn consecutive_sends_stay_in_order() {
    let (base, ws, _server) = start_server().await;

    let session = session(backend(&base, "alice"), "alice", Some(ws));
    let (store, _events) = session.activate(&UserId::new("bob")).await.unwrap();
    wait_until_loaded(&store).await;

    for body in ["one", "two", "three"] {
        session.send(body).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let store = store.lock();
    assert_eq!(store.len(), 3);
    let bodies: Vec<String> = store.messages().map(|m| m.body.clone()).collect();
    assert_eq!(bodies, ["one", "two", "three"]);
}

// ===========================================================================
// Failure paths
// ===========================================================================

#[tokio::test]
async fn invalid_input_is_rejected_without_touching_anything() {
    let (base, _ws, _server) = start_server().await;

    let session = session(backend(&base, "alice"), "alice", None);
    let (store, _events) = session.activate(&UserId::new("bob")).await.unwrap();
    wait_until_loaded(&store).await;

    let result = session.send("   ").await;
    assert!(matches!(
        result,
        Err(SessionError::Send(SendError::Invalid(_)))
    ));
    assert!(store.lock().is_empty());
}

#[tokio::test]
async fn failed_send_leaves_no_unconfirmed_entry() {
    let (base, _ws, server) = start_server().await;

    let session = session(backend(&base, "alice"), "alice", None);
    let (store, _events) = session.activate(&UserId::new("bob")).await.unwrap();
    wait_until_loaded(&store).await;

    // The backend goes away before the send.
    server.abort();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = session.send("doomed").await;
    assert!(matches!(
        result,
        Err(SessionError::Send(SendError::Failed(_)))
    ));
    assert!(store.lock().is_empty());
}

#[tokio::test]
async fn failed_send_does_not_disturb_existing_entries() {
    let (base, _ws, server) = start_server().await;

    let session = session(backend(&base, "alice"), "alice", None);
    let (store, _events) = session.activate(&UserId::new("bob")).await.unwrap();
    wait_until_loaded(&store).await;
    session.send("kept").await.unwrap();

    server.abort();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let _ = session.send("lost").await;

    let bodies: Vec<String> = store.lock().messages().map(|m| m.body.clone()).collect();
    assert_eq!(bodies, ["kept"]);
}
