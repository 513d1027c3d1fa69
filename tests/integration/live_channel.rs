//! End-to-end live channel: messages sent while a conversation is open
//! arrive over the push socket and land in the store exactly once, in
//! order, and only for the active pair. Losing the socket is terminal
//! for the activation.

use std::sync::Arc;
use std::time::Duration;

use pairchat::api::Backend;
use pairchat::api::rest::RestBackend;
use pairchat::convo::store::{LoadState, SharedStore};
use pairchat::session::{ChatSession, SessionOptions};
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

async fn wait_for_len(store: &SharedStore, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if store.lock().len() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let actual = store.lock().len();
    panic!("store has {actual} entries, expected {expected}");
}

// ===========================================================================
// Delivery and filtering
// ===========================================================================

#[tokio::test]
async fn incoming_messages_arrive_over_the_push_socket() {
    let (base, ws, _server) = start_server().await;

    let session = session(backend(&base, "alice"), "alice", Some(ws));
    let (store, _events) = session.activate(&UserId::new("bob")).await.unwrap();
    wait_until_loaded(&store).await;
    assert!(session.channel_connected());

    // Bob sends from his own client.
    let bob = backend(&base, "bob");
    bob.send_message(&UserId::new("alice"), "hi alice").await.unwrap();

    wait_for_len(&store, 1).await;
    let bodies: Vec<String> = store.lock().messages().map(|m| m.body.clone()).collect();
    assert_eq!(bodies, ["hi alice"]);
}

#[tokio::test]
async fn third_party_traffic_never_enters_the_active_conversation() {
    let (base, ws, _server) = start_server().await;

    let session = session(backend(&base, "alice"), "alice", Some(ws));
    let (store, _events) = session.activate(&UserId::new("bob")).await.unwrap();
    wait_until_loaded(&store).await;

    // Carol messages alice while the bob conversation is open.
    let carol = backend(&base, "carol");
    carol
        .send_message(&UserId::new("alice"), "wrong thread")
        .await
        .unwrap();

    // Then bob sends, which must be the only thing that lands.
    let bob = backend(&base, "bob");
    bob.send_message(&UserId::new("alice"), "right thread").await.unwrap();

    wait_for_len(&store, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let bodies: Vec<String> = store.lock().messages().map(|m| m.body.clone()).collect();
    assert_eq!(bodies, ["right thread"]);
}

#[tokio::test]
async fn live_messages_append_after_seeded_history() {
    let (base, ws, _server) = start_server().await;
    let alice = backend(&base, "alice");
    let bob = backend(&base, "bob");

    // Pre-existing thread.
    alice.send_message(&UserId::new("bob"), "older").await.unwrap();
    bob.send_message(&UserId::new("alice"), "old").await.unwrap();

    let session = session(Arc::clone(&alice), "alice", Some(ws));
    let (store, _events) = session.activate(&UserId::new("bob")).await.unwrap();
    wait_until_loaded(&store).await;

    bob.send_message(&UserId::new("alice"), "new").await.unwrap();
    wait_for_len(&store, 3).await;

    let bodies: Vec<String> = store.lock().messages().map(|m| m.body.clone()).collect();
    assert_eq!(bodies, ["older", "old", "new"]);
}

// ===========================================================================
// Terminal disconnect
// ===========================================================================

#[tokio::test]
async fn losing_the_socket_is_terminal_for_the_activation() {
    let (base, ws, server) = start_server().await;

    let session = session(backend(&base, "alice"), "alice", Some(ws));
    let (store, _events) = session.activate(&UserId::new("bob")).await.unwrap();
    wait_until_loaded(&store).await;
    assert!(session.channel_connected());

    // Kill the server; the reader should detect the drop and stay down.
    server.abort();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if !session.channel_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!session.channel_connected());

    // No reconnect happens.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!session.channel_connected());
}

#[tokio::test]
async fn session_without_push_endpoint_runs_history_only() {
    let (base, _ws, _server) = start_server().await;

    let session = session(backend(&base, "alice"), "alice", None);
    let (store, _events) = session.activate(&UserId::new("bob")).await.unwrap();
    wait_until_loaded(&store).await;

    assert!(!session.channel_connected());
    assert_eq!(store.lock().state(), LoadState::Ready);
}
