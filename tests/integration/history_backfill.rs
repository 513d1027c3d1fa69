//! End-to-end history backfill: a session opening a conversation against
//! the dev server fetches the recent thread and presents it oldest to
//! newest, with failures reflected in the store's load state rather than
//! partial contents.

use std::sync::Arc;
use std::time::Duration;

use pairchat::api::rest::RestBackend;
use pairchat::convo::store::{LoadState, SharedStore};
use pairchat::session::{ChatSession, SessionOptions};
use pairchat_proto::message::UserId;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn start_server() -> (String, tokio::task::JoinHandle<()>) {
    let (addr, handle) = pairchat_devserver::server::start_server("127.0.0.1:0")
        .await
        .expect("failed to start dev server");
    (format!("http://{addr}"), handle)
}

/// The dev server treats the bearer token as the user ID.
fn backend(base: &str, user: &str) -> Arc<RestBackend> {
    Arc::new(RestBackend::new(base, user).expect("failed to build backend"))
}

fn session(backend: Arc<RestBackend>, me: &str) -> ChatSession<RestBackend> {
    ChatSession::new(backend, UserId::new(me), SessionOptions::default())
}

async fn wait_until_loaded(store: &SharedStore) -> LoadState {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        let state = store.lock().state();
        if state != LoadState::Loading {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("store never left the loading state");
}

// ===========================================================================
// Backfill ordering and scoping
// ===========================================================================

#[tokio::test]
async fn opening_a_conversation_seeds_it_oldest_to_newest() {
    let (base, _server) = start_server().await;
    let alice_backend = backend(&base, "alice");
    let bob_backend = backend(&base, "bob");

    // Build up a thread before alice opens it.
    for (b, other, body) in [
        (&alice_backend, "bob", "first"),
        (&bob_backend, "alice", "second"),
        (&alice_backend, "bob", "third"),
    ] {
        use pairchat::api::Backend;
        b.send_message(&UserId::new(other), body).await.unwrap();
    }

    let session = session(alice_backend, "alice");
    let (store, _events) = session.activate(&UserId::new("bob")).await.unwrap();
    assert_eq!(wait_until_loaded(&store).await, LoadState::Ready);

    let bodies: Vec<String> = store.lock().messages().map(|m| m.body.clone()).collect();
    assert_eq!(bodies, ["first", "second", "third"]);
}

#[tokio::test]
async fn backfill_excludes_other_conversations() {
    let (base, _server) = start_server().await;
    let alice_backend = backend(&base, "alice");
    let carol_backend = backend(&base, "carol");

    {
        use pairchat::api::Backend;
        alice_backend
            .send_message(&UserId::new("bob"), "for bob")
            .await
            .unwrap();
        carol_backend
            .send_message(&UserId::new("alice"), "from carol")
            .await
            .unwrap();
    }

    let session = session(alice_backend, "alice");
    let (store, _events) = session.activate(&UserId::new("bob")).await.unwrap();
    wait_until_loaded(&store).await;

    let bodies: Vec<String> = store.lock().messages().map(|m| m.body.clone()).collect();
    assert_eq!(bodies, ["for bob"]);
}

#[tokio::test]
async fn history_limit_keeps_the_most_recent_messages() {
    let (base, _server) = start_server().await;
    let alice_backend = backend(&base, "alice");

    {
        use pairchat::api::Backend;
        for i in 0..6 {
            alice_backend
                .send_message(&UserId::new("bob"), &format!("msg {i}"))
                .await
                .unwrap();
        }
    }

    let session = ChatSession::new(
        alice_backend,
        UserId::new("alice"),
        SessionOptions {
            history_limit: 3,
            ..SessionOptions::default()
        },
    );
    let (store, _events) = session.activate(&UserId::new("bob")).await.unwrap();
    wait_until_loaded(&store).await;

    let bodies: Vec<String> = store.lock().messages().map(|m| m.body.clone()).collect();
    assert_eq!(bodies, ["msg 3", "msg 4", "msg 5"]);
}

// ===========================================================================
// Failure handling
// ===========================================================================

#[tokio::test]
async fn unreachable_backend_marks_the_store_failed() {
    // Nothing is listening here.
    let backend = backend("http://127.0.0.1:1", "alice");
    let session = session(backend, "alice");

    let (store, _events) = session.activate(&UserId::new("bob")).await.unwrap();
    assert_eq!(wait_until_loaded(&store).await, LoadState::Failed);
    assert!(store.lock().is_empty());
}

#[tokio::test]
async fn switching_conversations_discards_the_old_store() {
    let (base, _server) = start_server().await;
    let alice_backend = backend(&base, "alice");

    {
        use pairchat::api::Backend;
        alice_backend
            .send_message(&UserId::new("bob"), "bob thread")
            .await
            .unwrap();
        alice_backend
            .send_message(&UserId::new("carol"), "carol thread")
            .await
            .unwrap();
    }

    let session = session(alice_backend, "alice");
    let (bob_store, _e1) = session.activate(&UserId::new("bob")).await.unwrap();
    wait_until_loaded(&bob_store).await;

    let (carol_store, _e2) = session.activate(&UserId::new("carol")).await.unwrap();
    wait_until_loaded(&carol_store).await;

    assert!(!Arc::ptr_eq(&bob_store, &carol_store));
    let bodies: Vec<String> = carol_store
        .lock()
        .messages()
        .map(|m| m.body.clone())
        .collect();
    assert_eq!(bodies, ["carol thread"]);
}
