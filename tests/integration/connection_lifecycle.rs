//! End-to-end connection lifecycle: request from one side, accept from
//! the other, with the pending -> accepted transition enforced and
//! impossible transitions rejected locally as no-ops.

use std::sync::Arc;

use pairchat::api::rest::RestBackend;
use pairchat::connections::{ConnectionRoster, RosterError};
use pairchat_proto::connection::{ConnectionId, ConnectionStatus, Direction};
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

fn backend(base: &str, user: &str) -> Arc<RestBackend> {
    Arc::new(RestBackend::new(base, user).expect("failed to build backend"))
}

// ===========================================================================
// Request and accept
// ===========================================================================

#[tokio::test]
async fn request_is_pending_outgoing_for_the_requester() {
    let (base, _server) = start_server().await;
    let alice = backend(&base, "alice");
    let (roster, _rx) = ConnectionRoster::new(16);

    let row = roster.request(&*alice, &UserId::new("bob")).await.unwrap();
    assert_eq!(row.status, ConnectionStatus::Pending);
    assert_eq!(row.direction, Some(Direction::Outgoing));
    assert_eq!(row.other_user(), Some(&UserId::new("bob")));
}

#[tokio::test]
async fn addressee_sees_the_request_as_pending_incoming() {
    let (base, _server) = start_server().await;
    let alice = backend(&base, "alice");
    let bob = backend(&base, "bob");

    let (alice_roster, _a_rx) = ConnectionRoster::new(16);
    alice_roster
        .request(&*alice, &UserId::new("bob"))
        .await
        .unwrap();

    let (bob_roster, _b_rx) = ConnectionRoster::new(16);
    bob_roster.refresh(&*bob, None).await.unwrap();

    let incoming = bob_roster.pending_incoming();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].other_user(), Some(&UserId::new("alice")));
}

#[tokio::test]
async fn accept_moves_both_sides_to_accepted() {
    let (base, _server) = start_server().await;
    let alice = backend(&base, "alice");
    let bob = backend(&base, "bob");

    let (alice_roster, _a_rx) = ConnectionRoster::new(16);
    let row = alice_roster
        .request(&*alice, &UserId::new("bob"))
        .await
        .unwrap();

    let (bob_roster, _b_rx) = ConnectionRoster::new(16);
    bob_roster.refresh(&*bob, None).await.unwrap();
    let accepted = bob_roster.accept(&*bob, &row.id).await.unwrap();
    assert_eq!(accepted.status, ConnectionStatus::Accepted);
    // Accepted rows carry no direction.
    assert!(accepted.direction.is_none());

    // Bob's roster was refetched by accept; alice refreshes hers.
    assert_eq!(bob_roster.accepted().len(), 1);
    alice_roster.refresh(&*alice, None).await.unwrap();
    assert_eq!(alice_roster.accepted().len(), 1);
    assert!(alice_roster.pending_incoming().is_empty());
}

#[tokio::test]
async fn duplicate_request_resolves_to_the_same_connection() {
    let (base, _server) = start_server().await;
    let alice = backend(&base, "alice");
    let (roster, _rx) = ConnectionRoster::new(16);

    let first = roster.request(&*alice, &UserId::new("bob")).await.unwrap();
    let second = roster.request(&*alice, &UserId::new("bob")).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(roster.all().len(), 1);
}

// ===========================================================================
// Invalid transitions
// ===========================================================================

#[tokio::test]
async fn requester_cannot_accept_their_own_request() {
    let (base, _server) = start_server().await;
    let alice = backend(&base, "alice");
    let (roster, _rx) = ConnectionRoster::new(16);

    let row = roster.request(&*alice, &UserId::new("bob")).await.unwrap();
    let result = roster.accept(&*alice, &row.id).await;
    assert!(matches!(result, Err(RosterError::InvalidTransition { .. })));

    // State unchanged.
    assert_eq!(
        roster.get(&row.id).unwrap().status,
        ConnectionStatus::Pending
    );
}

#[tokio::test]
async fn accepting_an_unknown_connection_is_a_noop() {
    let (base, _server) = start_server().await;
    let alice = backend(&base, "alice");
    let (roster, _rx) = ConnectionRoster::new(16);

    let result = roster.accept(&*alice, &ConnectionId::new("nope")).await;
    assert!(matches!(result, Err(RosterError::InvalidTransition { .. })));
    assert!(roster.all().is_empty());
}

#[tokio::test]
async fn accepting_twice_is_rejected_locally() {
    let (base, _server) = start_server().await;
    let alice = backend(&base, "alice");
    let bob = backend(&base, "bob");

    let (alice_roster, _a_rx) = ConnectionRoster::new(16);
    let row = alice_roster
        .request(&*alice, &UserId::new("bob"))
        .await
        .unwrap();

    let (bob_roster, _b_rx) = ConnectionRoster::new(16);
    bob_roster.refresh(&*bob, None).await.unwrap();
    bob_roster.accept(&*bob, &row.id).await.unwrap();

    let result = bob_roster.accept(&*bob, &row.id).await;
    assert!(matches!(result, Err(RosterError::InvalidTransition { .. })));
}

// ===========================================================================
// Status filter
// ===========================================================================

#[tokio::test]
async fn refresh_with_status_filter_scopes_the_roster() {
    let (base, _server) = start_server().await;
    let alice = backend(&base, "alice");
    let bob = backend(&base, "bob");

    let (alice_roster, _a_rx) = ConnectionRoster::new(16);
    let row = alice_roster
        .request(&*alice, &UserId::new("bob"))
        .await
        .unwrap();
    alice_roster
        .request(&*alice, &UserId::new("carol"))
        .await
        .unwrap();

    let (bob_roster, _b_rx) = ConnectionRoster::new(16);
    bob_roster.refresh(&*bob, None).await.unwrap();
    bob_roster.accept(&*bob, &row.id).await.unwrap();

    alice_roster
        .refresh(&*alice, Some(ConnectionStatus::Accepted))
        .await
        .unwrap();
    assert_eq!(alice_roster.all().len(), 1);
    assert_eq!(alice_roster.all()[0].status, ConnectionStatus::Accepted);
}
