//! Backend collaborator seam.
//!
//! Defines the [`Backend`] trait the client core talks through. Concrete
//! implementations:
//! - [`rest::RestBackend`] — HTTP client against the real backend
//! - [`stub::StubBackend`] — in-process, failure-injectable stub for tests

pub mod rest;
pub mod stub;

use pairchat_proto::connection::{Connection, ConnectionId, ConnectionStatus};
use pairchat_proto::message::{Message, MessageId, UserId};

/// Errors surfaced by backend collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response (network, DNS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with an error status.
    #[error("request rejected (status {status}): {detail}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Backend-provided detail string, if any.
        detail: String,
    },

    /// The response body did not match the expected contract.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Async interface to the authoritative backend.
///
/// The core never constructs server state itself: history, confirmed
/// messages, and connection rows all come back through these methods.
/// History is returned newest-first, exactly as the backend orders it;
/// callers that present oldest-to-newest are responsible for reversing.
pub trait Backend: Send + Sync {
    /// Fetch the most recent messages exchanged with `other`, newest first.
    fn fetch_history(
        &self,
        other: &UserId,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, ApiError>> + Send;

    /// Persist a new message to `receiver` and return the confirmed record
    /// (server-assigned id and timestamp).
    fn send_message(
        &self,
        receiver: &UserId,
        body: &str,
    ) -> impl std::future::Future<Output = Result<Message, ApiError>> + Send;

    /// Mark a received message as read.
    fn mark_read(
        &self,
        id: &MessageId,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// List the current user's connections, optionally filtered by status.
    fn list_connections(
        &self,
        status: Option<ConnectionStatus>,
    ) -> impl std::future::Future<Output = Result<Vec<Connection>, ApiError>> + Send;

    /// Request a connection with `target`. Returns the created (or already
    /// existing) row rendered relative to the current user.
    fn request_connection(
        &self,
        target: &UserId,
    ) -> impl std::future::Future<Output = Result<Connection, ApiError>> + Send;

    /// Accept a pending incoming connection request.
    fn accept_connection(
        &self,
        id: &ConnectionId,
    ) -> impl std::future::Future<Output = Result<Connection, ApiError>> + Send;
}
