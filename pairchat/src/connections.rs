//! Connection roster: the user's contact relationships and their
//! lifecycle.
//!
//! A connection moves `pending -> accepted`, and only the addressee of a
//! pending request may accept it. The roster enforces that locally before
//! calling the backend, so an impossible transition is rejected as a
//! no-op instead of producing a doomed request. Accepting re-fetches the
//! full list, since an accepted row changes shape (its direction
//! disappears) and the authoritative rendering comes from the server.

use parking_lot::Mutex;
use tokio::sync::mpsc;

use pairchat_proto::connection::{Connection, ConnectionId, ConnectionStatus};
use pairchat_proto::message::UserId;

use crate::api::{ApiError, Backend};

/// Errors from roster operations.
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    /// The backend call failed; local state is unchanged.
    #[error("connection operation failed: {0}")]
    Api(#[from] ApiError),

    /// The requested lifecycle transition is not possible from the
    /// current state. Local state is unchanged and no request was made.
    #[error("invalid connection transition: {reason}")]
    InvalidTransition {
        /// Why the transition was rejected.
        reason: &'static str,
    },
}

/// Change notification emitted to roster subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterEvent {
    /// The roster was replaced with a fresh listing.
    Refreshed {
        /// Number of rows after the refresh.
        count: usize,
    },
    /// An outgoing request was recorded.
    Requested {
        /// The (new or pre-existing) connection's ID.
        id: ConnectionId,
    },
    /// An incoming request was accepted.
    Accepted {
        /// The accepted connection's ID.
        id: ConnectionId,
    },
}

/// The user's connection list and its lifecycle operations.
pub struct ConnectionRoster {
    rows: Mutex<Vec<Connection>>,
    event_tx: mpsc::Sender<RosterEvent>,
}

impl ConnectionRoster {
    /// Creates an empty roster and the receiver for its notifications.
    #[must_use]
    pub fn new(event_buffer: usize) -> (Self, mpsc::Receiver<RosterEvent>) {
        let (event_tx, event_rx) = mpsc::channel(event_buffer);
        let roster = Self {
            rows: Mutex::new(Vec::new()),
            event_tx,
        };
        (roster, event_rx)
    }

    /// All known rows, in server order.
    #[must_use]
    pub fn all(&self) -> Vec<Connection> {
        self.rows.lock().clone()
    }

    /// Accepted connections only.
    #[must_use]
    pub fn accepted(&self) -> Vec<Connection> {
        self.rows
            .lock()
            .iter()
            .filter(|c| c.status == ConnectionStatus::Accepted)
            .cloned()
            .collect()
    }

    /// Pending requests awaiting this user's response.
    #[must_use]
    pub fn pending_incoming(&self) -> Vec<Connection> {
        self.rows
            .lock()
            .iter()
            .filter(|c| c.is_acceptable())
            .cloned()
            .collect()
    }

    /// Looks up a row by ID.
    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<Connection> {
        self.rows.lock().iter().find(|c| c.id == *id).cloned()
    }

    /// Replaces the roster with a fresh listing from the backend.
    ///
    /// # Errors
    ///
    /// Returns [`RosterError::Api`] on backend failure; the roster keeps
    /// its previous contents.
    pub async fn refresh<B: Backend>(
        &self,
        backend: &B,
        status: Option<ConnectionStatus>,
    ) -> Result<(), RosterError> {
        let listing = backend.list_connections(status).await?;
        let count = listing.len();
        *self.rows.lock() = listing;
        tracing::debug!(count, "connection roster refreshed");
        self.notify(RosterEvent::Refreshed { count });
        Ok(())
    }

    /// Requests a connection with `target` and records the returned row.
    ///
    /// The backend returns the existing row for a duplicate request, so
    /// the roster upserts by ID rather than appending blindly.
    ///
    /// # Errors
    ///
    /// Returns [`RosterError::Api`] on backend failure or rejection.
    pub async fn request<B: Backend>(
        &self,
        backend: &B,
        target: &UserId,
    ) -> Result<Connection, RosterError> {
        let row = backend.request_connection(target).await?;
        let id = row.id.clone();
        {
            let mut rows = self.rows.lock();
            match rows.iter_mut().find(|c| c.id == id) {
                Some(existing) => *existing = row.clone(),
                None => rows.push(row.clone()),
            }
        }
        tracing::info!(id = %id, target = %target, "connection requested");
        self.notify(RosterEvent::Requested { id });
        Ok(row)
    }

    /// Accepts a pending incoming request, then re-fetches the roster.
    ///
    /// # Errors
    ///
    /// - [`RosterError::InvalidTransition`] if the row is unknown, already
    ///   accepted, or an outgoing request. Nothing is sent and local state
    ///   is unchanged.
    /// - [`RosterError::Api`] on backend failure.
    pub async fn accept<B: Backend>(
        &self,
        backend: &B,
        id: &ConnectionId,
    ) -> Result<Connection, RosterError> {
        {
            let rows = self.rows.lock();
            let Some(row) = rows.iter().find(|c| c.id == *id) else {
                return Err(RosterError::InvalidTransition {
                    reason: "unknown connection",
                });
            };
            if row.status == ConnectionStatus::Accepted {
                return Err(RosterError::InvalidTransition {
                    reason: "connection already accepted",
                });
            }
            if !row.is_acceptable() {
                return Err(RosterError::InvalidTransition {
                    reason: "only the addressee can accept a pending request",
                });
            }
        }

        let accepted = backend.accept_connection(id).await?;
        tracing::info!(id = %id, "connection accepted");
        self.notify(RosterEvent::Accepted { id: id.clone() });

        // The authoritative rendering comes from a fresh listing.
        self.refresh(backend, None).await?;
        Ok(accepted)
    }

    fn notify(&self, event: RosterEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            tracing::debug!(error = %e, "roster event dropped");
        }
    }
}
