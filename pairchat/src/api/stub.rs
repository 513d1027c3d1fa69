//! In-process stub backend for tests.
//!
//! Holds messages and connection rows in memory and renders them the way
//! the real backend does (history newest-first, connections relative to
//! the current user). Individual operations can be made to fail to
//! exercise error paths.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use pairchat_proto::connection::{
    Connection, ConnectionId, ConnectionStatus, Direction, ProfileBrief,
};
use pairchat_proto::message::{Message, MessageId, UserId};

use super::{ApiError, Backend};

/// A raw connection row, stored the way the backend's table stores it.
#[derive(Debug, Clone)]
struct ConnectionRow {
    id: String,
    requester: UserId,
    addressee: UserId,
    status: ConnectionStatus,
}

#[derive(Debug, Default)]
struct StubState {
    messages: Vec<Message>,
    connections: Vec<ConnectionRow>,
}

/// In-memory [`Backend`] implementation.
///
/// All state is process-local. `fail_*` switches make the corresponding
/// operation return a transport error so callers' degradation paths can
/// be tested deterministically.
pub struct StubBackend {
    me: UserId,
    state: Mutex<StubState>,
    next_id: AtomicU64,
    fail_history: AtomicBool,
    fail_send: AtomicBool,
    fail_connections: AtomicBool,
}

impl StubBackend {
    /// Creates an empty stub acting on behalf of `me`.
    pub fn new(me: impl Into<UserId>) -> Self {
        Self {
            me: me.into(),
            state: Mutex::new(StubState::default()),
            next_id: AtomicU64::new(1),
            fail_history: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            fail_connections: AtomicBool::new(false),
        }
    }

    fn alloc_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}{n}")
    }

    /// Make `fetch_history` fail with a transport error.
    pub fn set_history_failing(&self, fail: bool) {
        self.fail_history.store(fail, Ordering::SeqCst);
    }

    /// Make `send_message` fail with a transport error.
    pub fn set_send_failing(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    /// Make the connection operations fail with a transport error.
    pub fn set_connections_failing(&self, fail: bool) {
        self.fail_connections.store(fail, Ordering::SeqCst);
    }

    /// Inserts a pre-existing message, as if another client had sent it
    /// earlier. Returns the stored record.
    pub fn seed_message(
        &self,
        sender: &UserId,
        receiver: &UserId,
        body: &str,
        created_at: DateTime<Utc>,
    ) -> Message {
        let msg = Message {
            id: MessageId::new(self.alloc_id("m")),
            sender_id: sender.clone(),
            receiver_id: receiver.clone(),
            body: body.to_string(),
            created_at,
            read: false,
            conversation_id: None,
        };
        self.state.lock().messages.push(msg.clone());
        msg
    }

    /// Inserts a raw connection row between two users.
    pub fn seed_connection(
        &self,
        requester: &UserId,
        addressee: &UserId,
        status: ConnectionStatus,
    ) -> ConnectionId {
        let id = self.alloc_id("c");
        self.state.lock().connections.push(ConnectionRow {
            id: id.clone(),
            requester: requester.clone(),
            addressee: addressee.clone(),
            status,
        });
        ConnectionId::new(id)
    }

    /// Renders a row relative to `self.me`, the way the backend does.
    fn render(&self, row: &ConnectionRow) -> Connection {
        let (direction, counterpart) = if row.requester == self.me {
            (Direction::Outgoing, &row.addressee)
        } else {
            (Direction::Incoming, &row.requester)
        };
        Connection {
            id: ConnectionId::new(row.id.clone()),
            status: row.status,
            direction: (row.status == ConnectionStatus::Pending).then_some(direction),
            self_profile: Some(brief(&self.me)),
            other: Some(brief(counterpart)),
        }
    }
}

fn brief(user: &UserId) -> ProfileBrief {
    ProfileBrief {
        id: user.clone(),
        username: Some(user.as_str().to_string()),
        first_name: None,
        last_name: None,
    }
}

fn involves(msg: &Message, a: &UserId, b: &UserId) -> bool {
    (msg.sender_id == *a && msg.receiver_id == *b) || (msg.sender_id == *b && msg.receiver_id == *a)
}

impl Backend for StubBackend {
    async fn fetch_history(
        &self,
        other: &UserId,
        limit: usize,
    ) -> Result<Vec<Message>, ApiError> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("stub history failure".into()));
        }
        let state = self.state.lock();
        let mut batch: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| involves(m, &self.me, other))
            .cloned()
            .collect();
        // Newest first, matching the backend's descending order.
        batch.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        batch.truncate(limit);
        Ok(batch)
    }

    async fn send_message(&self, receiver: &UserId, body: &str) -> Result<Message, ApiError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("stub send failure".into()));
        }
        if *receiver == self.me {
            return Err(ApiError::Rejected {
                status: 400,
                detail: "Cannot message yourself".into(),
            });
        }
        let msg = Message {
            id: MessageId::new(self.alloc_id("m")),
            sender_id: self.me.clone(),
            receiver_id: receiver.clone(),
            body: body.to_string(),
            created_at: Utc::now(),
            read: false,
            conversation_id: None,
        };
        self.state.lock().messages.push(msg.clone());
        Ok(msg)
    }

    async fn mark_read(&self, id: &MessageId) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        match state
            .messages
            .iter_mut()
            .find(|m| m.id == *id && m.receiver_id == self.me)
        {
            Some(msg) => {
                msg.read = true;
                Ok(())
            }
            None => Err(ApiError::Rejected {
                status: 404,
                detail: "Message not found or not yours".into(),
            }),
        }
    }

    async fn list_connections(
        &self,
        status: Option<ConnectionStatus>,
    ) -> Result<Vec<Connection>, ApiError> {
        if self.fail_connections.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("stub connections failure".into()));
        }
        let state = self.state.lock();
        Ok(state
            .connections
            .iter()
            .filter(|row| row.requester == self.me || row.addressee == self.me)
            .filter(|row| status.is_none_or(|s| row.status == s))
            .map(|row| self.render(row))
            .collect())
    }

    async fn request_connection(&self, target: &UserId) -> Result<Connection, ApiError> {
        if self.fail_connections.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("stub connections failure".into()));
        }
        if *target == self.me {
            return Err(ApiError::Rejected {
                status: 400,
                detail: "Cannot connect to self".into(),
            });
        }
        let mut state = self.state.lock();
        // Duplicate requests return the existing row, like the unique
        // constraint path in the backend.
        if let Some(row) = state.connections.iter().find(|row| {
            (row.requester == self.me && row.addressee == *target)
                || (row.requester == *target && row.addressee == self.me)
        }) {
            let rendered = self.render(row);
            return Ok(rendered);
        }
        let row = ConnectionRow {
            id: self.alloc_id("c"),
            requester: self.me.clone(),
            addressee: target.clone(),
            status: ConnectionStatus::Pending,
        };
        let rendered = self.render(&row);
        state.connections.push(row);
        Ok(rendered)
    }

    async fn accept_connection(&self, id: &ConnectionId) -> Result<Connection, ApiError> {
        if self.fail_connections.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("stub connections failure".into()));
        }
        let mut state = self.state.lock();
        let Some(row) = state.connections.iter_mut().find(|row| row.id == id.as_str()) else {
            return Err(ApiError::Rejected {
                status: 404,
                detail: "Connection not found".into(),
            });
        };
        if row.addressee != self.me {
            return Err(ApiError::Rejected {
                status: 403,
                detail: "Not authorized to respond".into(),
            });
        }
        row.status = ConnectionStatus::Accepted;
        let row = row.clone();
        Ok(self.render(&row))
    }
}
