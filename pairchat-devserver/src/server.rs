//! Server core: shared state, REST routes, and the WebSocket push
//! endpoint.
//!
//! State lives in memory. Every saved message is broadcast as a JSON text
//! frame to all open sockets of both participants, which is what drives
//! the client's live channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message as WsFrame, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use pairchat_proto::connection::{
    Connection, ConnectionId, ConnectionStatus, Direction, ProfileBrief,
};
use pairchat_proto::message::{MAX_BODY_SIZE, Message, MessageId, UserId};

/// An error response carrying the backend's `detail` shape.
#[derive(Debug)]
pub struct Reject {
    status: StatusCode,
    detail: String,
}

impl Reject {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for Reject {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "detail": self.detail })),
        )
            .into_response()
    }
}

/// A connection row, stored the way the database table stores it.
#[derive(Debug, Clone)]
struct ConnectionRow {
    id: String,
    requester: UserId,
    addressee: UserId,
    status: ConnectionStatus,
}

#[derive(Default)]
struct Tables {
    messages: Vec<Message>,
    connections: Vec<ConnectionRow>,
}

/// Shared server state: tables plus the socket registry.
pub struct DevState {
    tables: Mutex<Tables>,
    /// Open push sockets per user. A user may have several (one per
    /// signed-in client); each entry pairs a socket ID with its sender.
    sockets: Mutex<HashMap<String, Vec<(u64, mpsc::UnboundedSender<WsFrame>)>>>,
    next_id: AtomicU64,
}

impl Default for DevState {
    fn default() -> Self {
        Self::new()
    }
}

impl DevState {
    /// Creates empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            sockets: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn alloc_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}{n}")
    }

    /// Saves a message and returns the stored record.
    ///
    /// # Errors
    ///
    /// Rejects self-sends and bodies that are empty or oversized.
    pub fn create_message(
        &self,
        sender: &UserId,
        receiver: &UserId,
        body: &str,
    ) -> Result<Message, Reject> {
        if sender == receiver {
            return Err(Reject::new(
                StatusCode::BAD_REQUEST,
                "Cannot message yourself",
            ));
        }
        let body = body.trim();
        if body.is_empty() {
            return Err(Reject::new(StatusCode::BAD_REQUEST, "Empty message body"));
        }
        if body.len() > MAX_BODY_SIZE {
            return Err(Reject::new(StatusCode::BAD_REQUEST, "Message too large"));
        }
        let msg = Message {
            id: MessageId::new(self.alloc_id("m")),
            sender_id: sender.clone(),
            receiver_id: receiver.clone(),
            body: body.to_string(),
            created_at: Utc::now(),
            read: false,
            conversation_id: None,
        };
        self.tables.lock().messages.push(msg.clone());
        Ok(msg)
    }

    /// The thread between `me` and `other`, newest first, at most `limit`.
    #[must_use]
    pub fn history(&self, me: &UserId, other: &UserId, limit: usize) -> Vec<Message> {
        let tables = self.tables.lock();
        let mut batch: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| {
                (m.sender_id == *me && m.receiver_id == *other)
                    || (m.sender_id == *other && m.receiver_id == *me)
            })
            .cloned()
            .collect();
        batch.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        batch.truncate(limit);
        batch
    }

    /// Flags a message read; only its receiver may do so.
    ///
    /// # Errors
    ///
    /// Rejects with 404 when the message is unknown or `me` is not its
    /// receiver.
    pub fn mark_read(&self, me: &UserId, id: &MessageId) -> Result<(), Reject> {
        let mut tables = self.tables.lock();
        match tables
            .messages
            .iter_mut()
            .find(|m| m.id == *id && m.receiver_id == *me)
        {
            Some(msg) => {
                msg.read = true;
                Ok(())
            }
            None => Err(Reject::new(
                StatusCode::NOT_FOUND,
                "Message not found or not yours",
            )),
        }
    }

    /// Lists `me`'s connections, rendered relative to `me`.
    #[must_use]
    pub fn list_connections(
        &self,
        me: &UserId,
        status: Option<ConnectionStatus>,
    ) -> Vec<Connection> {
        let tables = self.tables.lock();
        tables
            .connections
            .iter()
            .filter(|row| row.requester == *me || row.addressee == *me)
            .filter(|row| status.is_none_or(|s| row.status == s))
            .map(|row| render(row, me))
            .collect()
    }

    /// Creates a pending connection, or returns the existing row between
    /// the two users.
    ///
    /// # Errors
    ///
    /// Rejects self-connections.
    pub fn request_connection(
        &self,
        me: &UserId,
        addressee: &UserId,
    ) -> Result<Connection, Reject> {
        if me == addressee {
            return Err(Reject::new(
                StatusCode::BAD_REQUEST,
                "Cannot connect to self",
            ));
        }
        let mut tables = self.tables.lock();
        if let Some(row) = tables.connections.iter().find(|row| {
            (row.requester == *me && row.addressee == *addressee)
                || (row.requester == *addressee && row.addressee == *me)
        }) {
            return Ok(render(row, me));
        }
        let row = ConnectionRow {
            id: self.alloc_id("c"),
            requester: me.clone(),
            addressee: addressee.clone(),
            status: ConnectionStatus::Pending,
        };
        let rendered = render(&row, me);
        tables.connections.push(row);
        Ok(rendered)
    }

    /// Accepts a pending request; only its addressee may do so.
    ///
    /// # Errors
    ///
    /// - 404 for an unknown connection or unsupported action.
    /// - 403 when `me` is not the addressee.
    pub fn respond(
        &self,
        me: &UserId,
        id: &ConnectionId,
        action: &str,
    ) -> Result<Connection, Reject> {
        if action != "accept" {
            return Err(Reject::new(StatusCode::NOT_FOUND, "Unsupported action"));
        }
        let mut tables = self.tables.lock();
        let Some(row) = tables
            .connections
            .iter_mut()
            .find(|row| row.id == id.as_str())
        else {
            return Err(Reject::new(StatusCode::NOT_FOUND, "Connection not found"));
        };
        if row.addressee != *me {
            return Err(Reject::new(
                StatusCode::FORBIDDEN,
                "Not authorized to respond",
            ));
        }
        row.status = ConnectionStatus::Accepted;
        let row = row.clone();
        Ok(render(&row, me))
    }

    /// Registers a push socket for `user`, returning the socket ID and
    /// the frame receiver its writer task drains.
    fn register_socket(&self, user: &UserId) -> (u64, mpsc::UnboundedReceiver<WsFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let socket_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sockets
            .lock()
            .entry(user.as_str().to_string())
            .or_default()
            .push((socket_id, tx));
        (socket_id, rx)
    }

    fn unregister_socket(&self, user: &UserId, socket_id: u64) {
        let mut sockets = self.sockets.lock();
        if let Some(entries) = sockets.get_mut(user.as_str()) {
            entries.retain(|(id, _)| *id != socket_id);
            if entries.is_empty() {
                sockets.remove(user.as_str());
            }
        }
    }

    /// Pushes a saved message to every open socket of both participants.
    fn broadcast(&self, msg: &Message) {
        let Ok(text) = serde_json::to_string(msg) else {
            tracing::error!(id = %msg.id, "failed to serialize message for push");
            return;
        };
        let sockets = self.sockets.lock();
        for user in [&msg.sender_id, &msg.receiver_id] {
            if let Some(entries) = sockets.get(user.as_str()) {
                for (_, tx) in entries {
                    let _ = tx.send(WsFrame::Text(text.clone().into()));
                }
            }
        }
    }
}

/// Renders a row relative to the calling user, the way the API responds.
fn render(row: &ConnectionRow, me: &UserId) -> Connection {
    let (direction, counterpart) = if row.requester == *me {
        (Direction::Outgoing, &row.addressee)
    } else {
        (Direction::Incoming, &row.requester)
    };
    Connection {
        id: ConnectionId::new(row.id.clone()),
        status: row.status,
        direction: (row.status == ConnectionStatus::Pending).then_some(direction),
        self_profile: Some(brief(me)),
        other: Some(brief(counterpart)),
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

/// Resolves the caller from the bearer token. Development-grade: the
/// token is the user ID.
fn caller(headers: &HeaderMap) -> Result<UserId, Reject> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .map(UserId::new)
        .ok_or_else(|| Reject::new(StatusCode::UNAUTHORIZED, "Not authenticated"))
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

#[derive(serde::Deserialize)]
struct SendMessageBody {
    receiver_id: String,
    body: String,
}

#[derive(serde::Deserialize)]
struct HistoryQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

const fn default_limit() -> usize {
    50
}

#[derive(serde::Deserialize)]
struct ConnectionsQuery {
    status: Option<ConnectionStatus>,
}

#[derive(serde::Deserialize)]
struct RequestConnectionBody {
    addressee_id: String,
}

#[derive(serde::Deserialize)]
struct RespondBody {
    connection_id: String,
    action: String,
}

async fn send_message(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    Json(req): Json<SendMessageBody>,
) -> Result<Json<Message>, Reject> {
    let me = caller(&headers)?;
    let msg = state.create_message(&me, &UserId::new(req.receiver_id), &req.body)?;
    state.broadcast(&msg);
    Ok(Json(msg))
}

async fn message_history(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    Path(other): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Message>>, Reject> {
    let me = caller(&headers)?;
    Ok(Json(state.history(&me, &UserId::new(other), query.limit)))
}

async fn read_message(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, Reject> {
    let me = caller(&headers)?;
    state.mark_read(&me, &MessageId::new(id))?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn list_connections(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    Query(query): Query<ConnectionsQuery>,
) -> Result<Json<Vec<Connection>>, Reject> {
    let me = caller(&headers)?;
    Ok(Json(state.list_connections(&me, query.status)))
}

async fn request_connection(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    Json(req): Json<RequestConnectionBody>,
) -> Result<Json<Connection>, Reject> {
    let me = caller(&headers)?;
    let conn = state.request_connection(&me, &UserId::new(req.addressee_id))?;
    Ok(Json(conn))
}

async fn respond_connection(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    Json(req): Json<RespondBody>,
) -> Result<Json<Connection>, Reject> {
    let me = caller(&headers)?;
    let conn = state.respond(&me, &ConnectionId::new(req.connection_id), &req.action)?;
    Ok(Json(conn))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<DevState>>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, UserId::new(user_id)))
}

/// Runs one push socket: a writer task drains the user's frame channel,
/// the reader only watches for close. Unregisters on exit.
async fn handle_socket(socket: WebSocket, state: Arc<DevState>, user: UserId) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (socket_id, mut rx) = state.register_socket(&user);
    tracing::info!(user = %user, socket_id, "push socket open");

    let mut write_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(frame)) = ws_receiver.next().await {
            if matches!(frame, WsFrame::Close(_)) {
                break;
            }
            // The push channel is one-way; other frames are ignored.
        }
    });

    tokio::select! {
        _ = &mut read_task => write_task.abort(),
        _ = &mut write_task => read_task.abort(),
    }

    state.unregister_socket(&user, socket_id);
    tracing::info!(user = %user, socket_id, "push socket closed");
}

// ---------------------------------------------------------------------------
// Server entry points
// ---------------------------------------------------------------------------

/// Builds the router over the given state.
#[must_use]
pub fn router(state: Arc<DevState>) -> Router {
    Router::new()
        .route("/messages", post(send_message))
        .route("/messages/history/{other}", get(message_history))
        .route("/messages/read/{id}", post(read_message))
        .route("/connections", get(list_connections).post(request_connection))
        .route("/connections/respond", post(respond_connection))
        .route("/ws/chat/{user_id}", get(ws_handler))
        .with_state(state)
}

/// Starts the server on the given address and returns the bound address
/// and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(DevState::new())).await
}

/// Starts the server with pre-seeded state.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<DevState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "dev server error");
        }
    });

    Ok((bound_addr, handle))
}
