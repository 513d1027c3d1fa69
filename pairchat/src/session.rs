//! Session-scoped chat context.
//!
//! A [`ChatSession`] owns everything belonging to one signed-in user:
//! the backend handle, the connection roster, and at most one active
//! conversation. Activating a conversation builds a fresh store, starts
//! the history backfill, and opens the live channel; activating another
//! (or deactivating) tears all of that down first, so state can never
//! leak between conversations and a late history response for a previous
//! activation is discarded rather than applied.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use pairchat_proto::message::{MessageId, UserId};

use crate::api::{ApiError, Backend};
use crate::channel::LiveChannel;
use crate::config::ClientConfig;
use crate::connections::{ConnectionRoster, RosterEvent};
use crate::convo::ConversationPair;
use crate::convo::history::{self, ActivationCounter};
use crate::convo::send::{self, SendError};
use crate::convo::store::{ConversationStore, SharedStore, StoreEvent};

/// Tunables for a [`ChatSession`], typically derived from a resolved
/// [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Base `ws://` URL of the push endpoint, or `None` to run without
    /// live updates.
    pub ws_base: Option<String>,
    /// Number of recent messages fetched when a conversation opens.
    pub history_limit: usize,
    /// Timeout for establishing the live channel.
    pub connect_timeout: Duration,
    /// Buffer size for store and roster notification channels.
    pub event_buffer: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            ws_base: None,
            history_limit: 50,
            connect_timeout: Duration::from_secs(10),
            event_buffer: 64,
        }
    }
}

impl From<&ClientConfig> for SessionOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            ws_base: config.ws_url.clone(),
            history_limit: config.history_limit,
            connect_timeout: config.connect_timeout,
            event_buffer: config.event_buffer,
        }
    }
}

/// Errors from session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operation needs an active conversation and there is none.
    #[error("no active conversation")]
    NoActiveConversation,

    /// The conversation cannot be with the session's own user.
    #[error("cannot open a conversation with yourself")]
    SelfConversation,

    /// A backend call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The optimistic send flow failed.
    #[error(transparent)]
    Send(#[from] SendError),
}

struct ActiveConversation {
    other: UserId,
    store: SharedStore,
    loader: tokio::task::JoinHandle<()>,
    /// `None` when the session runs without a push endpoint, or when the
    /// terminal channel has been lost.
    channel: Option<LiveChannel>,
}

impl Drop for ActiveConversation {
    fn drop(&mut self) {
        self.loader.abort();
        // The channel aborts its own reader on drop.
    }
}

/// One signed-in user's chat context.
///
/// All state lives on the session instance; two sessions in one process
/// are fully independent.
pub struct ChatSession<B: Backend + 'static> {
    backend: Arc<B>,
    me: UserId,
    options: SessionOptions,
    counter: ActivationCounter,
    roster: ConnectionRoster,
    roster_events: Mutex<Option<mpsc::Receiver<RosterEvent>>>,
    active: Mutex<Option<ActiveConversation>>,
}

impl<B: Backend + 'static> ChatSession<B> {
    /// Creates a session for `me` against the given backend.
    #[must_use]
    pub fn new(backend: Arc<B>, me: UserId, options: SessionOptions) -> Self {
        let (roster, roster_rx) = ConnectionRoster::new(options.event_buffer);
        Self {
            backend,
            me,
            options,
            counter: ActivationCounter::new(),
            roster,
            roster_events: Mutex::new(Some(roster_rx)),
            active: Mutex::new(None),
        }
    }

    /// The session's own user.
    #[must_use]
    pub const fn me(&self) -> &UserId {
        &self.me
    }

    /// The session's connection roster.
    #[must_use]
    pub const fn roster(&self) -> &ConnectionRoster {
        &self.roster
    }

    /// Takes the roster notification receiver. Returns `None` after the
    /// first call.
    pub fn take_roster_events(&self) -> Option<mpsc::Receiver<RosterEvent>> {
        self.roster_events.lock().take()
    }

    /// The store of the active conversation, if one is open.
    #[must_use]
    pub fn active_store(&self) -> Option<SharedStore> {
        self.active.lock().as_ref().map(|a| Arc::clone(&a.store))
    }

    /// The counterpart of the active conversation, if one is open.
    #[must_use]
    pub fn active_other(&self) -> Option<UserId> {
        self.active.lock().as_ref().map(|a| a.other.clone())
    }

    /// Returns `true` while the active conversation's live channel is up.
    #[must_use]
    pub fn channel_connected(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .and_then(|a| a.channel.as_ref())
            .is_some_and(LiveChannel::is_connected)
    }

    /// Opens the conversation with `other`, replacing any previous one.
    ///
    /// Builds a fresh store, spawns the history backfill, and opens the
    /// live channel. The previous activation's fetch and channel are torn
    /// down first. A failed channel connect degrades to history-only mode
    /// with a warning rather than failing the activation; a failed
    /// backfill is reflected in the store's load state.
    ///
    /// Returns the new store and the receiver for its change events.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SelfConversation`] if `other` is the
    /// session's own user.
    pub async fn activate(
        &self,
        other: &UserId,
    ) -> Result<(SharedStore, mpsc::Receiver<StoreEvent>), SessionError> {
        if *other == self.me {
            return Err(SessionError::SelfConversation);
        }

        // End the previous activation before starting the new one.
        self.deactivate();

        let pair = ConversationPair::new(self.me.clone(), other.clone());
        let (store, events) = ConversationStore::new(pair.clone(), self.options.event_buffer);
        let store: SharedStore = Arc::new(Mutex::new(store));

        let guard = self.counter.next_activation();
        let loader = {
            let backend = Arc::clone(&self.backend);
            let store = Arc::clone(&store);
            let other = other.clone();
            let limit = self.options.history_limit;
            tokio::spawn(async move {
                let _ = history::backfill(&*backend, &store, &guard, &other, limit).await;
            })
        };

        let channel = match &self.options.ws_base {
            Some(base) => {
                let url = format!("{}/ws/chat/{}", base.trim_end_matches('/'), self.me);
                match LiveChannel::connect(
                    &url,
                    pair,
                    Arc::clone(&store),
                    self.options.connect_timeout,
                )
                .await
                {
                    Ok(channel) => Some(channel),
                    Err(err) => {
                        tracing::warn!(error = %err, "live channel unavailable, history only");
                        None
                    }
                }
            }
            None => None,
        };

        tracing::info!(me = %self.me, other = %other, "conversation activated");
        *self.active.lock() = Some(ActiveConversation {
            other: other.clone(),
            store: Arc::clone(&store),
            loader,
            channel,
        });

        Ok((store, events))
    }

    /// Closes the active conversation, if any.
    ///
    /// Aborts the in-flight backfill, invalidates its activation so a
    /// response that already left the backend is discarded, and drops the
    /// live channel.
    pub fn deactivate(&self) {
        if let Some(previous) = self.active.lock().take() {
            tracing::debug!(other = %previous.other, "conversation deactivated");
        }
        // Invalidate any fetch still referencing the old activation.
        drop(self.counter.next_activation());
    }

    /// Sends `body` in the active conversation.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NoActiveConversation`] if nothing is active.
    /// - [`SessionError::Send`] for validation or backend failures.
    pub async fn send(&self, body: &str) -> Result<MessageId, SessionError> {
        let (store, other) = {
            let active = self.active.lock();
            let active = active.as_ref().ok_or(SessionError::NoActiveConversation)?;
            (Arc::clone(&active.store), active.other.clone())
        };
        let id = send::send(&*self.backend, &store, &self.me, &other, body).await?;
        Ok(id)
    }

    /// Marks a received message as read, on the server first and then in
    /// the active store.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NoActiveConversation`] if nothing is active.
    /// - [`SessionError::Api`] if the backend rejects the update.
    pub async fn mark_read(&self, id: &MessageId) -> Result<(), SessionError> {
        let store = self.active_store().ok_or(SessionError::NoActiveConversation)?;
        self.backend.mark_read(id).await?;
        store.lock().mark_read(id);
        Ok(())
    }
}

impl<B: Backend + 'static> Drop for ChatSession<B> {
    fn drop(&mut self) {
        self.deactivate();
    }
}
