//! The conversation store: single source of truth for the ordered,
//! deduplicated message list of the active conversation.
//!
//! Three mutators exist, one per message source: [`ConversationStore::seed`]
//! (history backfill), [`ConversationStore::merge`] (live channel), and the
//! transient operations used by the optimistic send flow. Every operation
//! leaves the sequence non-decreasing by creation timestamp (ties keep
//! insertion order) and a set under server-ID equality. Subscribers are
//! notified through an mpsc channel only when the sequence actually changed.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use pairchat_proto::message::{Message, MessageId, UserId};

use super::ConversationPair;

/// Store handle shared between the history loader, live channel, and send
/// coordinator. `parking_lot::Mutex` because every operation is a short,
/// non-blocking sequence mutation.
pub type SharedStore = std::sync::Arc<parking_lot::Mutex<ConversationStore>>;

/// Client-local identifier for a not-yet-confirmed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalId(Uuid);

impl LocalId {
    /// Creates a fresh local identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LocalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A locally originated message awaiting server confirmation.
///
/// Has no server ID and therefore never compares equal to any confirmed
/// message. `created_at` is the local clock at composition time, a
/// placeholder that sorts the entry correctly among loaded history until
/// the confirmed record supersedes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientSend {
    /// Client-local identity, used to reconcile or withdraw the entry.
    pub local_id: LocalId,
    /// The current user.
    pub sender_id: UserId,
    /// The addressee.
    pub receiver_id: UserId,
    /// Trimmed message text.
    pub body: String,
    /// Local placeholder timestamp ("now" at creation).
    pub created_at: DateTime<Utc>,
}

impl TransientSend {
    /// Creates a transient entry timestamped with the local clock.
    #[must_use]
    pub fn new(sender_id: UserId, receiver_id: UserId, body: String) -> Self {
        Self {
            local_id: LocalId::new(),
            sender_id,
            receiver_id,
            body,
            created_at: Utc::now(),
        }
    }
}

/// One element of the stored sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A server-confirmed message.
    Confirmed(Message),
    /// A local send awaiting confirmation.
    Transient(TransientSend),
}

impl Entry {
    /// The timestamp this entry sorts by.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Confirmed(m) => m.created_at,
            Self::Transient(t) => t.created_at,
        }
    }

    /// The message text.
    #[must_use]
    pub fn body(&self) -> &str {
        match self {
            Self::Confirmed(m) => &m.body,
            Self::Transient(t) => &t.body,
        }
    }

    /// Who sent (or is sending) this message.
    #[must_use]
    pub const fn sender_id(&self) -> &UserId {
        match self {
            Self::Confirmed(m) => &m.sender_id,
            Self::Transient(t) => &t.sender_id,
        }
    }

    /// Returns `true` for a not-yet-confirmed local entry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// The confirmed message, if this entry has one.
    #[must_use]
    pub const fn as_confirmed(&self) -> Option<&Message> {
        match self {
            Self::Confirmed(m) => Some(m),
            Self::Transient(_) => None,
        }
    }
}

/// Backfill state of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// History fetch in flight (or not yet started).
    Loading,
    /// History seeded; live updates flowing.
    Ready,
    /// History fetch failed; the store holds no backfill.
    Failed,
}

/// Change notification emitted to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The store was replaced with a freshly fetched batch.
    Seeded {
        /// Number of messages after seeding.
        count: usize,
    },
    /// A confirmed message was inserted.
    Inserted {
        /// The inserted message's server ID.
        id: MessageId,
    },
    /// A transient local send was added.
    TransientAdded {
        /// The transient entry's local ID.
        local_id: LocalId,
    },
    /// A transient entry was superseded by its confirmed record.
    Reconciled {
        /// The reconciled entry's local ID.
        local_id: LocalId,
        /// The confirmed server ID.
        id: MessageId,
    },
    /// A transient entry was withdrawn after a failed send.
    TransientDropped {
        /// The withdrawn entry's local ID.
        local_id: LocalId,
    },
    /// A message's read flag was set.
    ReadMarked {
        /// The affected message's server ID.
        id: MessageId,
    },
    /// The history fetch for this store failed.
    LoadFailed,
}

/// Ordered, deduplicated message sequence for one conversation.
///
/// Owned by the active conversation's lifecycle; only the history loader,
/// live channel supervisor, and send coordinator mutate it, and only
/// through the operations below.
pub struct ConversationStore {
    pair: ConversationPair,
    entries: Vec<Entry>,
    state: LoadState,
    event_tx: mpsc::Sender<StoreEvent>,
}

impl ConversationStore {
    /// Creates an empty store in [`LoadState::Loading`] for the given pair.
    ///
    /// Returns the store and the receiver for its change notifications.
    #[must_use]
    pub fn new(pair: ConversationPair, event_buffer: usize) -> (Self, mpsc::Receiver<StoreEvent>) {
        let (event_tx, event_rx) = mpsc::channel(event_buffer);
        let store = Self {
            pair,
            entries: Vec::new(),
            state: LoadState::Loading,
            event_tx,
        };
        (store, event_rx)
    }

    /// The pair this store belongs to.
    #[must_use]
    pub const fn pair(&self) -> &ConversationPair {
        &self.pair
    }

    /// Current backfill state.
    #[must_use]
    pub const fn state(&self) -> LoadState {
        self.state
    }

    /// Number of entries, transient included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The stored sequence, oldest to newest.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Confirmed messages only, oldest to newest.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().filter_map(Entry::as_confirmed)
    }

    /// Returns `true` if a confirmed message with this ID is present.
    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.messages().any(|m| m.id == *id)
    }

    /// Replaces the store's contents with a freshly fetched batch.
    ///
    /// The batch is expected oldest-to-newest (the loader reverses the
    /// backend's descending order before calling this). A stable sort and
    /// an ID dedup pass keep the invariants intact even if the collaborator
    /// misbehaves. Moves the store to [`LoadState::Ready`].
    pub fn seed(&mut self, batch: Vec<Message>) {
        let mut seen = std::collections::HashSet::new();
        let mut entries: Vec<Entry> = batch
            .into_iter()
            .filter(|m| seen.insert(m.id.clone()))
            .map(Entry::Confirmed)
            .collect();
        entries.sort_by_key(Entry::created_at);
        self.entries = entries;
        self.state = LoadState::Ready;
        self.notify(StoreEvent::Seeded {
            count: self.entries.len(),
        });
    }

    /// Records that the backfill for this store failed.
    ///
    /// The store is left exactly as it was (normally empty) so a failed
    /// fetch can never corrupt ordering or dedup.
    pub fn mark_load_failed(&mut self) {
        self.state = LoadState::Failed;
        self.notify(StoreEvent::LoadFailed);
    }

    /// Inserts a confirmed message unless one with the same server ID is
    /// already present. Returns `true` if the sequence changed.
    ///
    /// Idempotent: merging the same confirmed message twice leaves the
    /// store unchanged and emits no second notification.
    pub fn merge(&mut self, msg: Message) -> bool {
        if self.contains(&msg.id) {
            return false;
        }
        let id = msg.id.clone();
        self.insert_ordered(Entry::Confirmed(msg));
        self.notify(StoreEvent::Inserted { id });
        true
    }

    /// Adds a transient local send at its placeholder timestamp.
    pub fn add_transient(&mut self, transient: TransientSend) {
        let local_id = transient.local_id;
        self.insert_ordered(Entry::Transient(transient));
        self.notify(StoreEvent::TransientAdded { local_id });
    }

    /// Swaps a transient entry for its confirmed record.
    ///
    /// The confirmed record ends up in the store whether or not the
    /// transient still exists: a history reseed can drop the transient
    /// while the send is in flight, and the push channel can deliver the
    /// confirmed record first. Neither interleaving loses the message or
    /// duplicates it. Returns `true` if a transient with `local_id` was
    /// reconciled.
    pub fn replace_transient(&mut self, local_id: &LocalId, confirmed: Message) -> bool {
        let reconciled = match self.position_of_transient(local_id) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        };
        let id = confirmed.id.clone();
        let inserted = if self.contains(&id) {
            false
        } else {
            self.insert_ordered(Entry::Confirmed(confirmed));
            true
        };
        if reconciled {
            self.notify(StoreEvent::Reconciled {
                local_id: *local_id,
                id,
            });
        } else if inserted {
            self.notify(StoreEvent::Inserted { id });
        }
        reconciled
    }

    /// Withdraws a transient entry after a failed send.
    ///
    /// Returns `false` if no transient with `local_id` exists.
    pub fn remove_transient(&mut self, local_id: &LocalId) -> bool {
        let Some(idx) = self.position_of_transient(local_id) else {
            return false;
        };
        self.entries.remove(idx);
        self.notify(StoreEvent::TransientDropped {
            local_id: *local_id,
        });
        true
    }

    /// Sets the read flag on a confirmed message. Returns `true` if the
    /// flag actually changed.
    pub fn mark_read(&mut self, id: &MessageId) -> bool {
        let changed = self.entries.iter_mut().any(|e| match e {
            Entry::Confirmed(m) if m.id == *id && !m.read => {
                m.read = true;
                true
            }
            _ => false,
        });
        if changed {
            self.notify(StoreEvent::ReadMarked { id: id.clone() });
        }
        changed
    }

    /// Inserts after all entries with a timestamp `<=` the new entry's,
    /// which keeps the sequence sorted and ties in insertion order.
    fn insert_ordered(&mut self, entry: Entry) {
        let at = entry.created_at();
        let idx = self.entries.partition_point(|e| e.created_at() <= at);
        self.entries.insert(idx, entry);
    }

    fn position_of_transient(&self, local_id: &LocalId) -> Option<usize> {
        self.entries.iter().position(|e| {
            matches!(e, Entry::Transient(t) if t.local_id == *local_id)
        })
    }

    /// Best-effort notification; a full subscriber queue drops the event
    /// rather than blocking a mutation.
    fn notify(&self, event: StoreEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            tracing::debug!(error = %e, "store event dropped");
        }
    }
}
