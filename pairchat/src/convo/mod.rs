//! Conversation state for the active two-party thread.
//!
//! A conversation is identified by the unordered pair of its participants.
//! The [`store::ConversationStore`] is the single source of truth for the
//! ordered, deduplicated message list; [`history`] seeds it from the
//! backfill fetch and [`send`] runs the optimistic send flow against it.

pub mod history;
pub mod send;
pub mod store;

use pairchat_proto::message::UserId;

/// The unordered pair of participant identities defining a message thread.
///
/// Construction normalizes the two IDs so that `(a, b)` and `(b, a)` are
/// the same pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationPair {
    low: UserId,
    high: UserId,
}

impl ConversationPair {
    /// Creates the pair for a thread between `a` and `b`.
    #[must_use]
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    /// Returns `true` if a message exchanged between `sender` and
    /// `receiver` belongs to this thread, in either direction.
    #[must_use]
    pub fn matches(&self, sender: &UserId, receiver: &UserId) -> bool {
        (*sender == self.low && *receiver == self.high)
            || (*sender == self.high && *receiver == self.low)
    }
}
