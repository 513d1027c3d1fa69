//! Message types for the `PairChat` backend API.
//!
//! All types in this module mirror the JSON shapes the backend produces.
//! They are the only representation of server state the client trusts:
//! anything that does not deserialize into these contracts is rejected at
//! the boundary instead of flowing through the core as loose fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum allowed message body size in bytes (64 KiB).
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Opaque server-assigned user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Creates a user identifier from its string representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this user ID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the identifier is the empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque server-assigned message identifier.
///
/// Only the backend mints these; a message the client has composed but the
/// server has not yet confirmed has no `MessageId` at all (see the transient
/// entry type in the client store).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Creates a message identifier from its string representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this message ID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the identifier is the empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A server-confirmed chat message.
///
/// `created_at` is the server clock (RFC 3339 on the wire). Line breaks in
/// `body` are preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned unique identifier, stable once assigned.
    pub id: MessageId,
    /// Who sent the message.
    pub sender_id: UserId,
    /// Who the message is addressed to.
    pub receiver_id: UserId,
    /// Message text, line breaks preserved.
    pub body: String,
    /// Server-side creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Whether the receiver has marked the message read.
    #[serde(default)]
    pub read: bool,
    /// Backend conversation row this message belongs to, when known.
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Identity equality for confirmed messages: same server-assigned ID.
///
/// Transient (unconfirmed) local messages have no [`MessageId`] and are a
/// different type entirely, so they can never compare equal to a confirmed
/// message through this function.
#[must_use]
pub fn same_message(a: &Message, b: &Message) -> bool {
    a.id == b.id
}

/// Total-order comparator: creation timestamp ascending.
///
/// Callers must use stable insertion/sorting so that exact-tie timestamps
/// preserve relative insertion order.
#[must_use]
pub fn chronological(a: &Message, b: &Message) -> std::cmp::Ordering {
    a.created_at.cmp(&b.created_at)
}

/// Error returned when an outgoing message body fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Body is empty after trimming surrounding whitespace.
    #[error("message body is empty")]
    Empty,
    /// Body exceeds the maximum allowed size.
    #[error("message too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual size of the body in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

/// Validates an outgoing message body and returns the trimmed text.
///
/// Trims surrounding whitespace, then checks the result is non-empty and
/// within [`MAX_BODY_SIZE`]. Interior whitespace and line breaks survive.
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] if nothing remains after trimming, or
/// [`ValidationError::TooLarge`] if the trimmed body exceeds the size limit.
pub fn validate_body(body: &str) -> Result<&str, ValidationError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    if trimmed.len() > MAX_BODY_SIZE {
        return Err(ValidationError::TooLarge {
            size: trimmed.len(),
            max: MAX_BODY_SIZE,
        });
    }
    Ok(trimmed)
}
