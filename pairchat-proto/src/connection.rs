//! Connection-request types for the `PairChat` backend API.
//!
//! A connection gates who may message whom. It starts `pending` when one
//! user requests it and becomes `accepted` when the addressee responds.
//! Direction is always expressed relative to the current user, as the
//! backend renders it per caller.

use serde::{Deserialize, Serialize};

use crate::message::UserId;

/// Opaque server-assigned connection identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Creates a connection identifier from its string representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this connection ID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Requested but not yet accepted by the addressee.
    Pending,
    /// Accepted; the relationship is symmetric from here on.
    Accepted,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Accepted => write!(f, "accepted"),
        }
    }
}

/// Which way a pending request points, relative to the current user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Someone else requested a connection with the current user.
    Incoming,
    /// The current user sent the request.
    Outgoing,
}

/// Minimal profile attached to a connection for display purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileBrief {
    /// The profile's user ID.
    pub id: UserId,
    /// Display handle, if the user has set one.
    #[serde(default)]
    pub username: Option<String>,
    /// Given name, if set.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name, if set.
    #[serde(default)]
    pub last_name: Option<String>,
}

/// A connection between the current user and one counterpart.
///
/// `direction` is only meaningful while `status` is
/// [`ConnectionStatus::Pending`]; once accepted the relationship is
/// symmetric and the backend may omit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Server-assigned identifier.
    pub id: ConnectionId,
    /// Current lifecycle state.
    pub status: ConnectionStatus,
    /// Request direction relative to the current user, while pending.
    #[serde(default)]
    pub direction: Option<Direction>,
    /// The current user's own profile, as rendered by the backend.
    #[serde(default, rename = "self")]
    pub self_profile: Option<ProfileBrief>,
    /// The counterpart's profile.
    #[serde(default)]
    pub other: Option<ProfileBrief>,
}

impl Connection {
    /// Returns the counterpart's user ID, if the backend included it.
    #[must_use]
    pub fn other_user(&self) -> Option<&UserId> {
        self.other.as_ref().map(|p| &p.id)
    }

    /// Returns `true` if this entry is a pending request sent *to* the
    /// current user, i.e. one they are allowed to accept.
    #[must_use]
    pub fn is_acceptable(&self) -> bool {
        self.status == ConnectionStatus::Pending && self.direction == Some(Direction::Incoming)
    }
}
