//! Decoding of live push-channel frames.
//!
//! The backend pushes each newly stored message to both participants as a
//! JSON text frame. Every frame is parsed into a [`Message`] here, at the
//! boundary, and anything malformed is rejected with an [`EventError`]
//! rather than letting half-formed objects leak into the client core.

use crate::message::Message;

/// Error produced when a push-channel frame cannot be accepted.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The frame is not valid JSON for the message contract.
    #[error("malformed channel frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The frame deserialized but violates a field invariant.
    #[error("invalid channel frame: {0}")]
    Invalid(&'static str),
}

/// Decodes one push-channel text frame into a confirmed [`Message`].
///
/// A frame is accepted only if it carries a non-empty server-assigned
/// message ID and non-empty sender/receiver IDs. The body may be any
/// string, including one containing line breaks.
///
/// # Errors
///
/// Returns [`EventError::Malformed`] if the frame is not valid JSON for
/// the [`Message`] shape, or [`EventError::Invalid`] if a required
/// identifier is empty.
pub fn decode(frame: &str) -> Result<Message, EventError> {
    let msg: Message = serde_json::from_str(frame)?;
    if msg.id.is_empty() {
        return Err(EventError::Invalid("empty message id"));
    }
    if msg.sender_id.is_empty() {
        return Err(EventError::Invalid("empty sender id"));
    }
    if msg.receiver_id.is_empty() {
        return Err(EventError::Invalid("empty receiver id"));
    }
    Ok(msg)
}
