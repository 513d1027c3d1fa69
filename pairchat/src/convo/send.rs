//! Optimistic send flow.
//!
//! [`send`] validates the composed text, shows it immediately as a
//! transient entry, then persists it through the backend. Success swaps
//! the transient for the server's confirmed record; failure withdraws it,
//! so a failed send never leaves an unconfirmed entry behind.

use pairchat_proto::message::{MessageId, UserId, ValidationError, validate_body};

use crate::api::{ApiError, Backend};

use super::store::{SharedStore, TransientSend};

/// Errors from the send flow.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The composed text was rejected before anything was sent.
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationError),

    /// The backend call failed; the transient entry was withdrawn.
    #[error("send failed: {0}")]
    Failed(#[from] ApiError),
}

/// Sends `raw_body` to `receiver`, keeping the store consistent at every
/// step.
///
/// The text is trimmed and validated first; invalid input never reaches
/// the store or the backend. Returns the server-assigned ID of the
/// confirmed message.
///
/// # Errors
///
/// - [`SendError::Invalid`] if the trimmed text is empty or too large.
/// - [`SendError::Failed`] if the backend rejects or cannot be reached.
pub async fn send<B: Backend>(
    backend: &B,
    store: &SharedStore,
    sender: &UserId,
    receiver: &UserId,
    raw_body: &str,
) -> Result<MessageId, SendError> {
    let body = validate_body(raw_body)?;

    let transient = TransientSend::new(sender.clone(), receiver.clone(), body.to_string());
    let local_id = transient.local_id;
    store.lock().add_transient(transient);

    match backend.send_message(receiver, body).await {
        Ok(confirmed) => {
            let id = confirmed.id.clone();
            store.lock().replace_transient(&local_id, confirmed);
            tracing::debug!(id = %id, receiver = %receiver, "message confirmed");
            Ok(id)
        }
        Err(err) => {
            tracing::warn!(receiver = %receiver, error = %err, "send failed, withdrawing local entry");
            store.lock().remove_transient(&local_id);
            Err(err.into())
        }
    }
}
