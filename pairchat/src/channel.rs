//! Live message channel for the active conversation.
//!
//! One WebSocket per activation: [`LiveChannel::connect`] opens the
//! socket and spawns a background reader that decodes incoming frames,
//! keeps only traffic belonging to the active pair, and merges it into
//! the conversation store. The channel is terminal — when the socket
//! closes or errors, the reader exits and the channel stays disconnected
//! until the next activation opens a fresh one. Dropping the channel
//! aborts the reader, so a deactivated conversation stops consuming
//! events immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsFrame;

use pairchat_proto::event;

use crate::convo::ConversationPair;
use crate::convo::store::SharedStore;

/// Errors from the live channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The WebSocket connection could not be established.
    #[error("channel connect failed: {0}")]
    Connect(String),

    /// Connecting took longer than the allowed timeout.
    #[error("channel connect timed out")]
    Timeout,
}

/// Handle to the live channel of one conversation activation.
///
/// Owns the background reader task for its lifetime and aborts it on
/// drop.
pub struct LiveChannel {
    connected: Arc<AtomicBool>,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl LiveChannel {
    /// Opens the socket at `ws_url` and starts routing frames for `pair`
    /// into `store`.
    ///
    /// The URL is the per-user push endpoint (`ws://host/ws/chat/{user}`),
    /// which carries every message addressed to or sent by that user; the
    /// reader drops anything not belonging to `pair`.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Timeout`] if the connection is not established
    ///   within `connect_timeout`.
    /// - [`ChannelError::Connect`] for handshake or transport failures.
    pub async fn connect(
        ws_url: &str,
        pair: ConversationPair,
        store: SharedStore,
        connect_timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let (ws_stream, _response) = tokio::time::timeout(connect_timeout, connect_async(ws_url))
            .await
            .map_err(|_| {
                tracing::warn!(url = ws_url, "channel connect timed out");
                ChannelError::Timeout
            })?
            .map_err(|e| {
                tracing::warn!(url = ws_url, error = %e, "channel connect failed");
                ChannelError::Connect(e.to_string())
            })?;

        tracing::info!(url = ws_url, "live channel open");

        let connected = Arc::new(AtomicBool::new(true));
        let reader_connected = Arc::clone(&connected);
        let reader_handle = tokio::spawn(reader_loop(ws_stream, pair, store, reader_connected));

        Ok(Self {
            connected,
            reader_handle,
        })
    }

    /// Returns `true` while the socket is open and the reader is running.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.reader_handle.abort();
        self.connected.store(false, Ordering::Relaxed);
    }
}

/// Background task: decode, filter, merge.
///
/// Malformed frames are logged and skipped without disconnecting.
/// Exits (and marks the channel disconnected) when the socket closes or
/// errors.
async fn reader_loop<S>(
    mut ws_stream: S,
    pair: ConversationPair,
    store: SharedStore,
    connected: Arc<AtomicBool>,
) where
    S: StreamExt<Item = Result<WsFrame, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(frame) = ws_stream.next().await {
        match frame {
            Ok(WsFrame::Text(text)) => match event::decode(&text) {
                Ok(msg) => {
                    if pair.matches(&msg.sender_id, &msg.receiver_id) {
                        store.lock().merge(msg);
                    } else {
                        tracing::debug!(
                            sender = %msg.sender_id,
                            receiver = %msg.receiver_id,
                            "dropping frame for another conversation"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "malformed channel frame, skipping");
                }
            },
            Ok(WsFrame::Close(_)) => {
                tracing::info!("live channel closed by server");
                break;
            }
            Ok(WsFrame::Ping(_) | WsFrame::Pong(_) | WsFrame::Binary(_) | WsFrame::Frame(_)) => {}
            Err(e) => {
                tracing::warn!(error = %e, "live channel read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::info!("live channel reader exiting");
}
