//! History backfill for a newly activated conversation.
//!
//! The backend returns recent messages newest-first; [`backfill`] reverses
//! the batch into chronological order and seeds the conversation store.
//! A [`StaleGuard`] ties each fetch to the activation that started it:
//! when the user has already switched conversations by the time a response
//! lands, the response is discarded instead of seeding a store it no
//! longer belongs to.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use pairchat_proto::message::UserId;

use crate::api::{ApiError, Backend};

use super::store::SharedStore;

/// Errors from the history backfill.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The backend call failed; the store was marked failed and left empty.
    #[error("history fetch failed: {0}")]
    Failed(#[from] ApiError),

    /// The response arrived after its activation ended and was discarded.
    #[error("history response discarded: conversation no longer active")]
    Stale,
}

/// Monotonic activation counter shared by a session's fetches.
///
/// Bumping the counter invalidates every guard captured before the bump.
#[derive(Debug, Clone, Default)]
pub struct ActivationCounter(Arc<AtomicU64>);

impl ActivationCounter {
    /// Creates a counter at generation zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new activation and returns its guard.
    pub fn next_activation(&self) -> StaleGuard {
        let generation = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        StaleGuard {
            counter: Arc::clone(&self.0),
            generation,
        }
    }
}

/// Captures the activation generation a fetch was started under.
#[derive(Debug, Clone)]
pub struct StaleGuard {
    counter: Arc<AtomicU64>,
    generation: u64,
}

impl StaleGuard {
    /// Returns `true` while the activation that produced this guard is
    /// still the latest one.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == self.generation
    }
}

/// Fetches the recent thread with `other` and seeds `store` with it in
/// chronological order.
///
/// The guard is checked after the fetch completes: a response belonging to
/// a superseded activation is dropped without touching the store. On
/// backend failure the store is marked failed but keeps whatever it held
/// (normally nothing).
///
/// # Errors
///
/// - [`FetchError::Failed`] if the backend call fails.
/// - [`FetchError::Stale`] if the activation ended before the response.
pub async fn backfill<B: Backend>(
    backend: &B,
    store: &SharedStore,
    guard: &StaleGuard,
    other: &UserId,
    limit: usize,
) -> Result<usize, FetchError> {
    let result = backend.fetch_history(other, limit).await;

    if !guard.is_current() {
        tracing::debug!(other = %other, "discarding history response for ended activation");
        return Err(FetchError::Stale);
    }

    match result {
        Ok(mut batch) => {
            // Newest-first from the backend; present oldest-to-newest.
            batch.reverse();
            let count = batch.len();
            store.lock().seed(batch);
            tracing::info!(other = %other, count, "conversation history seeded");
            Ok(count)
        }
        Err(err) => {
            tracing::warn!(other = %other, error = %err, "history fetch failed");
            store.lock().mark_load_failed();
            Err(err.into())
        }
    }
}
