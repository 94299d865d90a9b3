//! Producer and maintenance side of the queue.
//!
//! Invalidation hooks call [`QueueAdmin::enqueue`] to schedule a re-probe;
//! maintenance jobs call [`QueueAdmin::cleanup`] to bound table growth, since
//! runs never delete the rows they complete.

use crate::{Error, QueueStore, parse_target};
use std::time::Duration;

/// Enqueue and cleanup operations over a [`QueueStore`].
#[derive(Clone, Debug)]
pub struct QueueAdmin {
    store: QueueStore,
}

impl QueueAdmin {
    pub fn new(store: QueueStore) -> Self {
        Self { store }
    }

    /// Schedule a probe of `identifier` (the cache URL), not tied to a page.
    ///
    /// Does nothing when a pending row already exists for the URL.
    /// Returns whether a row was inserted.
    pub async fn enqueue(&self, identifier: &str) -> Result<bool, Error> {
        self.enqueue_page(identifier, 0).await
    }

    /// Schedule a probe of `identifier` owned by `page_id`.
    ///
    /// A failed probe will flush the page's tag as well as the URL entry.
    ///
    /// The URL is stored in its normalized form (see [`parse_target`]).
    pub async fn enqueue_page(&self, identifier: &str, page_id: i64) -> Result<bool, Error> {
        let target = parse_target(identifier)?;
        let url = target.as_str();

        match self.store.insert_pending_if_absent(url, page_id).await? {
            Some(id) => {
                tracing::debug!(id, url, page_id, "enqueued url");
                Ok(true)
            }
            None => {
                tracing::debug!(url, "url already pending, skipping enqueue");
                Ok(false)
            }
        }
    }

    /// Delete every completed row. Returns the number removed.
    pub async fn cleanup(&self) -> Result<u64, Error> {
        let removed = self.store.delete_completed().await?;
        tracing::info!(removed, "queue cleanup finished");
        Ok(removed)
    }

    /// Return abandoned in-flight rows to pending.
    pub async fn release_stale(&self, older_than: Duration) -> Result<u64, Error> {
        self.store.release_stale_claims(older_than).await
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }
}
