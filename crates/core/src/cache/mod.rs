//! Tagged static cache: the store interface and the invalidation façade.
//!
//! The static cache keeps one entry per URL, tagged with the page that
//! produced it. The queue runner only ever needs three operations from it,
//! captured by [`TaggedCache`].

mod invalidator;
mod sqlite;

pub use invalidator::{CacheInvalidator, page_tag};
pub use sqlite::SqliteTagCache;

use crate::Error;
use async_trait::async_trait;

/// Tag-aware cache store consumed by the invalidator.
#[async_trait]
pub trait TaggedCache: Send + Sync {
    /// Remove every entry carrying `tag`. Unknown tags are not an error.
    async fn flush_by_tag(&self, tag: &str) -> Result<(), Error>;

    /// Whether an entry is stored under `key`.
    async fn contains(&self, key: &str) -> Result<bool, Error>;

    /// Remove the entry stored under `key`, if any.
    async fn remove(&self, key: &str) -> Result<(), Error>;
}
