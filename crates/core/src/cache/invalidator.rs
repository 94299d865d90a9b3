use super::TaggedCache;
use crate::Error;
use std::sync::Arc;

/// Prefix of the tag attached to every cache entry produced by a page.
const PAGE_TAG_PREFIX: &str = "sfc_pageId_";

/// Tag for the entries of page `page_id`.
pub fn page_tag(page_id: i64) -> String {
    format!("{PAGE_TAG_PREFIX}{page_id}")
}

/// Drops stale static cache entries after a failed probe.
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: Arc<dyn TaggedCache>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<dyn TaggedCache>) -> Self {
        Self { cache }
    }

    /// Flush every entry tagged with the page.
    pub async fn invalidate_page(&self, page_id: i64) -> Result<(), Error> {
        let tag = page_tag(page_id);
        tracing::debug!(%tag, "flushing static cache by tag");
        self.cache.flush_by_tag(&tag).await
    }

    /// Remove the entry keyed by `url`.
    ///
    /// Tag coverage does not always include the URL-keyed entry itself, so
    /// this runs after [`CacheInvalidator::invalidate_page`].
    pub async fn invalidate_url(&self, url: &str) -> Result<(), Error> {
        if self.cache.contains(url).await? {
            tracing::debug!(url, "removing static cache entry");
            self.cache.remove(url).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for CacheInvalidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInvalidator").finish_non_exhaustive()
    }
}
