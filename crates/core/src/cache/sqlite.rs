//! SQLite-backed tagged cache store.
//!
//! Stores one row per cache key plus one row per (key, tag) pair. Tag rows
//! cascade when their entry is removed.

use super::TaggedCache;
use crate::Error;
use crate::db::{self, migrations::STATIC_CACHE_MIGRATIONS, unix_now};
use async_trait::async_trait;
use std::path::Path;
use tokio_rusqlite::{Connection, params};

/// Static cache index handle.
#[derive(Clone, Debug)]
pub struct SqliteTagCache {
    conn: Connection,
}

impl SqliteTagCache {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = db::open(path, STATIC_CACHE_MIGRATIONS).await?;
        Ok(Self { conn })
    }

    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = db::open_in_memory(STATIC_CACHE_MIGRATIONS).await?;
        Ok(Self { conn })
    }

    /// Store (or replace) the entry under `key` with exactly `tags`.
    pub async fn put(&self, key: &str, tags: &[String]) -> Result<(), Error> {
        let key = key.to_string();
        let tags = tags.to_vec();
        let now = unix_now();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO sfc_cache_entries (key, stored_at) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET stored_at = excluded.stored_at",
                    params![key, now],
                )?;
                tx.execute("DELETE FROM sfc_cache_tags WHERE key = ?1", params![key])?;
                {
                    let mut insert = tx.prepare("INSERT OR IGNORE INTO sfc_cache_tags (key, tag) VALUES (?1, ?2)")?;
                    for tag in &tags {
                        insert.execute(params![key, tag])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    #[cfg(test)]
    pub(crate) async fn entry_count(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM sfc_cache_entries", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl TaggedCache for SqliteTagCache {
    async fn flush_by_tag(&self, tag: &str) -> Result<(), Error> {
        let tag = tag.to_string();
        let removed = self
            .conn
            .call(move |conn| -> Result<usize, Error> {
                Ok(conn.execute(
                    "DELETE FROM sfc_cache_entries WHERE key IN (SELECT key FROM sfc_cache_tags WHERE tag = ?1)",
                    params![tag],
                )?)
            })
            .await
            .map_err(Error::from)?;
        tracing::debug!(removed, "flushed static cache entries by tag");
        Ok(())
    }

    async fn contains(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                Ok(conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM sfc_cache_entries WHERE key = ?1)",
                    params![key],
                    |row| row.get(0),
                )?)
            })
            .await
            .map_err(Error::from)
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("DELETE FROM sfc_cache_entries WHERE key = ?1", params![key])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}
