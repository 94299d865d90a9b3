//! Queue entry CRUD and claim operations.

use super::{IN_FLIGHT, QueueStore};
use crate::Error;
use crate::db::unix_now;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, Connection, TransactionBehavior};

const COLUMNS: &str = "id, cache_url, page_id, enqueued_at, called_at, result_code, claimed_at";

/// True when another row for the same URL is pending.
const PENDING_TWIN: &str =
    "EXISTS (SELECT 1 FROM sfc_queue p WHERE p.cache_url = sfc_queue.cache_url AND p.called_at = 0)";

/// One row of the warming queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    pub cache_url: String,
    /// Owning page, `0` when the URL is not tied to a page.
    pub page_id: i64,
    pub enqueued_at: i64,
    /// `0` pending, `-1` in flight, otherwise unix seconds of the probe.
    pub called_at: i64,
    /// Probe status as decimal text; empty until the probe completes.
    pub result_code: String,
    pub claimed_at: i64,
}

/// Lifecycle state derived from `called_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryState {
    Pending,
    InFlight,
    Completed,
}

impl QueueEntry {
    pub fn state(&self) -> EntryState {
        match self.called_at {
            0 => EntryState::Pending,
            c if c < 0 => EntryState::InFlight,
            _ => EntryState::Completed,
        }
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            cache_url: row.get(1)?,
            page_id: row.get(2)?,
            enqueued_at: row.get(3)?,
            called_at: row.get(4)?,
            result_code: row.get(5)?,
            claimed_at: row.get(6)?,
        })
    }
}

/// Row counts per lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub in_flight: u64,
    pub completed: u64,
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn has_pending_in(conn: &Connection, cache_url: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sfc_queue WHERE cache_url = ?1 AND called_at = 0)",
        params![cache_url],
        |row| row.get(0),
    )
}

fn insert_pending_in(conn: &Connection, cache_url: &str, page_id: i64) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO sfc_queue (cache_url, page_id, enqueued_at, called_at, result_code, claimed_at)
         VALUES (?1, ?2, ?3, 0, '', 0)",
        params![cache_url, page_id, unix_now()],
    )?;
    Ok(conn.last_insert_rowid())
}

fn select_where(conn: &Connection, predicate: &str, limit: i64) -> rusqlite::Result<Vec<QueueEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM sfc_queue WHERE {predicate} ORDER BY id LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![limit], QueueEntry::from_row)?;
    rows.collect()
}

impl QueueStore {
    /// Insert a new pending row and return its id.
    ///
    /// No uniqueness check happens here; use [`QueueStore::insert_pending_if_absent`]
    /// or check [`QueueStore::has_pending`] first.
    pub async fn insert_pending(&self, cache_url: &str, page_id: i64) -> Result<i64, Error> {
        let cache_url = cache_url.to_string();
        let id = self
            .conn
            .call(move |conn| -> Result<i64, Error> { Ok(insert_pending_in(conn, &cache_url, page_id)?) })
            .await
            .map_err(Error::from)?;
        tracing::debug!(id, page_id, "inserted pending queue entry");
        Ok(id)
    }

    /// Whether a pending (not in flight, not completed) row exists for the URL.
    pub async fn has_pending(&self, cache_url: &str) -> Result<bool, Error> {
        let cache_url = cache_url.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> { Ok(has_pending_in(conn, &cache_url)?) })
            .await
            .map_err(Error::from)
    }

    /// Insert a pending row unless one already exists for the URL.
    ///
    /// The check and the insert share one immediate transaction, so separate
    /// processes enqueueing the same URL serialize on the write lock.
    /// Returns the new id, or `None` when a pending row was already present.
    pub async fn insert_pending_if_absent(&self, cache_url: &str, page_id: i64) -> Result<Option<i64>, Error> {
        let cache_url = cache_url.to_string();
        self.conn
            .call(move |conn| -> Result<Option<i64>, Error> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                if has_pending_in(&tx, &cache_url)? {
                    return Ok(None);
                }
                let id = insert_pending_in(&tx, &cache_url, page_id)?;
                tx.commit()?;
                Ok(Some(id))
            })
            .await
            .map_err(Error::from)
    }

    /// Up to `limit` pending rows, oldest id first.
    pub async fn select_pending(&self, limit: usize) -> Result<Vec<QueueEntry>, Error> {
        let limit = sql_limit(limit);
        self.conn
            .call(move |conn| -> Result<Vec<QueueEntry>, Error> { Ok(select_where(conn, "called_at = 0", limit)?) })
            .await
            .map_err(Error::from)
    }

    /// Up to `limit` completed rows, oldest id first.
    pub async fn select_completed(&self, limit: usize) -> Result<Vec<QueueEntry>, Error> {
        let limit = sql_limit(limit);
        self.conn
            .call(move |conn| -> Result<Vec<QueueEntry>, Error> { Ok(select_where(conn, "called_at > 0", limit)?) })
            .await
            .map_err(Error::from)
    }

    /// Move up to `limit` pending rows to in flight and return them.
    ///
    /// Each row is claimed with a conditional update (`called_at` 0 → -1), so
    /// overlapping runs never receive the same row.
    pub async fn claim_pending(&self, limit: usize) -> Result<Vec<QueueEntry>, Error> {
        let limit = sql_limit(limit);
        let now = unix_now();
        let claimed = self
            .conn
            .call(move |conn| -> Result<Vec<QueueEntry>, Error> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let candidates = select_where(&tx, "called_at = 0", limit)?;
                let mut claimed = Vec::with_capacity(candidates.len());
                {
                    let mut update = tx.prepare(
                        "UPDATE sfc_queue SET called_at = ?2, claimed_at = ?3 WHERE id = ?1 AND called_at = 0",
                    )?;
                    for mut entry in candidates {
                        if update.execute(params![entry.id, IN_FLIGHT, now])? == 1 {
                            entry.called_at = IN_FLIGHT;
                            entry.claimed_at = now;
                            claimed.push(entry);
                        }
                    }
                }
                tx.commit()?;
                Ok(claimed)
            })
            .await
            .map_err(Error::from)?;
        tracing::debug!(count = claimed.len(), "claimed pending queue entries");
        Ok(claimed)
    }

    /// Complete a row with the probe outcome.
    ///
    /// `called_at` becomes the current time, kept strictly above
    /// `enqueued_at`. Rows that are already completed are left untouched and
    /// an unknown id is silently ignored.
    pub async fn record_result(&self, id: i64, result_code: &str) -> Result<(), Error> {
        let result_code = result_code.to_string();
        let now = unix_now();
        let updated = self
            .conn
            .call(move |conn| -> Result<usize, Error> {
                Ok(conn.execute(
                    "UPDATE sfc_queue SET called_at = MAX(?2, enqueued_at + 1), result_code = ?3
                     WHERE id = ?1 AND called_at <= 0",
                    params![id, now, result_code],
                )?)
            })
            .await
            .map_err(Error::from)?;
        if updated == 0 {
            tracing::debug!(id, "no open queue entry to record a result for");
        }
        Ok(())
    }

    /// Put one in-flight row back to pending.
    ///
    /// When the URL was enqueued again while the row was in flight, the newer
    /// pending row already covers it and the claimed row is deleted instead.
    /// Returns whether the row was still in flight.
    pub async fn release_claim(&self, id: i64) -> Result<bool, Error> {
        let released = self
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let superseded = tx.execute(
                    &format!("DELETE FROM sfc_queue WHERE id = ?1 AND called_at = ?2 AND {PENDING_TWIN}"),
                    params![id, IN_FLIGHT],
                )?;
                let reset = tx.execute(
                    "UPDATE sfc_queue SET called_at = 0, claimed_at = 0 WHERE id = ?1 AND called_at = ?2",
                    params![id, IN_FLIGHT],
                )?;
                tx.commit()?;
                Ok(superseded + reset)
            })
            .await
            .map_err(Error::from)?;
        Ok(released == 1)
    }

    /// Put back to pending every in-flight row claimed at least `older_than` ago.
    ///
    /// At most one row per URL ends up pending: stale claims whose URL already
    /// has a pending row, or an older stale claim for the same URL, are deleted.
    /// Returns the number of rows taken out of flight.
    pub async fn release_stale_claims(&self, older_than: Duration) -> Result<u64, Error> {
        let cutoff = unix_now() - i64::try_from(older_than.as_secs()).unwrap_or(i64::MAX);
        let released = self
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let superseded = tx.execute(
                    &format!(
                        "DELETE FROM sfc_queue WHERE called_at = ?1 AND claimed_at <= ?2
                         AND ({PENDING_TWIN} OR EXISTS (
                             SELECT 1 FROM sfc_queue s
                             WHERE s.cache_url = sfc_queue.cache_url AND s.called_at = ?1
                               AND s.claimed_at <= ?2 AND s.id > sfc_queue.id))"
                    ),
                    params![IN_FLIGHT, cutoff],
                )?;
                let reset = tx.execute(
                    "UPDATE sfc_queue SET called_at = 0, claimed_at = 0 WHERE called_at = ?1 AND claimed_at <= ?2",
                    params![IN_FLIGHT, cutoff],
                )?;
                tx.commit()?;
                Ok(superseded + reset)
            })
            .await
            .map_err(Error::from)?;
        if released > 0 {
            tracing::info!(released, "released stale queue claims");
        }
        Ok(released as u64)
    }

    /// Delete every completed row. Returns the number deleted.
    pub async fn delete_completed(&self) -> Result<u64, Error> {
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM sfc_queue WHERE called_at > 0", [])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Get a row by id.
    pub async fn get_entry(&self, id: i64) -> Result<Option<QueueEntry>, Error> {
        self.conn
            .call(move |conn| -> Result<Option<QueueEntry>, Error> {
                let result = conn.query_row(
                    &format!("SELECT {COLUMNS} FROM sfc_queue WHERE id = ?1"),
                    params![id],
                    QueueEntry::from_row,
                );
                match result {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Count rows per lifecycle state.
    pub async fn stats(&self) -> Result<QueueStats, Error> {
        self.conn
            .call(move |conn| -> Result<QueueStats, Error> {
                let (pending, in_flight, completed): (i64, i64, i64) = conn.query_row(
                    "SELECT
                        COALESCE(SUM(CASE WHEN called_at = 0 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN called_at < 0 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN called_at > 0 THEN 1 ELSE 0 END), 0)
                     FROM sfc_queue",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )?;
                Ok(QueueStats { pending: pending as u64, in_flight: in_flight as u64, completed: completed as u64 })
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with(urls: &[&str]) -> QueueStore {
        let store = QueueStore::open_in_memory().await.unwrap();
        for url in urls {
            store.insert_pending(url, 0).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_insert_and_select_round_trip() {
        let store = QueueStore::open_in_memory().await.unwrap();
        let id = store.insert_pending("https://example.test/a", 7).await.unwrap();

        let pending = store.select_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        let entry = &pending[0];
        assert_eq!(entry.id, id);
        assert_eq!(entry.cache_url, "https://example.test/a");
        assert_eq!(entry.page_id, 7);
        assert_eq!(entry.called_at, 0);
        assert_eq!(entry.result_code, "");
        assert!(entry.enqueued_at > 0);
        assert_eq!(entry.state(), EntryState::Pending);
    }

    #[tokio::test]
    async fn test_insert_pending_allows_duplicates() {
        let store = store_with(&["https://example.test/a", "https://example.test/a"]).await;
        assert_eq!(store.select_pending(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_has_pending() {
        let store = store_with(&["https://example.test/a"]).await;
        assert!(store.has_pending("https://example.test/a").await.unwrap());
        assert!(!store.has_pending("https://example.test/b").await.unwrap());
    }

    #[tokio::test]
    async fn test_has_pending_ignores_in_flight_and_completed() {
        let store = store_with(&["https://example.test/a"]).await;
        let claimed = store.claim_pending(10).await.unwrap();
        assert!(!store.has_pending("https://example.test/a").await.unwrap());

        store.record_result(claimed[0].id, "200").await.unwrap();
        assert!(!store.has_pending("https://example.test/a").await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_pending_if_absent() {
        let store = QueueStore::open_in_memory().await.unwrap();
        let first = store.insert_pending_if_absent("https://example.test/a", 3).await.unwrap();
        let second = store.insert_pending_if_absent("https://example.test/a", 3).await.unwrap();
        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(store.stats().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_select_pending_respects_limit_and_order() {
        let store = store_with(&["https://example.test/1", "https://example.test/2", "https://example.test/3"]).await;
        let pending = store.select_pending(2).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].id < pending[1].id);
        assert_eq!(pending[0].cache_url, "https://example.test/1");
    }

    #[tokio::test]
    async fn test_claim_pending_marks_in_flight() {
        let store = store_with(&["https://example.test/1", "https://example.test/2"]).await;
        let claimed = store.claim_pending(1).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].state(), EntryState::InFlight);
        assert!(claimed[0].claimed_at > 0);

        let stored = store.get_entry(claimed[0].id).await.unwrap().unwrap();
        assert_eq!(stored.called_at, IN_FLIGHT);
        assert_eq!(store.select_pending(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_claims_from_separate_connections_are_disjoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.sqlite");
        let first = QueueStore::open(&path).await.unwrap();
        let second = QueueStore::open(&path).await.unwrap();
        for i in 0..60 {
            first.insert_pending(&format!("https://example.test/{i}"), 0).await.unwrap();
        }

        let mut handles = Vec::new();
        for round in 0..6 {
            let store = if round % 2 == 0 { first.clone() } else { second.clone() };
            handles.push(tokio::spawn(async move { store.claim_pending(15).await.unwrap() }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.extend(handle.await.unwrap().into_iter().map(|e| e.id));
        }

        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(total, 60);
        assert_eq!(ids.len(), 60);
        assert_eq!(second.stats().await.unwrap(), QueueStats { pending: 0, in_flight: 60, completed: 0 });
    }

    #[tokio::test]
    async fn test_record_result_completes_row() {
        let store = store_with(&["https://example.test/a"]).await;
        let entry = store.claim_pending(1).await.unwrap().remove(0);

        store.record_result(entry.id, "404").await.unwrap();

        let stored = store.get_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.state(), EntryState::Completed);
        assert_eq!(stored.result_code, "404");
        assert!(stored.called_at > stored.enqueued_at);
    }

    #[tokio::test]
    async fn test_record_result_is_written_once() {
        let store = store_with(&["https://example.test/a"]).await;
        let entry = store.claim_pending(1).await.unwrap().remove(0);

        store.record_result(entry.id, "200").await.unwrap();
        store.record_result(entry.id, "900").await.unwrap();

        let stored = store.get_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.result_code, "200");
    }

    #[tokio::test]
    async fn test_record_result_missing_id_is_silent() {
        let store = QueueStore::open_in_memory().await.unwrap();
        assert!(store.record_result(4242, "200").await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_completed_keeps_open_rows() {
        let store = store_with(&["https://example.test/1", "https://example.test/2", "https://example.test/3"]).await;
        let claimed = store.claim_pending(2).await.unwrap();
        store.record_result(claimed[0].id, "200").await.unwrap();

        let deleted = store.delete_completed().await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.stats().await.unwrap(), QueueStats { pending: 1, in_flight: 1, completed: 0 });
        assert!(store.select_completed(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_release_claim() {
        let store = store_with(&["https://example.test/a"]).await;
        let entry = store.claim_pending(1).await.unwrap().remove(0);

        assert!(store.release_claim(entry.id).await.unwrap());
        assert!(!store.release_claim(entry.id).await.unwrap());
        assert!(store.has_pending("https://example.test/a").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_claim_defers_to_newer_pending_row() {
        let store = store_with(&["https://example.test/a"]).await;
        let claimed = store.claim_pending(1).await.unwrap().remove(0);
        let newer = store.insert_pending_if_absent("https://example.test/a", 0).await.unwrap();
        assert!(newer.is_some());

        assert!(store.release_claim(claimed.id).await.unwrap());

        let pending = store.select_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(Some(pending[0].id), newer);
        assert!(store.get_entry(claimed.id).await.unwrap().is_none());
        assert_eq!(store.stats().await.unwrap().in_flight, 0);
    }

    #[tokio::test]
    async fn test_release_stale_claims_keeps_one_pending_row_per_url() {
        let store = store_with(&["https://example.test/a", "https://example.test/b"]).await;
        store.claim_pending(10).await.unwrap();
        store.insert_pending_if_absent("https://example.test/a", 0).await.unwrap();
        store.claim_pending(10).await.unwrap();
        store.insert_pending_if_absent("https://example.test/a", 0).await.unwrap();

        assert_eq!(store.release_stale_claims(Duration::ZERO).await.unwrap(), 3);

        let mut urls: Vec<String> = store.select_pending(10).await.unwrap().into_iter().map(|e| e.cache_url).collect();
        urls.sort();
        assert_eq!(urls, ["https://example.test/a", "https://example.test/b"]);
        assert_eq!(store.stats().await.unwrap().in_flight, 0);
    }

    #[tokio::test]
    async fn test_release_stale_claims() {
        let store = store_with(&["https://example.test/1", "https://example.test/2"]).await;
        store.claim_pending(2).await.unwrap();

        assert_eq!(store.release_stale_claims(Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(store.release_stale_claims(Duration::ZERO).await.unwrap(), 2);
        assert_eq!(store.stats().await.unwrap().pending, 2);
    }

    #[tokio::test]
    async fn test_stats_serializes() {
        let stats = QueueStats { pending: 2, in_flight: 0, completed: 5 };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["pending"], 2);
        assert_eq!(json["completed"], 5);
    }
}
