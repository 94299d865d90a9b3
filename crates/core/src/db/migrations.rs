//! Database schema migrations.
//!
//! Uses a simple version table approach to track applied migrations.
//! Each store owns an ordered list of `(version, sql)` pairs; every SQL
//! batch is idempotent (`CREATE … IF NOT EXISTS`).

use crate::Error;
use tokio_rusqlite::{Connection, params};

/// A single schema migration: incrementing version and the SQL batch to apply.
pub type Migration = (i64, &'static str);

/// Migrations for the queue database.
pub const QUEUE_MIGRATIONS: &[Migration] = &[(1, include_str!("../../migrations/001_queue.sql"))];

/// Migrations for the static cache database.
pub const STATIC_CACHE_MIGRATIONS: &[Migration] = &[(1, include_str!("../../migrations/001_static_cache.sql"))];

/// Run any pending migrations.
///
/// Creates the `_migrations` table if needed, reads the current version and
/// applies every migration with a higher version, in order.
///
/// # Errors
///
/// Returns an error if a migration is out of order or its SQL fails.
pub async fn run(conn: &Connection, migrations: &'static [Migration]) -> Result<(), Error> {
    conn.call(move |conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(Error::from)?;

        let current: i64 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| {
                row.get(0)
            })
            .map_err(Error::from)?;

        let mut previous = 0;
        for &(version, sql) in migrations {
            if version <= previous {
                return Err(Error::MigrationFailed(format!("version {version} is out of order")));
            }
            previous = version;

            if version > current {
                conn.execute_batch(sql)
                    .map_err(|e| Error::MigrationFailed(format!("version {version}: {e}")))?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                    params![version, chrono::Utc::now().to_rfc3339()],
                )
                .map_err(Error::from)?;
                tracing::debug!(version, "applied migration");
            }
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn table_exists(conn: &Connection, name: &'static str) -> bool {
        conn.call(move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1)",
                [name],
                |row| row.get(0),
            )
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn, QUEUE_MIGRATIONS).await.unwrap();
        run(&conn, QUEUE_MIGRATIONS).await.unwrap();

        assert!(table_exists(&conn, "sfc_queue").await);
        assert!(!table_exists(&conn, "sfc_cache_entries").await);
    }

    #[tokio::test]
    async fn test_migrations_version_tracking() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn, STATIC_CACHE_MIGRATIONS).await.unwrap();

        let count: i64 = conn
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0)))
            .await
            .unwrap();

        assert_eq!(count, STATIC_CACHE_MIGRATIONS.len() as i64);
        assert!(table_exists(&conn, "sfc_cache_tags").await);
    }

    #[tokio::test]
    async fn test_out_of_order_migrations_rejected() {
        const BAD: &[Migration] = &[(2, "SELECT 1;"), (1, "SELECT 1;")];
        let conn = Connection::open_in_memory().await.unwrap();
        let result = run(&conn, BAD).await;
        assert!(matches!(result, Err(Error::MigrationFailed(_))));
    }
}
