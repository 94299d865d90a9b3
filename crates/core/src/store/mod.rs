//! Persistent queue of URLs awaiting a warming probe.
//!
//! A row is pending while `called_at == 0`, in flight while a runner holds a
//! claim on it (`called_at == -1`) and completed once `called_at` carries the
//! probe timestamp. Nothing is cached in memory between calls.

mod entries;

pub use entries::{EntryState, QueueEntry, QueueStats};

use crate::Error;
use crate::db::{self, migrations::QUEUE_MIGRATIONS};
use std::path::Path;
use tokio_rusqlite::Connection;

/// `called_at` value of a row claimed by a running worker.
pub const IN_FLIGHT: i64 = -1;

/// Queue database handle.
///
/// Cheap to clone; every clone talks to the same background connection.
#[derive(Clone, Debug)]
pub struct QueueStore {
    pub(crate) conn: Connection,
}

impl QueueStore {
    /// Open (or create) the queue database at `path` and run migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = db::open(path, QUEUE_MIGRATIONS).await?;
        Ok(Self { conn })
    }

    /// Open an in-memory queue database for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = db::open_in_memory(QUEUE_MIGRATIONS).await?;
        Ok(Self { conn })
    }
}
