//! SQLite plumbing shared by the queue store and the static cache store.
//!
//! Both stores run their statements on a tokio-rusqlite background thread,
//! open with the same pragmas (WAL for concurrent readers and overlapping
//! worker processes) and carry their own migration list.

pub mod connection;
pub mod migrations;

pub use connection::{open, open_in_memory};
pub use migrations::Migration;

/// Current unix time in seconds.
pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
