//! Unified error types for the cache-warming queue.
//!
//! Probe transport failures are not represented here: they are recorded as
//! data (status 900) and never surface as an `Error`.

use tokio_rusqlite::rusqlite;

/// Unified error type shared by the store, the admin API and the runner.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty identifier).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid or unsupported URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Database operation failed.
    #[error("DATABASE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("MIGRATION_FAILED: {0}")]
    MigrationFailed(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP_CLIENT: {0}")]
    HttpClient(String),

    /// A worker task panicked or was cancelled.
    #[error("TASK_FAILED: {0}")]
    TaskFailed(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
