//! Connection opening with pragma configuration.

use super::migrations::{self, Migration};
use crate::Error;
use std::path::Path;
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA busy_timeout=5000;
     PRAGMA foreign_keys=ON;";

/// Open a database at the specified path.
///
/// Creates the file if it doesn't exist, applies the shared pragmas,
/// and runs any pending migrations from `migrations`.
pub async fn open(path: impl AsRef<Path>, migrations: &'static [Migration]) -> Result<Connection, Error> {
    let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
    configure(&conn, migrations).await?;
    Ok(conn)
}

/// Open an in-memory database with the same configuration, for tests.
pub async fn open_in_memory(migrations: &'static [Migration]) -> Result<Connection, Error> {
    let conn = Connection::open_in_memory()
        .await
        .map_err(|e| Error::Database(e.into()))?;
    configure(&conn, migrations).await?;
    Ok(conn)
}

async fn configure(conn: &Connection, migrations: &'static [Migration]) -> Result<(), Error> {
    conn.call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        Ok(())
    })
    .await
    .map_err(Error::Database)?;

    migrations::run(conn, migrations).await
}
