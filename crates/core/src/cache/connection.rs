//! Partition store handle with pragma configuration.
//!
//! This module handles opening the SQLite database backing every partition,
//! applying pragmas for concurrent readers (WAL mode) and cascading deletes,
//! and running migrations.

use super::migrations;
use crate::Error;
use std::path::Path;
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Handle over the store holding every named partition.
///
/// Wraps a tokio-rusqlite Connection that runs database operations on a
/// background thread. Cloning is cheap and every clone addresses the same
/// partitions, so the store is shared freely between in-flight requests.
#[derive(Clone, Debug)]
pub struct PartitionStore {
    pub(crate) conn: Connection,
}

impl PartitionStore {
    /// Open a store at the specified path.
    ///
    /// Creates the file if it doesn't exist. Partitions persist across
    /// restarts until activation of a newer version removes them.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    /// Open an in-memory store for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let store = PartitionStore::open_in_memory().await.unwrap();
        let fk: i64 = store
            .conn
            .call(|conn| conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[tokio::test]
    async fn test_reopen_file_keeps_partitions() {
        let dir = std::env::temp_dir().join(format!("tidecache-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("reopen.sqlite");
        let _ = std::fs::remove_file(&path);

        {
            let store = PartitionStore::open(&path).await.unwrap();
            store.open_partition("static-pwa-v1.0.0").await.unwrap();
        }

        let store = PartitionStore::open(&path).await.unwrap();
        assert!(store.has_partition("static-pwa-v1.0.0").await.unwrap());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
