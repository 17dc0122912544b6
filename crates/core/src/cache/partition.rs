//! Partition operations.
//!
//! A partition is a named key-value store of captured responses. Opening is
//! idempotent, writes overwrite on key collision (last write wins), and each
//! entry is written by a single statement so concurrent eviction or purge can
//! never observe half an entry.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

use super::connection::PartitionStore;
use super::entry::{CachedResponse, declared_date, declared_size};
use super::hash::body_digest;
use crate::Error;

/// Handle to one named partition.
///
/// Handles are cheap and hold no lock; two handles opened under the same
/// name address the same entries.
#[derive(Clone, Debug)]
pub struct Partition {
    store: PartitionStore,
    name: String,
}

/// Size and age metadata of an entry, as declared by its headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub key: String,
    pub declared_size: u64,
    pub declared_date: DateTime<Utc>,
}

const ENSURE_PARTITION: &str = "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)";

const UPSERT_ENTRY: &str = "INSERT INTO entries (partition_id, key, status, headers_json, body, body_sha256, stored_at)
     VALUES ((SELECT id FROM partitions WHERE name = ?1), ?2, ?3, ?4, ?5, ?6, ?7)
     ON CONFLICT(partition_id, key) DO UPDATE SET
        status = excluded.status,
        headers_json = excluded.headers_json,
        body = excluded.body,
        body_sha256 = excluded.body_sha256,
        stored_at = excluded.stored_at";

fn decode_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(u16, String, Vec<u8>)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn into_response((status, headers_json, body): (u16, String, Vec<u8>)) -> Result<CachedResponse, Error> {
    let headers: BTreeMap<String, String> = serde_json::from_str(&headers_json)?;
    Ok(CachedResponse { status, headers, body: body.into() })
}

fn upsert(conn: &rusqlite::Connection, partition: &str, key: &str, response: &CachedResponse) -> Result<(), Error> {
    let headers_json = serde_json::to_string(&response.headers)?;
    conn.execute(
        UPSERT_ENTRY,
        params![
            partition,
            key,
            response.status,
            headers_json,
            response.body.as_ref(),
            body_digest(&response.body),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

impl PartitionStore {
    /// Open a partition, creating it if needed.
    pub async fn open_partition(&self, name: &str) -> Result<Partition, Error> {
        let owned = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(ENSURE_PARTITION, params![owned, Utc::now().to_rfc3339()])?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(Partition { store: self.clone(), name: name.to_string() })
    }

    pub async fn has_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists =
                    conn.query_row("SELECT EXISTS(SELECT 1 FROM partitions WHERE name = ?1)", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of every existing partition, in creation order.
    pub async fn partition_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY id")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a whole partition and its entries.
    ///
    /// Returns false if no partition had that name.
    pub async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM partitions WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Look a key up across every partition, oldest partition first.
    pub async fn match_any(&self, key: &str) -> Result<Option<CachedResponse>, Error> {
        let key = key.to_string();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<(u16, String, Vec<u8>)>, Error> {
                let row = conn
                    .query_row(
                        "SELECT e.status, e.headers_json, e.body
                         FROM entries e JOIN partitions p ON p.id = e.partition_id
                         WHERE e.key = ?1
                         ORDER BY p.id
                         LIMIT 1",
                        params![key],
                        decode_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(Error::from)?;

        row.map(into_response).transpose()
    }

    /// Sum of declared `content-length` over every entry in every partition.
    pub async fn total_declared_size(&self) -> Result<u64, Error> {
        let headers = self
            .conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT headers_json FROM entries")?;
                let rows = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)?;

        headers.iter().try_fold(0u64, |total, json| -> Result<u64, Error> {
            let headers: BTreeMap<String, String> = serde_json::from_str(json)?;
            Ok(total.saturating_add(declared_size(&headers)))
        })
    }
}

impl Partition {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store a response under `key`, overwriting any previous entry.
    ///
    /// The partition is recreated if it was deleted since this handle was
    /// opened; a write racing a purge simply lands in a fresh partition.
    pub async fn put(&self, key: &str, response: &CachedResponse) -> Result<(), Error> {
        let name = self.name.clone();
        let key = key.to_string();
        let response = response.clone();
        self.store
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(ENSURE_PARTITION, params![name, Utc::now().to_rfc3339()])?;
                upsert(conn, &name, &key, &response)
            })
            .await
            .map_err(Error::from)
    }

    /// Store a batch of responses atomically: either every entry lands or none.
    pub async fn put_all(&self, entries: Vec<(String, CachedResponse)>) -> Result<(), Error> {
        let name = self.name.clone();
        self.store
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(ENSURE_PARTITION, params![name, Utc::now().to_rfc3339()])?;
                for (key, response) in &entries {
                    upsert(&tx, &name, key, response)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look a key up within this partition only.
    pub async fn lookup(&self, key: &str) -> Result<Option<CachedResponse>, Error> {
        let name = self.name.clone();
        let key = key.to_string();
        let row = self
            .store
            .conn
            .call(move |conn| -> Result<Option<(u16, String, Vec<u8>)>, Error> {
                let row = conn
                    .query_row(
                        "SELECT e.status, e.headers_json, e.body
                         FROM entries e JOIN partitions p ON p.id = e.partition_id
                         WHERE p.name = ?1 AND e.key = ?2",
                        params![name, key],
                        decode_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(Error::from)?;

        row.map(into_response).transpose()
    }

    /// Keys stored in this partition, oldest write first.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        let name = self.name.clone();
        self.store
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT e.key FROM entries e JOIN partitions p ON p.id = e.partition_id
                     WHERE p.name = ?1 ORDER BY e.stored_at, e.key",
                )?;
                let keys = stmt
                    .query_map(params![name], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in this partition.
    pub async fn len(&self) -> Result<usize, Error> {
        let name = self.name.clone();
        self.store
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries e JOIN partitions p ON p.id = e.partition_id
                     WHERE p.name = ?1",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove one entry. Returns false if the key was absent.
    pub async fn delete(&self, key: &str) -> Result<bool, Error> {
        let name = self.name.clone();
        let key = key.to_string();
        self.store
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM entries
                     WHERE key = ?2 AND partition_id = (SELECT id FROM partitions WHERE name = ?1)",
                    params![name, key],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Size and date metadata for every entry, for eviction planning.
    pub async fn entry_meta(&self) -> Result<Vec<EntryMeta>, Error> {
        let name = self.name.clone();
        let rows = self
            .store
            .conn
            .call(move |conn| -> Result<Vec<(String, String)>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT e.key, e.headers_json FROM entries e JOIN partitions p ON p.id = e.partition_id
                     WHERE p.name = ?1",
                )?;
                let rows = stmt
                    .query_map(params![name], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)?;

        rows.into_iter()
            .map(|(key, json)| -> Result<EntryMeta, Error> {
                let headers: BTreeMap<String, String> = serde_json::from_str(&json)?;
                Ok(EntryMeta { key, declared_size: declared_size(&headers), declared_date: declared_date(&headers) })
            })
            .collect()
    }

    /// Digest of the stored body for `key`, if present.
    pub async fn body_digest(&self, key: &str) -> Result<Option<String>, Error> {
        let name = self.name.clone();
        let key = key.to_string();
        self.store
            .conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let digest = conn
                    .query_row(
                        "SELECT e.body_sha256 FROM entries e JOIN partitions p ON p.id = e.partition_id
                         WHERE p.name = ?1 AND e.key = ?2",
                        params![name, key],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(digest)
            })
            .await
            .map_err(Error::from)
    }
}
