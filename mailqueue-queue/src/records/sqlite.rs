use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use mailqueue_common::{Domain, internal};
use mailqueue_store::{BlobStore, MessageKey};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params, types::Type};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{QueueEntry, QueueError, RecordError, records::RecordStore};

type ConnectionGuard = OwnedMutexGuard<Connection>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS queue_entries (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    key                   TEXT    NOT NULL,
    mail_from             TEXT    NOT NULL,
    return_path           TEXT    NOT NULL,
    rcpt_to               TEXT    NOT NULL,
    host                  TEXT    NOT NULL,
    added_at              TEXT    NOT NULL,
    delivery_started_at   TEXT    NOT NULL,
    next_delivery_at      TEXT    NOT NULL,
    delivery_in_progress  INTEGER NOT NULL,
    delivery_failed_count INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS queue_entries_key ON queue_entries (key);
CREATE TABLE IF NOT EXISTS message_pins (
    key  TEXT    PRIMARY KEY,
    pins INTEGER NOT NULL
);
";

const SELECT_COLUMNS: &str = "id, key, mail_from, return_path, rcpt_to, host, added_at, \
    delivery_started_at, next_delivery_at, delivery_in_progress, delivery_failed_count";

/// SQLite-backed record store
///
/// The connection sits behind a mutex and every statement runs on tokio's
/// blocking pool, so async callers never stall the runtime on disk I/O.
///
/// `delete_unreferenced` runs inside `BEGIN IMMEDIATE` and keeps the
/// transaction open while the blob is deleted. SQLite admits one writer per
/// database, so a `pin` or `create` from any connection, in this process or
/// another, waits (up to the busy timeout) until the blob decision is
/// committed.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Open (or create) the database at `path` and apply the schema
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let path = path.as_ref().to_path_buf();
        internal!("Opening record store at {}", path.display());

        let conn = tokio::task::spawn_blocking(move || Connection::open(path)).await??;
        Self::from_connection(conn)
    }

    /// A private in-memory database, mostly useful for tests
    ///
    /// # Errors
    /// Returns an error if the schema cannot be applied
    pub fn open_in_memory() -> Result<Self, RecordError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, RecordError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn lock(&self) -> ConnectionGuard {
        Arc::clone(&self.conn).lock_owned().await
    }

    async fn call<F, R>(&self, f: F) -> Result<R, RecordError>
    where
        F: FnOnce(&mut Connection) -> Result<R, RecordError> + Send + 'static,
        R: Send + 'static,
    {
        let (_, result) = run(self.lock().await, move |conn| -> Result<R, RecordError> {
            finish_stale_transaction(conn)?;
            f(conn)
        })
        .await?;
        result
    }
}

/// Run `f` on the blocking pool, handing the connection guard back so a
/// caller can keep a transaction open across awaits
async fn run<F, R>(mut guard: ConnectionGuard, f: F) -> Result<(ConnectionGuard, R), RecordError>
where
    F: FnOnce(&mut Connection) -> R + Send + 'static,
    R: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(move || {
        let result = f(&mut *guard);
        (guard, result)
    })
    .await?)
}

/// Commit a transaction abandoned by a cancelled `delete_unreferenced`
///
/// Its entry delete stands; at worst the blob outlives its last entry.
fn finish_stale_transaction(conn: &Connection) -> Result<(), RecordError> {
    if !conn.is_autocommit() {
        internal!(level = WARN, "Committing an abandoned record store transaction");
        conn.execute_batch("COMMIT")?;
    }
    Ok(())
}

fn delete_entry(conn: &Connection, id: i64) -> Result<(), RecordError> {
    match conn.execute("DELETE FROM queue_entries WHERE id = ?1", params![id])? {
        0 => Err(RecordError::NotFound(id)),
        _ => Ok(()),
    }
}

fn count_entries(conn: &Connection, key: &MessageKey) -> Result<u64, RecordError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM queue_entries WHERE key = ?1",
        params![key.as_str()],
        |row| row.get(0),
    )?;
    u64::try_from(count).map_err(|e| RecordError::InvalidRow(e.to_string()))
}

/// Entries plus pins on `key`
fn count_references(conn: &Connection, key: &MessageKey) -> Result<u64, RecordError> {
    let pins: i64 = conn
        .query_row(
            "SELECT pins FROM message_pins WHERE key = ?1",
            params![key.as_str()],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);
    let pins = u64::try_from(pins).map_err(|e| RecordError::InvalidRow(e.to_string()))?;

    Ok(count_entries(conn, key)? + pins)
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<QueueEntry> {
    let key: String = row.get(1)?;
    let key = MessageKey::parse(&key).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            format!("invalid message key {key:?}").into(),
        )
    })?;

    Ok(QueueEntry {
        id: row.get(0)?,
        key,
        mail_from: row.get(2)?,
        return_path: row.get(3)?,
        rcpt_to: row.get(4)?,
        host: Domain::from(row.get::<_, String>(5)?),
        added_at: row.get(6)?,
        delivery_started_at: row.get(7)?,
        next_delivery_at: row.get(8)?,
        delivery_in_progress: row.get(9)?,
        delivery_failed_count: row.get(10)?,
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn create(&self, entry: &mut QueueEntry) -> Result<(), RecordError> {
        let row = entry.clone();
        entry.id = self
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO queue_entries (key, mail_from, return_path, rcpt_to, host, \
                     added_at, delivery_started_at, next_delivery_at, delivery_in_progress, \
                     delivery_failed_count) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        row.key.as_str(),
                        row.mail_from,
                        row.return_path,
                        row.rcpt_to,
                        row.host.as_str(),
                        row.added_at,
                        row.delivery_started_at,
                        row.next_delivery_at,
                        row.delivery_in_progress,
                        row.delivery_failed_count,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        Ok(())
    }

    async fn delete(&self, entry: &QueueEntry) -> Result<(), RecordError> {
        let id = entry.id;
        self.call(move |conn| delete_entry(conn, id)).await
    }

    async fn count_by_key(&self, key: &MessageKey) -> Result<u64, RecordError> {
        let key = key.clone();
        self.call(move |conn| count_entries(conn, &key)).await
    }

    async fn get(&self, id: i64) -> Result<QueueEntry, RecordError> {
        self.call(move |conn| {
            conn.query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM queue_entries WHERE id = ?1"),
                params![id],
                entry_from_row,
            )
            .optional()?
            .ok_or(RecordError::NotFound(id))
        })
        .await
    }

    async fn pin(&self, key: &MessageKey) -> Result<(), RecordError> {
        let key = key.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO message_pins (key, pins) VALUES (?1, 1) \
                 ON CONFLICT (key) DO UPDATE SET pins = pins + 1",
                params![key.as_str()],
            )?;
            Ok(())
        })
        .await
    }

    async fn unpin(&self, key: &MessageKey) -> Result<(), RecordError> {
        let key = key.clone();
        self.call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "UPDATE message_pins SET pins = pins - 1 WHERE key = ?1",
                params![key.as_str()],
            )?;
            tx.execute(
                "DELETE FROM message_pins WHERE key = ?1 AND pins <= 0",
                params![key.as_str()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete_unreferenced(
        &self,
        entry: &QueueEntry,
        blobs: &dyn BlobStore,
    ) -> Result<u64, QueueError> {
        let id = entry.id;
        let key = entry.key.clone();

        let (guard, counted) = run(self.lock().await, move |conn| -> Result<u64, RecordError> {
            finish_stale_transaction(conn)?;
            conn.execute_batch("BEGIN IMMEDIATE")?;

            if let Err(err) = delete_entry(conn, id) {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(err);
            }

            match count_references(conn, &key) {
                Ok(remaining) => Ok(remaining),
                Err(err) => {
                    let _ = conn.execute_batch("COMMIT");
                    Err(err)
                }
            }
        })
        .await?;
        let remaining = counted?;

        // Still inside the transaction: no new reference can be added
        let collected = if remaining == 0 {
            blobs.del(&entry.key).await
        } else {
            Ok(())
        };

        let (_, committed) = run(guard, |conn| conn.execute_batch("COMMIT")).await?;
        committed.map_err(RecordError::from)?;
        collected?;

        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use mailqueue_common::Address;
    use mailqueue_store::MemoryBlobStore;
    use pretty_assertions::assert_eq;

    use super::*;

    fn entry(body: &[u8], rcpt: &str) -> QueueEntry {
        let rcpt: Address = rcpt.parse().unwrap();
        QueueEntry::new(
            MessageKey::digest(body),
            "from@example.com".to_string(),
            "bounce@example.com".to_string(),
            &rcpt,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let mut created = entry(b"message", "rcpt@dest.example");

        store.create(&mut created).await.unwrap();
        assert_eq!(created.id, 1);

        let loaded = store.get(created.id).await.unwrap();
        assert_eq!(loaded, created);
    }

    #[tokio::test]
    async fn test_pins_hold_the_blob() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let blobs = MemoryBlobStore::new();
        let key = MessageKey::digest(b"shared");
        blobs.put(&key, b"shared").await.unwrap();

        let mut first = entry(b"shared", "a@x.com");
        store.create(&mut first).await.unwrap();
        store.pin(&key).await.unwrap();
        store.pin(&key).await.unwrap();

        assert_eq!(store.delete_unreferenced(&first, &blobs).await.unwrap(), 2);
        assert!(blobs.contains(&key));

        store.unpin(&key).await.unwrap();
        store.unpin(&key).await.unwrap();
        // Dropping below zero is clamped by deleting the row
        store.unpin(&key).await.unwrap();

        let mut second = entry(b"shared", "b@x.com");
        store.create(&mut second).await.unwrap();
        assert_eq!(store.delete_unreferenced(&second, &blobs).await.unwrap(), 0);
        assert!(!blobs.contains(&key));
    }

    #[tokio::test]
    async fn test_failed_delete_leaves_no_transaction_open() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let blobs = MemoryBlobStore::new();
        let mut ghost = entry(b"m", "a@x.com");
        ghost.id = 42;

        let err = store.delete_unreferenced(&ghost, &blobs).await.unwrap_err();
        assert!(matches!(err, QueueError::Record(RecordError::NotFound(42))));

        assert!(store.lock().await.is_autocommit());
        store.create(&mut entry(b"m", "b@x.com")).await.unwrap();
    }

    #[tokio::test]
    async fn test_count_and_delete() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let key = MessageKey::digest(b"shared");

        let mut first = entry(b"shared", "a@x.com");
        let mut second = entry(b"shared", "b@x.com");
        store.create(&mut first).await.unwrap();
        store.create(&mut second).await.unwrap();
        assert_eq!(store.count_by_key(&key).await.unwrap(), 2);

        store.delete(&first).await.unwrap();
        assert_eq!(store.count_by_key(&key).await.unwrap(), 1);

        assert!(matches!(
            store.delete(&first).await,
            Err(RecordError::NotFound(1))
        ));
        assert!(matches!(store.get(1).await, Err(RecordError::NotFound(1))));
    }
}
