//! Durable backend on a single SQLite table.
//!
//! The connection lives behind `Arc<Mutex<_>>` and every call runs on the
//! blocking pool. Compare-and-set and transactions use `BEGIN IMMEDIATE` so
//! the precondition check and the write are atomic with respect to other
//! writers.

use std::{
    ops::{Bound, RangeBounds},
    path::Path,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, types::Value};

use crate::backend::{
    KeyValue, PendingWrite, StorageBackend, StorageError, StorageResult, Transaction,
};

const SCHEMA: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    CREATE TABLE IF NOT EXISTS kv (
        key BLOB PRIMARY KEY,
        value BLOB NOT NULL,
        expires_at INTEGER
    );
    CREATE INDEX IF NOT EXISTS kv_expires_at ON kv (expires_at) WHERE expires_at IS NOT NULL;
";

const LIVE: &str = "(expires_at IS NULL OR expires_at > ?)";

fn sql_err(e: rusqlite::Error) -> StorageError {
    StorageError::internal(format!("SQLite error: {e}"))
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn expiry_millis(ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|ttl| now_millis().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)))
}

fn read_live(conn: &Connection, key: &[u8], now: i64) -> StorageResult<Option<Vec<u8>>> {
    conn.query_row(
        "SELECT value FROM kv WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
        params![key, now],
        |row| row.get(0),
    )
    .optional()
    .map_err(sql_err)
}

fn upsert(conn: &Connection, key: &[u8], value: &[u8], expires_at: Option<i64>) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        params![key, value, expires_at],
    )
    .map_err(sql_err)?;
    Ok(())
}

fn check_expected(
    conn: &Connection,
    key: &[u8],
    expected: Option<&[u8]>,
    now: i64,
) -> StorageResult<()> {
    let current = read_live(conn, key, now)?;
    if current.as_deref() == expected { Ok(()) } else { Err(StorageError::conflict(key)) }
}

/// `WHERE` fragment and parameters for a key range
fn range_clause(start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    match start {
        Bound::Included(key) => {
            clauses.push("key >= ?");
            params.push(Value::Blob(key));
        },
        Bound::Excluded(key) => {
            clauses.push("key > ?");
            params.push(Value::Blob(key));
        },
        Bound::Unbounded => {},
    }
    match end {
        Bound::Included(key) => {
            clauses.push("key <= ?");
            params.push(Value::Blob(key));
        },
        Bound::Excluded(key) => {
            clauses.push("key < ?");
            params.push(Value::Blob(key));
        },
        Bound::Unbounded => {},
    }
    let clause = if clauses.is_empty() { "1 = 1".to_string() } else { clauses.join(" AND ") };
    (clause, params)
}

/// SQLite-backed storage
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open (creating if needed) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| StorageError::Connection(format!("Failed to open {}: {e}", path.as_ref().display())))?;
        Self::init(conn)
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Connection(format!("Failed to open in-memory database: {e}")))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA).map_err(sql_err)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn run<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard =
                conn.lock().map_err(|_| StorageError::internal("SQLite connection lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StorageError::internal(format!("SQLite task failed: {e}")))?
    }

    async fn cas(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> StorageResult<()> {
        let key = key.to_vec();
        let expected = expected.map(<[u8]>::to_vec);
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate).map_err(sql_err)?;
            check_expected(&tx, &key, expected.as_deref(), now_millis())?;
            upsert(&tx, &key, &new_value, expiry_millis(ttl))?;
            tx.commit().map_err(sql_err)
        })
        .await
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        let key = key.to_vec();
        let value = self.run(move |conn| read_live(conn, &key, now_millis())).await?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        self.run(move |conn| upsert(conn, &key, &value, None)).await
    }

    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        let key = key.to_vec();
        self.run(move |conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key]).map_err(sql_err)?;
            Ok(())
        })
        .await
    }

    async fn get_range<R>(&self, range: R) -> StorageResult<Vec<KeyValue>>
    where
        R: RangeBounds<Vec<u8>> + Send,
    {
        let (clause, mut params) =
            range_clause(range.start_bound().cloned(), range.end_bound().cloned());
        self.run(move |conn| {
            params.push(Value::Integer(now_millis()));
            let sql = format!("SELECT key, value FROM kv WHERE {clause} AND {LIVE} ORDER BY key");
            let mut stmt = conn.prepare(&sql).map_err(sql_err)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params), |row| {
                    Ok(KeyValue {
                        key: Bytes::from(row.get::<_, Vec<u8>>(0)?),
                        value: Bytes::from(row.get::<_, Vec<u8>>(1)?),
                    })
                })
                .map_err(sql_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(sql_err)
        })
        .await
    }

    async fn clear_range<R>(&self, range: R) -> StorageResult<()>
    where
        R: RangeBounds<Vec<u8>> + Send,
    {
        let (clause, params) =
            range_clause(range.start_bound().cloned(), range.end_bound().cloned());
        self.run(move |conn| {
            conn.execute(&format!("DELETE FROM kv WHERE {clause}"), rusqlite::params_from_iter(params))
                .map_err(sql_err)?;
            Ok(())
        })
        .await
    }

    async fn set_with_ttl(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        self.run(move |conn| upsert(conn, &key, &value, expiry_millis(Some(ttl)))).await
    }

    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
    ) -> StorageResult<()> {
        self.cas(key, expected, new_value, None).await
    }

    async fn compare_and_set_with_ttl(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
        ttl: Duration,
    ) -> StorageResult<()> {
        self.cas(key, expected, new_value, Some(ttl)).await
    }

    async fn transaction(&self) -> StorageResult<Box<dyn Transaction>> {
        Ok(Box::new(SqliteTransaction { backend: self.clone(), writes: Vec::new() }))
    }

    async fn purge_expired(&self) -> StorageResult<usize> {
        self.run(|conn| {
            conn.execute(
                "DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now_millis()],
            )
            .map_err(sql_err)
        })
        .await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.run(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(|e| StorageError::Connection(format!("SQLite health check failed: {e}")))?;
            Ok(())
        })
        .await
    }
}

struct SqliteTransaction {
    backend: SqliteBackend,
    writes: Vec<PendingWrite>,
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        match PendingWrite::lookup(&self.writes, key) {
            Some(pending) => Ok(pending),
            None => self.backend.get(key).await,
        }
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.writes.push(PendingWrite::Set { key, value });
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.writes.push(PendingWrite::Delete { key });
    }

    fn compare_and_set(
        &mut self,
        key: Vec<u8>,
        expected: Option<Vec<u8>>,
        new_value: Vec<u8>,
    ) -> StorageResult<()> {
        self.writes.push(PendingWrite::CompareAndSet { key, expected, new_value });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let SqliteTransaction { backend, writes } = *self;
        backend
            .run(move |conn| {
                let tx =
                    conn.transaction_with_behavior(TransactionBehavior::Immediate).map_err(sql_err)?;
                let now = now_millis();
                for write in &writes {
                    match write {
                        PendingWrite::Set { key, value } => upsert(&tx, key, value, None)?,
                        PendingWrite::Delete { key } => {
                            tx.execute("DELETE FROM kv WHERE key = ?1", params![key])
                                .map_err(sql_err)?;
                        },
                        PendingWrite::CompareAndSet { key, expected, new_value } => {
                            check_expected(&tx, key, expected.as_deref(), now)?;
                            upsert(&tx, key, new_value, None)?;
                        },
                    }
                }
                tx.commit().map_err(sql_err)
            })
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::backend::prefix_end;

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.db");

        {
            let backend = SqliteBackend::open(&path).unwrap();
            backend.set(b"revocation:01".to_vec(), b"record".to_vec()).await.unwrap();
        }

        let reopened = SqliteBackend::open(&path).unwrap();
        assert_eq!(reopened.get(b"revocation:01").await.unwrap(), Some(Bytes::from("record")));
    }

    #[tokio::test]
    async fn compare_and_set_semantics() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.compare_and_set(b"k", None, b"1".to_vec()).await.unwrap();
        assert!(backend.compare_and_set(b"k", None, b"x".to_vec()).await.unwrap_err().is_conflict());
        assert!(
            backend.compare_and_set(b"k", Some(b"0"), b"x".to_vec()).await.unwrap_err().is_conflict()
        );
        backend.compare_and_set(b"k", Some(b"1"), b"2".to_vec()).await.unwrap();
        assert_eq!(backend.get(b"k").await.unwrap(), Some(Bytes::from("2")));
    }

    #[tokio::test]
    async fn ttl_expiry_hides_and_purges() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .compare_and_set_with_ttl(b"bucket", None, b"v".to_vec(), Duration::from_millis(10))
            .await
            .unwrap();
        backend.set(b"keep".to_vec(), b"v".to_vec()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(backend.get(b"bucket").await.unwrap().is_none());
        assert_eq!(backend.purge_expired().await.unwrap(), 1);
        assert!(backend.get(b"keep").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn range_scan_matches_prefix() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        for key in ["job:2", "job:1", "jobs", "ca:root"] {
            backend.set(key.as_bytes().to_vec(), b"v".to_vec()).await.unwrap();
        }

        let start = b"job:".to_vec();
        let end = prefix_end(&start);
        let keys: Vec<_> = backend
            .get_range(start.clone()..end.clone())
            .await
            .unwrap()
            .into_iter()
            .map(|kv| kv.key)
            .collect();
        assert_eq!(keys, vec![Bytes::from("job:1"), Bytes::from("job:2")]);

        backend.clear_range(start..end).await.unwrap();
        assert!(backend.get(b"job:1").await.unwrap().is_none());
        assert!(backend.get(b"jobs").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn transaction_rolls_back_on_conflict() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.set(b"record".to_vec(), b"current".to_vec()).await.unwrap();

        let mut txn = backend.transaction().await.unwrap();
        txn.set(b"index".to_vec(), b"1".to_vec());
        txn.compare_and_set(b"record".to_vec(), Some(b"stale".to_vec()), b"new".to_vec()).unwrap();
        assert!(txn.commit().await.unwrap_err().is_conflict());
        assert!(backend.get(b"index").await.unwrap().is_none());

        let mut txn = backend.transaction().await.unwrap();
        txn.set(b"index".to_vec(), b"1".to_vec());
        txn.compare_and_set(b"record".to_vec(), Some(b"current".to_vec()), b"new".to_vec()).unwrap();
        txn.commit().await.unwrap();
        assert_eq!(backend.get(b"record").await.unwrap(), Some(Bytes::from("new")));
        assert_eq!(backend.get(b"index").await.unwrap(), Some(Bytes::from("1")));
    }

    #[tokio::test]
    async fn health_check_passes() {
        SqliteBackend::open_in_memory().unwrap().health_check().await.unwrap();
    }
}
