//! Storage abstraction shared by every repository in the control plane.
//!
//! Keys and values are opaque bytes. Entries may carry a TTL; an expired entry
//! is indistinguishable from an absent one for every read, range scan and
//! compare-and-set.

use std::{ops::RangeBounds, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;

/// Storage operation failures
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Compare-and-set precondition did not hold
    #[error("Conflict on key {key}")]
    Conflict { key: String },

    #[error("Key not found: {key}")]
    NotFound { key: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Internal storage error: {0}")]
    Internal(String),
}

impl StorageError {
    pub fn conflict(key: &[u8]) -> Self {
        StorageError::Conflict { key: String::from_utf8_lossy(key).into_owned() }
    }

    pub fn not_found(key: &[u8]) -> Self {
        StorageError::NotFound { key: String::from_utf8_lossy(key).into_owned() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        StorageError::Internal(message.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A key-value pair returned by range scans
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Bytes,
    pub value: Bytes,
}

/// Key-value storage with TTL, compare-and-set and atomic multi-key commits
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()>;

    async fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Live entries in `range`, ordered by key
    async fn get_range<R>(&self, range: R) -> StorageResult<Vec<KeyValue>>
    where
        R: RangeBounds<Vec<u8>> + Send;

    async fn clear_range<R>(&self, range: R) -> StorageResult<()>
    where
        R: RangeBounds<Vec<u8>> + Send;

    async fn set_with_ttl(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) -> StorageResult<()>;

    /// Write `new_value` only if the current value equals `expected`
    ///
    /// `expected: None` means insert-if-absent. A mismatch returns
    /// [`StorageError::Conflict`].
    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
    ) -> StorageResult<()>;

    /// [`compare_and_set`](Self::compare_and_set) that also (re)sets the entry TTL
    async fn compare_and_set_with_ttl(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
        ttl: Duration,
    ) -> StorageResult<()>;

    async fn transaction(&self) -> StorageResult<Box<dyn Transaction>>;

    /// Physically remove expired entries, returning how many were dropped
    async fn purge_expired(&self) -> StorageResult<usize>;

    async fn health_check(&self) -> StorageResult<()>;
}

/// Buffered writes applied atomically on [`commit`](Transaction::commit)
///
/// Compare-and-set preconditions are checked at commit time; if any fails
/// nothing is written.
#[async_trait]
pub trait Transaction: Send {
    /// Read through the transaction's own pending writes
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>);

    fn delete(&mut self, key: Vec<u8>);

    fn compare_and_set(
        &mut self,
        key: Vec<u8>,
        expected: Option<Vec<u8>>,
        new_value: Vec<u8>,
    ) -> StorageResult<()>;

    async fn commit(self: Box<Self>) -> StorageResult<()>;
}

/// A write waiting in a transaction buffer
#[derive(Debug, Clone)]
pub(crate) enum PendingWrite {
    Set { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
    CompareAndSet { key: Vec<u8>, expected: Option<Vec<u8>>, new_value: Vec<u8> },
}

impl PendingWrite {
    /// Most recent pending value for `key`: `Some(None)` for a pending delete
    pub(crate) fn lookup(writes: &[PendingWrite], key: &[u8]) -> Option<Option<Bytes>> {
        writes.iter().rev().find_map(|write| match write {
            PendingWrite::Set { key: k, value } | PendingWrite::CompareAndSet { key: k, new_value: value, .. }
                if k.as_slice() == key =>
            {
                Some(Some(Bytes::from(value.clone())))
            },
            PendingWrite::Delete { key: k } if k.as_slice() == key => Some(None),
            _ => None,
        })
    }
}

/// Build the exclusive upper bound for a prefix scan
///
/// `prefix_end(b"job:")` is `b"job;"`, so `prefix..prefix_end(prefix)`
/// covers every key starting with `prefix`.
pub fn prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return end;
        }
    }
    vec![u8::MAX]
}
