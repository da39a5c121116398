use std::{
    collections::BTreeMap,
    hash::{DefaultHasher, Hash, Hasher},
    ops::RangeBounds,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::backend::{
    KeyValue, PendingWrite, StorageBackend, StorageError, StorageResult, Transaction,
};

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self { value: Bytes::from(value), expires_at: ttl.map(|ttl| Instant::now() + ttl) }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

type Store = BTreeMap<Vec<u8>, Entry>;

/// Number of independently locked stripes of the key space
const SHARD_COUNT: usize = 16;

fn shard_index(key: &[u8]) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % SHARD_COUNT as u64) as usize
}

fn write_key(write: &PendingWrite) -> &[u8] {
    match write {
        PendingWrite::Set { key, .. }
        | PendingWrite::Delete { key }
        | PendingWrite::CompareAndSet { key, .. } => key,
    }
}

fn live_value(store: &Store, key: &[u8], now: Instant) -> Option<Bytes> {
    store.get(key).filter(|entry| entry.is_live(now)).map(|entry| entry.value.clone())
}

fn check_expected(store: &Store, key: &[u8], expected: Option<&[u8]>, now: Instant) -> StorageResult<()> {
    let current = live_value(store, key, now);
    let matches = match (current.as_deref(), expected) {
        (None, None) => true,
        (Some(current), Some(expected)) => current == expected,
        _ => false,
    };
    if matches { Ok(()) } else { Err(StorageError::conflict(key)) }
}

/// In-memory backend for development and tests
///
/// Keys are striped over [`SHARD_COUNT`] maps, each behind its own lock, so
/// writers on unrelated keys rarely wait on each other. Range scans visit
/// every shard. Clones share the same underlying maps.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    shards: Arc<[RwLock<Store>]>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self { shards: (0..SHARD_COUNT).map(|_| RwLock::new(Store::new())).collect() }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn shard(&self, key: &[u8]) -> &RwLock<Store> {
        &self.shards[shard_index(key)]
    }

    async fn cas(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> StorageResult<()> {
        let mut store = self.shard(key).write().await;
        check_expected(&store, key, expected, Instant::now())?;
        store.insert(key.to_vec(), Entry::new(new_value, ttl));
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        let store = self.shard(key).read().await;
        Ok(live_value(&store, key, Instant::now()))
    }

    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        self.shard(&key).write().await.insert(key, Entry::new(value, None));
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.shard(key).write().await.remove(key);
        Ok(())
    }

    async fn get_range<R>(&self, range: R) -> StorageResult<Vec<KeyValue>>
    where
        R: RangeBounds<Vec<u8>> + Send,
    {
        let now = Instant::now();
        let bounds = (range.start_bound(), range.end_bound());

        let mut found = Vec::new();
        for shard in self.shards.iter() {
            let store = shard.read().await;
            found.extend(
                store
                    .range::<Vec<u8>, _>(bounds)
                    .filter(|(_, entry)| entry.is_live(now))
                    .map(|(key, entry)| KeyValue {
                        key: Bytes::from(key.clone()),
                        value: entry.value.clone(),
                    }),
            );
        }
        found.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(found)
    }

    async fn clear_range<R>(&self, range: R) -> StorageResult<()>
    where
        R: RangeBounds<Vec<u8>> + Send,
    {
        let bounds = (range.start_bound(), range.end_bound());
        for shard in self.shards.iter() {
            let mut store = shard.write().await;
            let keys: Vec<Vec<u8>> =
                store.range::<Vec<u8>, _>(bounds).map(|(key, _)| key.clone()).collect();
            for key in keys {
                store.remove(&key);
            }
        }
        Ok(())
    }

    async fn set_with_ttl(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        self.shard(&key).write().await.insert(key, Entry::new(value, Some(ttl)));
        Ok(())
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
        Ok(Box::new(MemoryTransaction { backend: self.clone(), writes: Vec::new() }))
    }

    async fn purge_expired(&self) -> StorageResult<usize> {
        let now = Instant::now();
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut store = shard.write().await;
            let before = store.len();
            store.retain(|_, entry| entry.is_live(now));
            removed += before - store.len();
        }
        Ok(removed)
    }

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

struct MemoryTransaction {
    backend: MemoryBackend,
    writes: Vec<PendingWrite>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
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
        let now = Instant::now();
        let MemoryTransaction { backend, writes } = *self;

        let mut by_shard: BTreeMap<usize, Vec<PendingWrite>> = BTreeMap::new();
        for write in writes {
            by_shard.entry(shard_index(write_key(&write))).or_default().push(write);
        }

        // every touched shard stays locked until all writes land; ascending order avoids deadlock
        let mut locked = Vec::with_capacity(by_shard.len());
        for (index, writes) in by_shard {
            locked.push((backend.shards[index].write().await, writes));
        }

        for (store, writes) in &locked {
            for write in writes {
                if let PendingWrite::CompareAndSet { key, expected, .. } = write {
                    check_expected(store, key, expected.as_deref(), now)?;
                }
            }
        }

        for (mut store, writes) in locked {
            for write in writes {
                match write {
                    PendingWrite::Set { key, value }
                    | PendingWrite::CompareAndSet { key, new_value: value, .. } => {
                        store.insert(key, Entry::new(value, None));
                    },
                    PendingWrite::Delete { key } => {
                        store.remove(&key);
                    },
                }
            }
        }
        Ok(())
    }
}
