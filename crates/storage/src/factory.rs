use std::{ops::RangeBounds, path::PathBuf, time::Duration};

use async_trait::async_trait;
use bon::Builder;
use bytes::Bytes;

use crate::{
    MemoryBackend, SqliteBackend,
    backend::{KeyValue, StorageBackend, StorageError, StorageResult, Transaction},
};

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackendType {
    /// In-memory storage (for development and testing)
    Memory,
    /// SQLite file storage (durable)
    Sqlite,
}

/// Storage backend configuration
#[derive(Debug, Clone, Builder)]
pub struct StorageConfig {
    /// Backend type
    pub backend_type: StorageBackendType,
    /// Database file (only used for the SQLite backend)
    #[builder(into)]
    pub sqlite_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Create a new in-memory storage configuration
    pub fn memory() -> Self {
        Self { backend_type: StorageBackendType::Memory, sqlite_path: None }
    }

    /// Create a new SQLite storage configuration
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self { backend_type: StorageBackendType::Sqlite, sqlite_path: Some(path.into()) }
    }
}

/// Backend enum wrapper that implements StorageBackend
#[derive(Debug, Clone)]
pub enum Backend {
    Memory(MemoryBackend),
    Sqlite(SqliteBackend),
}

impl Backend {
    /// Creates a new in-memory backend.
    #[must_use]
    pub fn memory() -> Self {
        Backend::Memory(MemoryBackend::new())
    }

    /// Returns the underlying `MemoryBackend` if this is a memory backend.
    #[must_use]
    pub fn as_memory(&self) -> Option<&MemoryBackend> {
        match self {
            Backend::Memory(storage) => Some(storage),
            Backend::Sqlite(_) => None,
        }
    }

    /// Whether data written through this backend survives a restart
    pub fn is_durable(&self) -> bool {
        matches!(self, Backend::Sqlite(_))
    }
}

/// Delegates a method call to the inner storage backend of each `Backend` variant.
macro_rules! delegate_storage {
    ($self:ident, $method:ident ( $($arg:expr),* )) => {
        match $self {
            Backend::Memory(__backend) => __backend.$method($($arg),*).await,
            Backend::Sqlite(__backend) => __backend.$method($($arg),*).await,
        }
    };
}

#[async_trait]
impl StorageBackend for Backend {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        delegate_storage!(self, get(key))
    }

    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        delegate_storage!(self, set(key, value))
    }

    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        delegate_storage!(self, delete(key))
    }

    async fn get_range<R>(&self, range: R) -> StorageResult<Vec<KeyValue>>
    where
        R: RangeBounds<Vec<u8>> + Send,
    {
        delegate_storage!(self, get_range(range))
    }

    async fn clear_range<R>(&self, range: R) -> StorageResult<()>
    where
        R: RangeBounds<Vec<u8>> + Send,
    {
        delegate_storage!(self, clear_range(range))
    }

    async fn set_with_ttl(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        delegate_storage!(self, set_with_ttl(key, value, ttl))
    }

    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
    ) -> StorageResult<()> {
        delegate_storage!(self, compare_and_set(key, expected, new_value))
    }

    async fn compare_and_set_with_ttl(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
        ttl: Duration,
    ) -> StorageResult<()> {
        delegate_storage!(self, compare_and_set_with_ttl(key, expected, new_value, ttl))
    }

    async fn transaction(&self) -> StorageResult<Box<dyn Transaction>> {
        delegate_storage!(self, transaction())
    }

    async fn purge_expired(&self) -> StorageResult<usize> {
        delegate_storage!(self, purge_expired())
    }

    async fn health_check(&self) -> StorageResult<()> {
        delegate_storage!(self, health_check())
    }
}

/// Create a storage backend based on configuration
///
/// # Errors
///
/// Returns an error if the SQLite path is missing or the database cannot be
/// opened.
pub async fn create_storage_backend(config: &StorageConfig) -> StorageResult<Backend> {
    match config.backend_type {
        StorageBackendType::Memory => Ok(Backend::Memory(MemoryBackend::new())),
        StorageBackendType::Sqlite => {
            let path = config.sqlite_path.clone().ok_or_else(|| {
                StorageError::internal("SQLite path required for SQLite backend")
            })?;
            let backend = tokio::task::spawn_blocking(move || SqliteBackend::open(path))
                .await
                .map_err(|e| StorageError::internal(format!("SQLite open task failed: {e}")))??;
            tracing::info!("Opened SQLite storage");
            Ok(Backend::Sqlite(backend))
        },
    }
}
