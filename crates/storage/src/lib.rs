#![deny(unsafe_code)]

pub mod backend;
pub mod factory;
pub mod memory;
pub mod sqlite;

pub use backend::{KeyValue, StorageBackend, StorageError, StorageResult, Transaction, prefix_end};
pub use factory::{Backend, StorageBackendType, StorageConfig, create_storage_backend};
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;
