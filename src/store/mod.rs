//! Store Module
//!
//! The key-value store contract consumed by the cache, plus its backends.
//!
//! # Backends
//! - [`MemoryStore`] - in-process keyspace with lazy TTL expiry
//! - [`RedisStore`] - Redis over round-robin auto-reconnecting connections

mod entry;
mod memory;
mod redis_store;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use entry::{StoredValue, StoreEntry};
pub use memory::{Keyspace, MemoryStore};
pub use redis_store::RedisStore;

// == Store Error ==
/// Failure reported by a store backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Operation against a key holding the wrong kind of value
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    /// Arithmetic on a value that is not an integer
    #[error("value is not an integer or out of range")]
    NotAnInteger,

    /// The store could not be reached
    #[error("connection error: {0}")]
    Connection(String),

    /// Any other error reported by the store
    #[error("{0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One field write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashWrite {
    pub key: String,
    pub field: String,
    pub value: String,
}

impl HashWrite {
    /// Write of `field = value` into the hash at `key`.
    pub fn new(key: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        }
    }
}

// == Store Trait ==
/// Key-value store operations the cache is built on.
///
/// Keys passed here are final store keys; prefixing happens in the cache.
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait Store: Send + Sync {
    /// Liveness check.
    async fn ping(&self) -> StoreResult<()>;

    /// Scalar read, `None` when missing or expired.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Scalar write, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// Deletes every listed key, returning how many existed.
    async fn del(&self, keys: &[String]) -> StoreResult<u64>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Sets a TTL, returning false when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Adds `delta` to an integer scalar, returning the new value.
    async fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64>;

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Whole hash, empty when the key is missing.
    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;

    async fn hlen(&self, key: &str) -> StoreResult<u64>;

    /// Removes one field, returning how many were removed.
    async fn hdel(&self, key: &str, field: &str) -> StoreResult<u64>;

    /// Field names of a hash.
    async fn hkeys(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Submits all writes as one transactional batch.
    async fn hset_atomic(&self, writes: Vec<HashWrite>) -> StoreResult<()>;

    /// Flushes the whole selected database.
    async fn flush_db(&self) -> StoreResult<()>;
}
