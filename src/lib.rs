//! Namespaced Cache - a bucketing layer over a key-value store
//!
//! Prefixes every key and keeps one index hash per namespace so that all
//! keys of a namespace can be listed and flushed without a keyspace scan.

pub mod cache;
pub mod config;
pub mod error;
pub mod namespace;
pub mod store;
pub mod tasks;

pub use cache::{NamespacedCache, ReconcileReport};
pub use config::Config;
pub use error::{CacheError, Result};
pub use store::{MemoryStore, RedisStore, Store, StoreError};
pub use tasks::spawn_reconcile_task;
