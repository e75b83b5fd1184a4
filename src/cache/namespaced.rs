//! Namespaced Cache Module
//!
//! Translates logical keys into prefixed store keys and keeps each
//! namespace's index hash in step with writes and deletes.

use std::collections::HashMap;
use std::slice;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::INDEX_SENTINEL;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::namespace::{compose_key, derive_namespace};
use crate::store::{HashWrite, RedisStore, Store, StoreError};

// == Reconcile Report ==
/// Outcome of one reconcile pass over a namespace index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Index hash that was scanned
    pub namespace: String,
    /// Index fields inspected
    pub scanned: usize,
    /// Stale index fields removed
    pub removed: u64,
}

// == Namespaced Cache ==
/// Key-value cache with per-namespace index hashes.
///
/// A logical key such as `orders:eu:42` is stored at `prefix + key` and
/// registered as a field of the index hash `orders:eu`. Keys without a
/// separator belong to the configured default namespace. Index hash names
/// are not prefixed.
///
/// Writes surface every store error. Reads collapse errors into `None`;
/// the `try_*` variants keep them.
///
/// The cache holds no locks of its own. Share it behind an `Arc`.
pub struct NamespacedCache<S = RedisStore> {
    store: S,
    prefix: String,
    default_namespace: String,
}

impl NamespacedCache<RedisStore> {
    /// Opens a Redis store from `config` and verifies it answers PING.
    pub async fn connect(config: &Config) -> Result<Self> {
        let store = RedisStore::open(config)?;
        Self::initialize(store, config).await
    }

    /// Parses `(option, value)` pairs, then connects.
    ///
    /// Fails on the first unsupported option before any connection attempt.
    pub async fn open<I, K, V>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let config = Config::from_options(options)?;
        Self::connect(&config).await
    }
}

impl<S: Store> NamespacedCache<S> {
    // == Constructors ==
    /// Wraps `store` after a liveness ping.
    pub async fn initialize(store: S, config: &Config) -> Result<Self> {
        store.ping().await.map_err(CacheError::Connection)?;
        info!(
            host = %config.host,
            network = %config.network,
            db = config.db,
            prefix = %config.prefix,
            default_namespace = %config.hset_name,
            "namespaced cache initialized"
        );
        Ok(Self::with_store(store, config))
    }

    /// Wraps `store` without probing it.
    pub fn with_store(store: S, config: &Config) -> Self {
        Self {
            store,
            prefix: config.prefix.clone(),
            default_namespace: config.hset_name.clone(),
        }
    }

    // == Accessors ==
    /// The backing store, for direct access to index hashes and raw keys.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Prefix prepended to every logical key.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Namespace for keys without an interior separator.
    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    /// Namespace owning the logical `key`.
    pub fn namespace_of<'a>(&'a self, key: &'a str) -> &'a str {
        derive_namespace(key, &self.default_namespace)
    }

    /// Store key for the logical `key`.
    pub fn store_key(&self, key: &str) -> String {
        let mut store_key = String::with_capacity(self.prefix.len() + key.len());
        store_key.push_str(&self.prefix);
        store_key.push_str(key);
        store_key
    }

    fn resolve_namespace<'a>(&'a self, name: &'a str) -> &'a str {
        if name.is_empty() {
            &self.default_namespace
        } else {
            name
        }
    }

    // == Scalars ==
    /// Stores a scalar and registers it in its namespace index.
    ///
    /// A zero `ttl` means no expiry. The value write and the index write are
    /// separate round-trips: if the second fails the value stays written and
    /// [`CacheError::IndexUpdate`] is returned.
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let store_key = self.store_key(key);
        let ttl = (!ttl.is_zero()).then_some(ttl);

        self.store.set(&store_key, value, ttl).await?;
        self.register(key, &store_key).await
    }

    /// Scalar value, `None` when missing, expired or unreadable.
    pub async fn get(&self, key: &str) -> Option<String> {
        absent_on_error("get", key, self.try_get(key).await)
    }

    /// Scalar value, keeping store errors.
    pub async fn try_get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.store.get(&self.store_key(key)).await?)
    }

    /// Adds one to an existing integer scalar.
    ///
    /// Missing keys fail with [`CacheError::NotFound`] and are not created.
    pub async fn increment(&self, key: &str) -> Result<i64> {
        self.adjust(key, 1).await
    }

    /// Subtracts one from an existing integer scalar.
    pub async fn decrement(&self, key: &str) -> Result<i64> {
        self.adjust(key, -1).await
    }

    async fn adjust(&self, key: &str, delta: i64) -> Result<i64> {
        if !self.exists(key).await {
            return Err(CacheError::NotFound(key.to_string()));
        }
        Ok(self.store.incr_by(&self.store_key(key), delta).await?)
    }

    // == Hashes ==
    /// Writes `fields` into the hash at `key` and registers it in its
    /// namespace index, all in one atomic pipeline.
    pub async fn hash_set<I, F, V>(&self, key: &str, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: ToString,
    {
        let store_key = self.store_key(key);
        let mut writes = vec![HashWrite::new(
            self.namespace_of(key),
            store_key.clone(),
            INDEX_SENTINEL,
        )];
        writes.extend(
            fields
                .into_iter()
                .map(|(field, value)| HashWrite::new(store_key.clone(), field, value.to_string())),
        );

        self.store.hset_atomic(writes).await.map_err(|err| {
            warn!(key, error = %err, "hash pipeline aborted");
            CacheError::Store(err)
        })
    }

    /// [`hash_set`](Self::hash_set) followed by an expire on the hash.
    ///
    /// A zero `ttl` skips the expire. If the expire fails the fields stay
    /// written without a TTL and the error is returned.
    pub async fn hash_set_with_ttl<I, F, V>(&self, key: &str, fields: I, ttl: Duration) -> Result<()>
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: ToString,
    {
        self.hash_set(key, fields).await?;
        if !ttl.is_zero() {
            self.expire(key, ttl).await?;
        }
        Ok(())
    }

    /// Whole hash, `None` when missing, empty or unreadable.
    pub async fn hash_get_all(&self, key: &str) -> Option<HashMap<String, String>> {
        absent_on_error("hash_get_all", key, self.try_hash_get_all(key).await)
    }

    /// Whole hash, keeping store errors.
    ///
    /// # Arguments
    /// * `key` - Logical key; the prefix is added
    ///
    /// # Returns
    /// `Ok(None)` when the hash is missing or empty, and the store error
    /// (for example [`StoreError::WrongType`](crate::store::StoreError::WrongType)
    /// on a scalar) when the read fails.
    pub async fn try_hash_get_all(&self, key: &str) -> Result<Option<HashMap<String, String>>> {
        let fields = self.store.hget_all(&self.store_key(key)).await?;
        Ok((!fields.is_empty()).then_some(fields))
    }

    /// One hash field, `None` when missing or unreadable.
    pub async fn hash_get_field(&self, key: &str, field: &str) -> Option<String> {
        absent_on_error("hash_get_field", key, self.try_hash_get_field(key, field).await)
    }

    /// One hash field, keeping store errors.
    ///
    /// # Arguments
    /// * `key` - Logical key; the prefix is added
    /// * `field` - Field name within the hash
    ///
    /// # Returns
    /// `Ok(None)` when the hash or the field is missing.
    pub async fn try_hash_get_field(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self.store.hget(&self.store_key(key), field).await?)
    }

    /// Reads `field` from the hash `namespace:key` without composing the key.
    pub async fn namespace_field(&self, namespace: &str, key: &str, field: &str) -> Option<String> {
        self.hash_get_field(&compose_key(namespace, key), field).await
    }

    /// Field count of the hash at `raw_key`, used verbatim without the prefix.
    ///
    /// Errors count as zero.
    pub async fn hash_length(&self, raw_key: &str) -> u64 {
        match self.store.hlen(raw_key).await {
            Ok(len) => len,
            Err(err) => {
                debug!(key = raw_key, error = %err, "hash_length failed, treating as empty");
                0
            }
        }
    }

    // == Key Lifecycle ==
    /// Whether `key` currently exists.
    ///
    /// A missing key is also dropped from its namespace index. A failed read
    /// counts as missing, and a failed index cleanup is only logged.
    pub async fn exists(&self, key: &str) -> bool {
        let store_key = self.store_key(key);
        match self.store.exists(&store_key).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(err) => debug!(key, error = %err, "exists check failed, treating as missing"),
        }

        let namespace = self.namespace_of(key);
        if let Err(err) = self.store.hdel(namespace, &store_key).await {
            debug!(key, namespace, error = %err, "stale index cleanup failed");
        }
        false
    }

    /// Whether the index hash for `name` exists.
    pub async fn exists_namespace(&self, name: &str) -> bool {
        self.store.exists(name).await.unwrap_or_else(|err| {
            debug!(namespace = name, error = %err, "namespace check failed, treating as missing");
            false
        })
    }

    /// Sets a TTL on `key`. Returns false when the key does not exist.
    ///
    /// The index hash is left alone, so the field outlives the entry.
    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        Ok(self.store.expire(&self.store_key(key), ttl).await?)
    }

    /// Deletes `key` and drops it from its namespace index.
    ///
    /// If the delete succeeds but the index update fails the key stays
    /// deleted and [`CacheError::IndexUpdate`] is returned.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let store_key = self.store_key(key);
        self.store.del(slice::from_ref(&store_key)).await?;

        let namespace = self.namespace_of(key);
        self.store
            .hdel(namespace, &store_key)
            .await
            .map(|_| ())
            .map_err(|source| index_update(key, namespace, source))
    }

    // == Bulk ==
    /// Deletes every key registered in the index of `name`, then the index.
    ///
    /// An empty `name` means the default namespace. Returns the number of
    /// keys removed. If the bulk delete fails the index is still dropped and
    /// the delete error is returned.
    pub async fn flush_namespace(&self, name: &str) -> Result<u64> {
        let namespace = self.resolve_namespace(name);
        let members = self.store.hkeys(namespace).await?;

        let deleted = self.store.del(&members).await;
        let dropped = self.store.del(&[namespace.to_string()]).await;

        let removed = deleted.map_err(|err| {
            warn!(namespace, error = %err, "bulk delete failed, index hash dropped anyway");
            err
        })?;
        dropped?;

        info!(namespace, registered = members.len(), removed, "namespace flushed");
        Ok(removed)
    }

    /// Flushes the whole database, ignoring namespaces.
    pub async fn flush_all(&self) -> Result<()> {
        self.store.flush_db().await?;
        warn!("database flushed");
        Ok(())
    }

    /// Drops index fields of `name` whose keys no longer exist.
    ///
    /// Nothing else calls this; TTL expiry alone never touches an index.
    /// A key recreated between the check and the removal loses its field
    /// until it is written again.
    pub async fn reconcile_namespace(&self, name: &str) -> Result<ReconcileReport> {
        let namespace = self.resolve_namespace(name);
        let members = self.store.hkeys(namespace).await?;

        let mut removed = 0;
        for member in &members {
            if !self.store.exists(member).await? {
                removed += self.store.hdel(namespace, member).await?;
            }
        }

        debug!(namespace, scanned = members.len(), removed, "namespace reconciled");
        Ok(ReconcileReport {
            namespace: namespace.to_string(),
            scanned: members.len(),
            removed,
        })
    }

    async fn register(&self, key: &str, store_key: &str) -> Result<()> {
        let namespace = self.namespace_of(key);
        self.store
            .hset(namespace, store_key, INDEX_SENTINEL)
            .await
            .map_err(|source| index_update(key, namespace, source))
    }
}

fn index_update(key: &str, namespace: &str, source: StoreError) -> CacheError {
    warn!(key, namespace, error = %source, "index hash out of sync");
    CacheError::IndexUpdate {
        key: key.to_string(),
        namespace: namespace.to_string(),
        source,
    }
}

/// Collapses a read error into absence.
fn absent_on_error<T>(op: &str, key: &str, result: Result<Option<T>>) -> Option<T> {
    result.unwrap_or_else(|err| {
        debug!(op, key, error = %err, "read failed, treating as miss");
        None
    })
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn cache_with(prefix: &str) -> NamespacedCache<MemoryStore> {
        let config = Config::from_options([("prefix", prefix), ("hset_name", "Agents")]).unwrap();
        NamespacedCache::with_store(MemoryStore::new(), &config)
    }

    #[test]
    fn test_store_key_and_namespace() {
        let cache = cache_with("charge:");

        assert_eq!(cache.store_key("act:10001"), "charge:act:10001");
        assert_eq!(cache.namespace_of("act:10001"), "act");
        assert_eq!(cache.namespace_of("activity:1:10002"), "activity:1");
        assert_eq!(cache.namespace_of("solo"), "Agents");
    }

    #[tokio::test]
    async fn test_set_registers_prefixed_key() {
        let cache = cache_with("charge:");

        cache.set("act:1", "42", Duration::ZERO).await.unwrap();

        assert_eq!(cache.get("act:1").await.as_deref(), Some("42"));
        assert_eq!(
            cache.store().hget("act", "charge:act:1").await.unwrap().as_deref(),
            Some(INDEX_SENTINEL)
        );
    }

    #[tokio::test]
    async fn test_namespace_field_composes_key() {
        let cache = cache_with("charge:");

        cache.hash_set("act:10001", [("name", "10001")]).await.unwrap();

        assert_eq!(
            cache.namespace_field("act", "10001", "name").await.as_deref(),
            Some("10001")
        );
        assert_eq!(cache.namespace_field("act", "10002", "name").await, None);
    }

    #[tokio::test]
    async fn test_hash_length_uses_raw_key() {
        let cache = cache_with("charge:");

        cache.hash_set("act:1", [("a", 1), ("b", 2)]).await.unwrap();

        assert_eq!(cache.hash_length("act:1").await, 0);
        assert_eq!(cache.hash_length("charge:act:1").await, 2);
    }

    #[tokio::test]
    async fn test_hash_get_all_empty_is_absent() {
        let cache = cache_with("");

        assert_eq!(cache.hash_get_all("missing:1").await, None);
        assert_eq!(cache.try_hash_get_all("missing:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_try_get_surfaces_wrong_type() {
        let cache = cache_with("");

        cache.hash_set("user:1", [("name", "ada")]).await.unwrap();

        assert_eq!(cache.get("user:1").await, None);
        assert!(matches!(
            cache.try_get("user:1").await,
            Err(CacheError::Store(StoreError::WrongType))
        ));
    }

    #[tokio::test]
    async fn test_empty_flush_name_targets_default_namespace() {
        let cache = cache_with("");

        cache.set("solo", "1", Duration::ZERO).await.unwrap();
        assert!(cache.exists_namespace("Agents").await);

        assert_eq!(cache.flush_namespace("").await.unwrap(), 1);
        assert!(!cache.exists("solo").await);
        assert!(!cache.exists_namespace("Agents").await);
    }

    #[tokio::test]
    async fn test_reconcile_removes_only_stale_fields() {
        let cache = cache_with("app:");

        cache.set("s:live", "1", Duration::ZERO).await.unwrap();
        cache.set("s:gone", "2", Duration::from_millis(30)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        let report = cache.reconcile_namespace("s").await.unwrap();
        assert_eq!(
            report,
            ReconcileReport {
                namespace: "s".to_string(),
                scanned: 2,
                removed: 1,
            }
        );
        assert_eq!(cache.store().hkeys("s").await.unwrap(), vec!["app:s:live"]);
    }
}
