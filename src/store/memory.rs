//! Memory Store Module
//!
//! In-process keyspace holding scalars and hashes with lazy TTL expiration.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{HashWrite, Store, StoreEntry, StoreError, StoreResult, StoredValue};

// == Keyspace ==
/// Synchronous keyspace following Redis semantics for the supported commands.
///
/// Expired entries are dropped when they are next touched.
#[derive(Debug, Default)]
pub struct Keyspace {
    entries: HashMap<String, StoreEntry>,
}

impl Keyspace {
    /// Creates an empty keyspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops `key` if its TTL has elapsed.
    fn purge_if_expired(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(StoreEntry::is_expired) {
            self.entries.remove(key);
        }
    }

    fn live(&mut self, key: &str) -> Option<&mut StoreEntry> {
        self.purge_if_expired(key);
        self.entries.get_mut(key)
    }

    /// Existing hash at `key`, or `None` when the key is missing.
    fn live_hash(&mut self, key: &str) -> StoreResult<Option<&mut HashMap<String, String>>> {
        match self.live(key) {
            None => Ok(None),
            Some(entry) => match &mut entry.value {
                StoredValue::Hash(map) => Ok(Some(map)),
                StoredValue::Scalar(_) => Err(StoreError::WrongType),
            },
        }
    }

    /// Hash at `key`, created empty when missing.
    fn hash_or_insert(&mut self, key: &str) -> StoreResult<&mut HashMap<String, String>> {
        self.purge_if_expired(key);
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(StoreEntry::hash);
        match &mut entry.value {
            StoredValue::Hash(map) => Ok(map),
            StoredValue::Scalar(_) => Err(StoreError::WrongType),
        }
    }

    // == Scalars ==
    /// Scalar at `key`; a hash is `WrongType`.
    pub fn get(&mut self, key: &str) -> StoreResult<Option<String>> {
        match self.live(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                StoredValue::Scalar(value) => Ok(Some(value.clone())),
                StoredValue::Hash(_) => Err(StoreError::WrongType),
            },
        }
    }

    /// Stores a scalar, replacing whatever `key` held.
    pub fn set(&mut self, key: &str, value: &str, ttl: Option<Duration>) {
        self.entries
            .insert(key.to_string(), StoreEntry::scalar(value.to_string(), ttl));
    }

    /// Adds `delta` to the integer at `key`, creating it from 0. Keeps any TTL.
    pub fn incr_by(&mut self, key: &str, delta: i64) -> StoreResult<i64> {
        self.purge_if_expired(key);
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| StoreEntry::scalar("0".to_string(), None));

        match &mut entry.value {
            StoredValue::Scalar(value) => {
                let current: i64 = value.parse().map_err(|_| StoreError::NotAnInteger)?;
                let next = current.checked_add(delta).ok_or(StoreError::NotAnInteger)?;
                *value = next.to_string();
                Ok(next)
            }
            StoredValue::Hash(_) => Err(StoreError::WrongType),
        }
    }

    // == Generic ==
    /// Removes `keys`, returning how many existed.
    pub fn del(&mut self, keys: &[String]) -> u64 {
        keys.iter()
            .filter(|key| {
                self.purge_if_expired(key);
                self.entries.remove(key.as_str()).is_some()
            })
            .count() as u64
    }

    pub fn exists(&mut self, key: &str) -> bool {
        self.live(key).is_some()
    }

    /// Sets a TTL on a live key; false when the key is missing.
    pub fn expire(&mut self, key: &str, ttl: Duration) -> bool {
        match self.live(key) {
            Some(entry) => {
                entry.set_ttl(ttl);
                true
            }
            None => false,
        }
    }

    // == Hashes ==
    /// One field of the hash at `key`.
    pub fn hget(&mut self, key: &str, field: &str) -> StoreResult<Option<String>> {
        Ok(self
            .live_hash(key)?
            .and_then(|map| map.get(field).cloned()))
    }

    pub fn hget_all(&mut self, key: &str) -> StoreResult<HashMap<String, String>> {
        Ok(self.live_hash(key)?.map(|map| map.clone()).unwrap_or_default())
    }

    /// Writes one field, creating the hash if needed.
    pub fn hset(&mut self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        self.hash_or_insert(key)?
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    /// Field count, 0 for a missing key.
    pub fn hlen(&mut self, key: &str) -> StoreResult<u64> {
        Ok(self.live_hash(key)?.map_or(0, |map| map.len() as u64))
    }

    /// Removes a field; a hash left empty is removed with it.
    pub fn hdel(&mut self, key: &str, field: &str) -> StoreResult<u64> {
        let (removed, now_empty) = match self.live_hash(key)? {
            None => return Ok(0),
            Some(map) => (map.remove(field).is_some(), map.is_empty()),
        };
        if now_empty {
            self.entries.remove(key);
        }
        Ok(removed as u64)
    }

    /// Field names of the hash at `key`.
    pub fn hkeys(&mut self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .live_hash(key)?
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default())
    }

    /// Applies every write or none of them.
    ///
    /// All targets are checked before the first write lands.
    pub fn hset_batch(&mut self, writes: &[HashWrite]) -> StoreResult<()> {
        for write in writes {
            self.purge_if_expired(&write.key);
            if let Some(StoreEntry {
                value: StoredValue::Scalar(_),
                ..
            }) = self.entries.get(&write.key)
            {
                return Err(StoreError::WrongType);
            }
        }

        for write in writes {
            self.hset(&write.key, &write.field, &write.value)?;
        }
        Ok(())
    }

    /// Removes every key.
    pub fn flush(&mut self) {
        self.entries.clear();
    }

    /// Number of stored keys, including ones not yet purged after expiry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// == Memory Store ==
/// [`Store`] backed by a [`Keyspace`] behind an async lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    keyspace: RwLock<Keyspace>,
}

impl MemoryStore {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.keyspace.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keyspace.read().await.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.keyspace.write().await.get(key)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.keyspace.write().await.set(key, value, ttl);
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        Ok(self.keyspace.write().await.del(keys))
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.keyspace.write().await.exists(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        Ok(self.keyspace.write().await.expire(key, ttl))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64> {
        self.keyspace.write().await.incr_by(key, delta)
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.keyspace.write().await.hget(key, field)
    }

    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        self.keyspace.write().await.hget_all(key)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        self.keyspace.write().await.hset(key, field, value)
    }

    async fn hlen(&self, key: &str) -> StoreResult<u64> {
        self.keyspace.write().await.hlen(key)
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<u64> {
        self.keyspace.write().await.hdel(key, field)
    }

    async fn hkeys(&self, key: &str) -> StoreResult<Vec<String>> {
        self.keyspace.write().await.hkeys(key)
    }

    async fn hset_atomic(&self, writes: Vec<HashWrite>) -> StoreResult<()> {
        self.keyspace.write().await.hset_batch(&writes)
    }

    async fn flush_db(&self) -> StoreResult<()> {
        self.keyspace.write().await.flush();
        Ok(())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_keyspace_set_and_get() {
        let mut keyspace = Keyspace::new();

        keyspace.set("key1", "value1", None);
        assert_eq!(keyspace.get("key1").unwrap().as_deref(), Some("value1"));
        assert_eq!(keyspace.len(), 1);
    }

    #[test]
    fn test_keyspace_get_nonexistent() {
        let mut keyspace = Keyspace::new();
        assert_eq!(keyspace.get("nonexistent").unwrap(), None);
    }

    #[test]
    fn test_keyspace_overwrite_replaces_hash() {
        let mut keyspace = Keyspace::new();

        keyspace.hset("key1", "f", "v").unwrap();
        keyspace.set("key1", "scalar", None);

        assert_eq!(keyspace.get("key1").unwrap().as_deref(), Some("scalar"));
        assert_eq!(keyspace.len(), 1);
    }

    #[test]
    fn test_keyspace_ttl_expiration() {
        let mut keyspace = Keyspace::new();

        keyspace.set("key1", "value1", Some(Duration::from_millis(50)));
        assert!(keyspace.exists("key1"));

        sleep(Duration::from_millis(80));

        assert_eq!(keyspace.get("key1").unwrap(), None);
        assert!(keyspace.is_empty(), "expired entry should be purged on access");
    }

    #[test]
    fn test_keyspace_wrong_type() {
        let mut keyspace = Keyspace::new();

        keyspace.set("scalar", "1", None);
        keyspace.hset("hash", "f", "v").unwrap();

        assert_eq!(keyspace.hget("scalar", "f"), Err(StoreError::WrongType));
        assert_eq!(keyspace.hset("scalar", "f", "v"), Err(StoreError::WrongType));
        assert_eq!(keyspace.get("hash"), Err(StoreError::WrongType));
        assert_eq!(keyspace.incr_by("hash", 1), Err(StoreError::WrongType));
    }

    #[test]
    fn test_keyspace_incr_by() {
        let mut keyspace = Keyspace::new();

        keyspace.set("counter", "41", Some(Duration::from_secs(60)));
        assert_eq!(keyspace.incr_by("counter", 1).unwrap(), 42);
        assert_eq!(keyspace.incr_by("counter", -2).unwrap(), 40);
        assert_eq!(keyspace.get("counter").unwrap().as_deref(), Some("40"));

        // Redis INCR keeps the existing TTL.
        assert!(keyspace.live("counter").unwrap().expires_at.is_some());

        // Missing keys start from zero.
        assert_eq!(keyspace.incr_by("fresh", -1).unwrap(), -1);
    }

    #[test]
    fn test_keyspace_incr_non_integer() {
        let mut keyspace = Keyspace::new();

        keyspace.set("word", "abc", None);
        assert_eq!(keyspace.incr_by("word", 1), Err(StoreError::NotAnInteger));

        keyspace.set("max", &i64::MAX.to_string(), None);
        assert_eq!(keyspace.incr_by("max", 1), Err(StoreError::NotAnInteger));
    }

    #[test]
    fn test_keyspace_hash_operations() {
        let mut keyspace = Keyspace::new();

        keyspace.hset("h", "a", "1").unwrap();
        keyspace.hset("h", "b", "2").unwrap();

        assert_eq!(keyspace.hlen("h").unwrap(), 2);
        assert_eq!(keyspace.hget("h", "a").unwrap().as_deref(), Some("1"));
        assert_eq!(keyspace.hget("h", "z").unwrap(), None);

        let mut fields = keyspace.hkeys("h").unwrap();
        fields.sort();
        assert_eq!(fields, vec!["a", "b"]);

        assert_eq!(keyspace.hdel("h", "a").unwrap(), 1);
        assert_eq!(keyspace.hdel("h", "a").unwrap(), 0);
        assert_eq!(keyspace.hdel("h", "b").unwrap(), 1);
        assert!(!keyspace.exists("h"), "empty hash should be removed");
        assert!(keyspace.hget_all("h").unwrap().is_empty());
    }

    #[test]
    fn test_keyspace_expire() {
        let mut keyspace = Keyspace::new();

        assert!(!keyspace.expire("missing", Duration::from_secs(1)));

        keyspace.hset("h", "f", "v").unwrap();
        assert!(keyspace.expire("h", Duration::from_millis(40)));
        sleep(Duration::from_millis(70));
        assert!(!keyspace.exists("h"));
    }

    #[test]
    fn test_keyspace_del_counts_existing() {
        let mut keyspace = Keyspace::new();

        keyspace.set("a", "1", None);
        keyspace.set("b", "2", None);

        let removed = keyspace.del(&["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(removed, 2);
        assert!(keyspace.is_empty());
    }

    #[test]
    fn test_keyspace_batch_is_all_or_nothing() {
        let mut keyspace = Keyspace::new();
        keyspace.set("taken", "scalar", None);

        let writes = vec![
            HashWrite::new("index", "taken", "0"),
            HashWrite::new("fresh", "f", "v"),
            HashWrite::new("taken", "f", "v"),
        ];
        assert_eq!(keyspace.hset_batch(&writes), Err(StoreError::WrongType));

        assert!(!keyspace.exists("index"));
        assert!(!keyspace.exists("fresh"));
        assert_eq!(keyspace.get("taken").unwrap().as_deref(), Some("scalar"));
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();

        store.ping().await.unwrap();
        store.set("k", "v", None).await.unwrap();
        store
            .hset_atomic(vec![HashWrite::new("h", "f", "1"), HashWrite::new("h", "g", "2")])
            .await
            .unwrap();

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.hlen("h").await.unwrap(), 2);
        assert_eq!(store.len().await, 2);

        store.flush_db().await.unwrap();
        assert_eq!(store.len().await, 0);
    }
}
