//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check namespace bucketing and index bookkeeping.

use proptest::prelude::*;
use std::collections::HashMap;
use std::time::Duration;

use crate::cache::NamespacedCache;
use crate::config::Config;
use crate::namespace::{compose_key, derive_namespace};
use crate::store::{MemoryStore, Store};

// == Test Configuration ==
const TEST_DEFAULT_NAMESPACE: &str = "Agents";
const TEST_PREFIX: &str = "charge:";

// == Strategies ==
/// Namespace segments without separators, including multi-byte text
fn segment_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_é用户]{1,12}".prop_map(|s| s)
}

/// Keys made of one to four segments
fn key_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(segment_strategy(), 1..5).prop_map(|segments| segments.join(":"))
}

fn field_map_strategy() -> impl Strategy<Value = HashMap<String, String>> {
    prop::collection::hash_map("[a-z]{1,8}", "[a-zA-Z0-9 ]{0,16}", 1..6)
}

fn test_cache() -> NamespacedCache<MemoryStore> {
    let config = Config::from_options([
        ("prefix", TEST_PREFIX),
        ("hset_name", TEST_DEFAULT_NAMESPACE),
    ])
    .unwrap();
    NamespacedCache::with_store(MemoryStore::new(), &config)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // Separator-free keys always fall back to the default namespace.
    #[test]
    fn prop_separator_free_uses_default(segment in segment_strategy()) {
        prop_assert_eq!(derive_namespace(&segment, TEST_DEFAULT_NAMESPACE), TEST_DEFAULT_NAMESPACE);
    }

    // Composing a namespace with a member key and deriving it back is lossless,
    // so sibling sub-namespaces never share an index.
    #[test]
    fn prop_compose_then_derive(namespace in key_strategy(), member in segment_strategy()) {
        let key = compose_key(&namespace, &member);
        prop_assert_eq!(derive_namespace(&key, TEST_DEFAULT_NAMESPACE), namespace.as_str());
    }

    // The derived namespace is always a proper prefix of the key.
    #[test]
    fn prop_namespace_is_key_prefix(key in key_strategy()) {
        let namespace = derive_namespace(&key, TEST_DEFAULT_NAMESPACE);
        if namespace != TEST_DEFAULT_NAMESPACE {
            prop_assert!(key.starts_with(namespace));
            prop_assert_eq!(&key[namespace.len()..namespace.len() + 1], ":");
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    // After hash_set, the hash holds every field and the namespace index
    // holds the prefixed key.
    #[test]
    fn prop_hash_set_registers_and_stores(key in key_strategy(), fields in field_map_strategy()) {
        let rt = runtime();
        let cache = test_cache();

        rt.block_on(cache.hash_set(&key, fields.clone())).unwrap();

        let stored = rt.block_on(cache.hash_get_all(&key)).unwrap();
        prop_assert_eq!(stored, fields);

        let index = rt.block_on(cache.store().hkeys(cache.namespace_of(&key))).unwrap();
        let expected = format!("{TEST_PREFIX}{key}");
        prop_assert!(index.contains(&expected));
    }

    // Delete removes both the entry and its index field.
    #[test]
    fn prop_delete_clears_index(key in key_strategy(), value in "[0-9]{1,6}") {
        let rt = runtime();
        let cache = test_cache();

        rt.block_on(cache.set(&key, &value, Duration::ZERO)).unwrap();
        rt.block_on(cache.delete(&key)).unwrap();

        prop_assert!(!rt.block_on(cache.exists(&key)));
        let index = rt.block_on(cache.store().hkeys(cache.namespace_of(&key))).unwrap();
        prop_assert!(!index.contains(&cache.store_key(&key)));
    }

    // Flushing a namespace removes exactly its registered keys and leaves
    // sibling namespaces intact.
    #[test]
    fn prop_flush_namespace_spares_siblings(
        namespace in key_strategy(),
        sibling in key_strategy(),
        members in prop::collection::hash_set(segment_strategy(), 1..6)
    ) {
        prop_assume!(namespace != sibling);
        let rt = runtime();
        let cache = test_cache();

        for member in &members {
            rt.block_on(cache.set(&compose_key(&namespace, member), "1", Duration::ZERO)).unwrap();
        }
        let survivor = compose_key(&sibling, "keep");
        rt.block_on(cache.set(&survivor, "1", Duration::ZERO)).unwrap();

        let removed = rt.block_on(cache.flush_namespace(&namespace)).unwrap();
        prop_assert_eq!(removed, members.len() as u64);
        prop_assert!(!rt.block_on(cache.exists_namespace(&namespace)));
        prop_assert_eq!(rt.block_on(cache.get(&survivor)), Some("1".to_string()));

        let again = rt.block_on(cache.flush_namespace(&namespace)).unwrap();
        prop_assert_eq!(again, 0);
    }
}
