//! Namespace Module
//!
//! Maps logical keys to their owning index hash.

/// Separator between namespace segments in a logical key.
pub const SEPARATOR: char = ':';

/// Derives the namespace that owns `key`.
///
/// The namespace is everything before the last separator. Keys with no
/// separator, or whose only separator is the first character, belong to
/// `default`.
///
/// ```
/// use namespaced_cache::namespace::derive_namespace;
///
/// assert_eq!(derive_namespace("orders:region1:42", "Default"), "orders:region1");
/// assert_eq!(derive_namespace("session", "Default"), "Default");
/// ```
pub fn derive_namespace<'a>(key: &'a str, default: &'a str) -> &'a str {
    // ':' is one byte wide, so the match index is always a char boundary.
    match key.rfind(SEPARATOR) {
        Some(index) if index > 0 => &key[..index],
        _ => default,
    }
}

/// Joins a namespace and a member key with the separator.
pub fn compose_key(namespace: &str, key: &str) -> String {
    let mut composed = String::with_capacity(namespace.len() + 1 + key.len());
    composed.push_str(namespace);
    composed.push(SEPARATOR);
    composed.push_str(key);
    composed
}
