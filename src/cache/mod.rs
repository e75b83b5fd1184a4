//! Cache Module
//!
//! Provides the namespaced cache: prefixed keys plus one index hash per
//! namespace for enumeration and bulk flushing.

mod namespaced;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use namespaced::{NamespacedCache, ReconcileReport};

// == Public Constants ==
/// Value stored against every field of an index hash. Never read back.
pub const INDEX_SENTINEL: &str = "0";
