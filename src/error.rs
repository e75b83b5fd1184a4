//! Error types for the namespaced cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

use crate::store::StoreError;

// == Cache Error Enum ==
/// Unified error type for the namespaced cache.
///
/// Write paths surface these; read paths collapse failures into `None`
/// unless the strict `try_*` accessors are used.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Option name outside the recognized configuration surface
    #[error("unsupported option '{0}'")]
    UnsupportedOption(String),

    /// Recognized option with a value that could not be parsed
    #[error("invalid value '{value}' for option '{option}': {reason}")]
    InvalidOption {
        option: String,
        value: String,
        reason: String,
    },

    /// Liveness ping failed while initializing
    #[error("store unreachable: {0}")]
    Connection(#[source] StoreError),

    /// A write, expire, delete or flush failed in the store
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),

    /// The value write or delete went through but the index hash update did not.
    ///
    /// The index for `namespace` may now reference a missing key or omit a
    /// live one until `exists`, `delete` or a reconcile pass touches it.
    #[error("index hash '{namespace}' out of sync for key '{key}': {source}")]
    IndexUpdate {
        key: String,
        namespace: String,
        #[source]
        source: StoreError,
    },

    /// Arithmetic on a key that does not exist
    #[error("key '{0}' not exist")]
    NotFound(String),
}

impl CacheError {
    /// Builds an [`CacheError::InvalidOption`] from borrowed parts.
    pub(crate) fn invalid_option(option: &str, value: &str, reason: impl ToString) -> Self {
        CacheError::InvalidOption {
            option: option.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the namespaced cache.
pub type Result<T> = std::result::Result<T, CacheError>;
