//! Store Entry Module
//!
//! Defines the structure for individual keyspace entries with TTL support.

use std::collections::HashMap;
use std::time::{Duration, Instant};

// == Stored Value ==
/// The two value shapes the keyspace holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    Scalar(String),
    Hash(HashMap<String, String>),
}

// == Store Entry ==
/// Represents a single keyspace entry with value and expiry.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    /// The stored value
    pub value: StoredValue,
    /// Expiration instant, None = no expiration
    pub expires_at: Option<Instant>,
}

impl StoreEntry {
    // == Constructors ==
    /// Creates a scalar entry with optional TTL.
    pub fn scalar(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value: StoredValue::Scalar(value),
            expires_at: ttl.and_then(deadline),
        }
    }

    /// Creates an empty hash entry without TTL.
    pub fn hash() -> Self {
        Self {
            value: StoredValue::Hash(HashMap::new()),
            expires_at: None,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches the expiration
    /// instant, so a zero TTL expires immediately.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => Instant::now() >= expires,
            None => false,
        }
    }

    /// Replaces the expiration with `now + ttl`.
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.expires_at = deadline(ttl);
    }
}

/// `now + ttl`, or None (never expires) when the instant is unrepresentable.
fn deadline(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(ttl)
}
