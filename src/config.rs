//! Configuration Module
//!
//! Handles loading connection and namespace settings from an option map,
//! environment variables, or any serde source.

use std::env;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Default address of the store endpoint.
pub const DEFAULT_HOST: &str = "127.0.0.1:6379";

/// Namespace used for keys without a `:` separator.
pub const DEFAULT_HSET_NAME: &str = "RedisCache";

/// Default number of pooled store connections.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Transport used to reach the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Tcp,
    Unix,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Tcp => write!(f, "tcp"),
            Network::Unix => write!(f, "unix"),
        }
    }
}

/// Cache configuration parameters.
///
/// Immutable once the cache is built from it.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Transport type for the store connection
    pub network: Network,
    /// `host:port` for tcp, socket path for unix
    pub host: String,
    /// Authentication credential
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Logical database index selected on the store
    pub db: i64,
    /// Max concurrent connections to the store
    pub pool_size: usize,
    /// Idle time before a pooled connection is recycled
    pub idle_timeout: Option<Duration>,
    /// Namespace used when a key has no separator
    pub hset_name: String,
    /// Prepended to every logical key before it reaches the store
    pub prefix: String,
}

impl Config {
    /// Builds a Config from `(option, value)` pairs.
    ///
    /// # Options
    /// - `network` - `tcp` or `unix`
    /// - `host` - store address
    /// - `password` - credential
    /// - `db` - database index
    /// - `pool_size` - pooled connection count
    /// - `idle_timeout` - seconds, fractions allowed
    /// - `hset_name` - default namespace name
    /// - `prefix` - global key prefix
    ///
    /// Any other option name fails with [`CacheError::UnsupportedOption`].
    pub fn from_options<I, K, V>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Config::default();
        for (name, value) in options {
            config.apply(name.as_ref(), value.as_ref())?;
        }
        Ok(config)
    }

    /// Creates a Config from environment variables.
    ///
    /// # Environment Variables
    /// - `NSCACHE_NETWORK` - transport (default: tcp)
    /// - `NSCACHE_HOST` - address (default: 127.0.0.1:6379)
    /// - `NSCACHE_PASSWORD` - credential (default: none)
    /// - `NSCACHE_DB` - database index (default: 0)
    /// - `NSCACHE_POOL_SIZE` - pooled connections (default: 10)
    /// - `NSCACHE_IDLE_TIMEOUT` - idle seconds (default: never recycle)
    /// - `NSCACHE_HSET_NAME` - default namespace (default: RedisCache)
    /// - `NSCACHE_PREFIX` - key prefix (default: empty)
    ///
    /// Unset variables keep their defaults; malformed values are errors.
    pub fn from_env() -> Result<Self> {
        const OPTIONS: [&str; 8] = [
            "network",
            "host",
            "password",
            "db",
            "pool_size",
            "idle_timeout",
            "hset_name",
            "prefix",
        ];

        let present = OPTIONS.iter().filter_map(|option| {
            env::var(format!("NSCACHE_{}", option.to_uppercase()))
                .ok()
                .map(|value| (*option, value))
        });
        Self::from_options(present)
    }

    fn apply(&mut self, option: &str, value: &str) -> Result<()> {
        match option {
            "network" => {
                self.network = match value {
                    "tcp" => Network::Tcp,
                    "unix" => Network::Unix,
                    other => {
                        return Err(CacheError::invalid_option(
                            option,
                            other,
                            "expected 'tcp' or 'unix'",
                        ))
                    }
                }
            }
            "host" => self.host = value.to_string(),
            "password" => self.password = Some(value.to_string()),
            "db" => {
                self.db = value
                    .parse()
                    .map_err(|e| CacheError::invalid_option(option, value, e))?
            }
            "pool_size" => {
                let size: usize = value
                    .parse()
                    .map_err(|e| CacheError::invalid_option(option, value, e))?;
                if size == 0 {
                    return Err(CacheError::invalid_option(option, value, "must be at least 1"));
                }
                self.pool_size = size;
            }
            "idle_timeout" => self.idle_timeout = Some(parse_seconds(option, value)?),
            "hset_name" => self.hset_name = value.to_string(),
            "prefix" => self.prefix = value.to_string(),
            other => return Err(CacheError::UnsupportedOption(other.to_string())),
        }
        Ok(())
    }
}

/// Parses a number of seconds, fractional values allowed.
fn parse_seconds(option: &str, value: &str) -> Result<Duration> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|e| CacheError::invalid_option(option, value, e))?;
    Duration::try_from_secs_f64(secs).map_err(|e| CacheError::invalid_option(option, value, e))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::Tcp,
            host: DEFAULT_HOST.to_string(),
            password: None,
            db: 0,
            pool_size: DEFAULT_POOL_SIZE,
            idle_timeout: None,
            hset_name: DEFAULT_HSET_NAME.to_string(),
            prefix: String::new(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("network", &self.network)
            .field("host", &self.host)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("db", &self.db)
            .field("pool_size", &self.pool_size)
            .field("idle_timeout", &self.idle_timeout)
            .field("hset_name", &self.hset_name)
            .field("prefix", &self.prefix)
            .finish()
    }
}
