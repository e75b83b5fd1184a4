//! Redis Store Module
//!
//! [`Store`] implementation over the `redis` crate. Connections are
//! [`ConnectionManager`]s, which multiplex commands and reconnect on their own
//! after a dropped connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisError, RedisResult};
use tokio::sync::OnceCell;
use tracing::debug;

use super::{HashWrite, Store, StoreError, StoreResult};
use crate::config::{Config, Network};
use crate::error::{CacheError, Result};

const DEFAULT_PORT: u16 = 6379;

/// Attempts a manager makes per connect or reconnect before giving up.
const CONNECT_RETRIES: usize = 2;

// == Redis Store ==
/// Redis-backed store.
///
/// Holds `pool_size` connection managers used round-robin. Each one connects
/// on first use; a failed first connect leaves it empty so the next command
/// tries again.
pub struct RedisStore {
    client: redis::Client,
    managers: Vec<OnceCell<ConnectionManager>>,
    next: AtomicUsize,
}

impl RedisStore {
    /// Builds the client from `config`. No connection is made until first use.
    ///
    /// `idle_timeout` is advisory here: a connection manager keeps its
    /// connection open and only reconnects after a failure.
    pub fn open(config: &Config) -> Result<Self> {
        let info = connection_info(config)?;
        let client = redis::Client::open(info)
            .map_err(|e| CacheError::Connection(map_redis_error(e)))?;

        if let Some(idle) = config.idle_timeout {
            debug!(?idle, "idle_timeout is not applied to managed redis connections");
        }

        let managers = (0..config.pool_size.max(1)).map(|_| OnceCell::new()).collect();

        Ok(Self {
            client,
            managers,
            next: AtomicUsize::new(0),
        })
    }

    /// Number of connection managers.
    pub fn pool_size(&self) -> usize {
        self.managers.len()
    }

    /// Next manager in round-robin order, connecting it if needed.
    async fn connection(&self) -> StoreResult<ConnectionManager> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.managers.len();
        let manager = self.managers[index]
            .get_or_try_init(|| async {
                debug!(slot = index, "opening managed redis connection");
                let config = ConnectionManagerConfig::new().set_number_of_retries(CONNECT_RETRIES);
                ConnectionManager::new_with_config(self.client.clone(), config).await
            })
            .await
            .map_err(map_redis_error)?;
        Ok(manager.clone())
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection().await?;
        conn.get(key).await.map_err(map_redis_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }

        let mut conn = self.connection().await?;
        cmd.query_async(&mut conn).await.map_err(map_redis_error)
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection().await?;
        conn.del(keys.to_vec()).await.map_err(map_redis_error)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        conn.exists(key).await.map_err(map_redis_error)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        redis::cmd("PEXPIRE")
            .arg(key)
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64> {
        let mut conn = self.connection().await?;
        conn.incr(key, delta).await.map_err(map_redis_error)
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection().await?;
        conn.hget(key, field).await.map_err(map_redis_error)
    }

    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.connection().await?;
        conn.hgetall(key).await.map_err(map_redis_error)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        conn.hset(key, field, value).await.map_err(map_redis_error)
    }

    async fn hlen(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.connection().await?;
        conn.hlen(key).await.map_err(map_redis_error)
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<u64> {
        let mut conn = self.connection().await?;
        conn.hdel(key, field).await.map_err(map_redis_error)
    }

    async fn hkeys(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.connection().await?;
        conn.hkeys(key).await.map_err(map_redis_error)
    }

    async fn hset_atomic(&self, writes: Vec<HashWrite>) -> StoreResult<()> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for write in &writes {
            pipe.hset(&write.key, &write.field, &write.value).ignore();
        }

        let mut conn = self.connection().await?;
        let result: RedisResult<()> = pipe.query_async(&mut conn).await;
        result.map_err(map_redis_error)
    }

    async fn flush_db(&self) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("FLUSHDB").query_async(&mut conn).await.map_err(map_redis_error)
    }
}

/// Millisecond TTL for PX/PEXPIRE, which reject zero.
fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn map_redis_error(err: RedisError) -> StoreError {
    if err.code() == Some("WRONGTYPE") {
        StoreError::WrongType
    } else if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
    {
        StoreError::Connection(err.to_string())
    } else if err.to_string().contains("not an integer") {
        StoreError::NotAnInteger
    } else {
        StoreError::Backend(err.to_string())
    }
}

fn connection_info(config: &Config) -> Result<ConnectionInfo> {
    let addr = match config.network {
        Network::Tcp => {
            let (host, port) = split_host_port(&config.host)?;
            ConnectionAddr::Tcp(host, port)
        }
        #[cfg(unix)]
        Network::Unix => ConnectionAddr::Unix(std::path::PathBuf::from(&config.host)),
        #[cfg(not(unix))]
        Network::Unix => {
            return Err(CacheError::invalid_option(
                "network",
                "unix",
                "unix sockets are not available on this platform",
            ))
        }
    };

    Ok(ConnectionInfo {
        addr,
        redis: RedisConnectionInfo {
            db: config.db,
            password: config.password.clone(),
            ..Default::default()
        },
    })
}

/// Splits `host:port`, accepting bracketed IPv6 and a missing port.
fn split_host_port(address: &str) -> Result<(String, u16)> {
    let invalid = |reason: &str| CacheError::invalid_option("host", address, reason);

    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && (!host.contains(':') || host.ends_with(']')) => {
            let port = port.parse().map_err(|_| invalid("port is not a number"))?;
            (host, port)
        }
        _ if address.is_empty() => return Err(invalid("address is empty")),
        _ => (address, DEFAULT_PORT),
    };

    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok((host.to_string(), port))
}
