use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;
use tinylink_core::{CacheError, KvCache};
use tracing::{debug, trace, warn};

/// Type alias for cache results.
pub type Result<T> = std::result::Result<T, CacheError>;

/// A Redis-based implementation of [`KvCache`].
///
/// Values are stored as plain strings under a configurable key prefix.
/// TTLs are rounded down to whole seconds, with a floor of one second.
#[derive(Clone)]
pub struct RedisKvCache {
    conn: redis::aio::MultiplexedConnection,
    key_prefix: String,
}

fn map_redis_error(operation: &str, err: redis::RedisError) -> CacheError {
    let message = format!("{operation}: {err}");
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("timed out") {
        CacheError::Timeout(message)
    } else if lowered.contains("connection refused") || lowered.contains("broken pipe") {
        CacheError::Unavailable(message)
    } else {
        CacheError::Operation(message)
    }
}

fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl RedisKvCache {
    /// Creates a new Redis cache with the default `tinylink:` key prefix.
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self::with_prefix(conn, "tinylink:")
    }

    /// Creates a new Redis cache with a custom key prefix.
    ///
    /// # Arguments
    ///
    /// * `conn` - A multiplexed Redis connection
    /// * `key_prefix` - Custom prefix for cache keys (e.g., "myapp:")
    pub fn with_prefix(
        conn: redis::aio::MultiplexedConnection,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
        }
    }

    /// Opens a multiplexed connection to `redis_url`.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CacheError::Initialization(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| map_redis_error("failed to connect to Redis", e))?;
        Ok(Self::new(conn))
    }

    fn cache_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

impl std::fmt::Debug for RedisKvCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKvCache")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KvCache for RedisKvCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let cache_key = self.cache_key(key);
        trace!(key = %cache_key, "Fetching value from Redis cache");

        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(&cache_key).await {
            Ok(Some(value)) => {
                debug!(key = %cache_key, "Cache hit in Redis");
                Ok(Some(value))
            }
            Ok(None) => {
                trace!(key = %cache_key, "Cache miss in Redis");
                Ok(None)
            }
            Err(e) => {
                warn!(key = %cache_key, error = %e, "Redis error on get");
                Err(map_redis_error("failed to fetch value from Redis", e))
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let cache_key = self.cache_key(key);
        trace!(key = %cache_key, ?ttl, "Storing value in Redis cache");

        let mut conn = self.conn.clone();
        let result = match ttl {
            Some(ttl) => {
                conn.set_ex::<_, _, ()>(&cache_key, value, ttl_seconds(ttl))
                    .await
            }
            None => conn.set::<_, _, ()>(&cache_key, value).await,
        };

        result.map_err(|e| {
            warn!(key = %cache_key, error = %e, "Failed to write value to Redis");
            map_redis_error("failed to write value to Redis", e)
        })
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let cache_key = self.cache_key(key);
        trace!(key = %cache_key, "Incrementing counter in Redis cache");

        let mut conn = self.conn.clone();
        conn.incr::<_, _, i64>(&cache_key, 1).await.map_err(|e| {
            warn!(key = %cache_key, error = %e, "Failed to increment counter in Redis");
            map_redis_error("failed to increment counter in Redis", e)
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let cache_key = self.cache_key(key);
        trace!(key = %cache_key, ?ttl, "Resetting TTL in Redis cache");

        let seconds = i64::try_from(ttl_seconds(ttl)).unwrap_or(i64::MAX);
        let mut conn = self.conn.clone();
        conn.expire::<_, ()>(&cache_key, seconds).await.map_err(|e| {
            warn!(key = %cache_key, error = %e, "Failed to reset TTL in Redis");
            map_redis_error("failed to reset TTL in Redis", e)
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let cache_key = self.cache_key(key);
        trace!(key = %cache_key, "Removing value from Redis cache");

        let mut conn = self.conn.clone();
        conn.del::<_, ()>(&cache_key).await.map_err(|e| {
            warn!(key = %cache_key, error = %e, "Failed to remove value from Redis");
            map_redis_error("failed to delete value from Redis", e)
        })
    }
}
