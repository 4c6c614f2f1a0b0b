use crate::error::CacheError;
use async_trait::async_trait;
use std::time::Duration;

/// Type alias for cache results.
pub type Result<T> = std::result::Result<T, CacheError>;

/// A string key/value cache with per-entry time-to-live.
///
/// This is the backend contract the mapping cache is built on. Implementations
/// can use Redis, in-memory caches, or other storage backends. Callers treat
/// every error as a miss or a no-op.
#[async_trait]
pub trait KvCache: Send + Sync + 'static {
    /// Get a value from the cache.
    ///
    /// Returns `Ok(None)` if the key is not in the cache.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value with an optional TTL.
    ///
    /// If `ttl` is `None`, the entry persists until evicted or deleted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Atomically increment the integer counter at `key`, creating it at zero
    /// first if absent. Returns the new value.
    async fn increment(&self, key: &str) -> Result<i64>;

    /// Reset the TTL of an existing key. Missing keys are ignored.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Remove a key from the cache.
    ///
    /// It is not an error if the key does not exist.
    async fn delete(&self, key: &str) -> Result<()>;
}
