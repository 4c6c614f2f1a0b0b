use async_trait::async_trait;
use moka::future::Cache;
use moka::ops::compute::Op;
use moka::Expiry;
use std::time::{Duration, Instant};
use tinylink_core::{CacheError, KvCache};
use tracing::{debug, trace};
use typed_builder::TypedBuilder;

/// Type alias for cache results.
pub type Result<T> = std::result::Result<T, CacheError>;

/// A cached value together with its absolute deadline.
#[derive(Debug, Clone)]
struct Slot {
    value: String,
    deadline: Option<Instant>,
}

impl Slot {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            deadline: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}

/// Expires each slot at its own deadline, so updates that keep the deadline
/// (counter increments) do not extend the entry's life.
struct SlotExpiry;

impl Expiry<String, Slot> for SlotExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Slot,
        created_at: Instant,
    ) -> Option<Duration> {
        value.remaining(created_at)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Slot,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.remaining(updated_at)
    }
}

/// An in-memory [`KvCache`] implementation using Moka.
///
/// Entries carry their own TTL. It's ideal for single-node deployments and
/// for tests.
#[derive(Debug, Clone)]
pub struct MokaKvCache {
    cache: Cache<String, Slot>,
}

impl MokaKvCache {
    /// Creates a new Moka cache with default settings.
    ///
    /// The cache will have a default maximum capacity of 10,000 entries.
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    /// Creates a new Moka cache with a custom maximum capacity.
    pub fn with_capacity(max_capacity: u64) -> Self {
        MokaCacheConfig::builder()
            .max_capacity(max_capacity)
            .build()
            .into()
    }

    /// Returns a builder for creating a custom cache configuration.
    pub fn builder() -> MokaCacheConfigBuilder {
        MokaCacheConfig::builder()
    }
}

impl Default for MokaKvCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvCache for MokaKvCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        trace!(key, "Fetching value from Moka cache");

        match self.cache.get(key).await {
            Some(slot) => {
                debug!(key, "Cache hit in Moka");
                Ok(Some(slot.value))
            }
            None => {
                trace!(key, "Cache miss in Moka");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        trace!(key, ?ttl, "Storing value in Moka cache");
        self.cache
            .insert(key.to_owned(), Slot::new(value.to_owned(), ttl))
            .await;
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let entry = self
            .cache
            .entry(key.to_owned())
            .and_upsert_with(|existing| {
                let slot = match existing {
                    Some(entry) => {
                        let current = entry.into_value();
                        // Non-numeric values restart the counter.
                        let next = current.value.parse::<i64>().unwrap_or(0) + 1;
                        Slot {
                            value: next.to_string(),
                            deadline: current.deadline,
                        }
                    }
                    None => Slot::new("1".to_string(), None),
                };
                std::future::ready(slot)
            })
            .await;

        entry
            .into_value()
            .value
            .parse::<i64>()
            .map_err(|e| CacheError::InvalidData(format!("counter '{key}' is not an integer: {e}")))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        trace!(key, ?ttl, "Resetting TTL in Moka cache");
        // Same entry lock as `increment`, so a concurrent bump is not lost.
        self.cache
            .entry(key.to_owned())
            .and_compute_with(|existing| {
                let op = match existing {
                    Some(entry) => Op::Put(Slot::new(entry.into_value().value, Some(ttl))),
                    None => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        trace!(key, "Removing value from Moka cache");
        self.cache.invalidate(key).await;
        Ok(())
    }
}

/// Configuration for creating a [`MokaKvCache`] with custom settings.
#[derive(Debug, TypedBuilder, Default)]
pub struct MokaCacheConfig {
    /// Maximum number of entries the cache can hold.
    #[builder(default, setter(strip_option))]
    max_capacity: Option<u64>,
    /// Upper bound on how long an unread entry is kept, regardless of its TTL.
    #[builder(default, setter(strip_option))]
    tti: Option<Duration>,
}

impl From<MokaCacheConfig> for MokaKvCache {
    fn from(config: MokaCacheConfig) -> Self {
        let mut builder = Cache::builder().expire_after(SlotExpiry);

        if let Some(capacity) = config.max_capacity {
            builder = builder.max_capacity(capacity);
        }

        if let Some(tti) = config.tti {
            builder = builder.time_to_idle(tti);
        }

        MokaKvCache {
            cache: builder.build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_and_set() {
        let cache = MokaKvCache::new();

        assert!(cache.get("k").await.unwrap().is_none());

        cache.set("k", "v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        cache.set("k", "w", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("w"));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let cache = MokaKvCache::new();
        cache.set("k", "v", None).await.unwrap();

        cache.delete("k").await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());

        cache.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn entry_with_ttl_expires() {
        let cache = MokaKvCache::new();
        cache
            .set("short", "v", Some(Duration::from_millis(50)))
            .await
            .unwrap();
        cache.set("forever", "v", None).await.unwrap();

        assert!(cache.get("short").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(cache.get("short").await.unwrap().is_none());
        assert!(cache.get("forever").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expire_extends_ttl() {
        let cache = MokaKvCache::new();
        cache
            .set("k", "v", Some(Duration::from_millis(50)))
            .await
            .unwrap();

        cache.expire("k", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn expire_ignores_missing_keys() {
        let cache = MokaKvCache::new();
        cache.expire("missing", Duration::from_secs(60)).await.unwrap();
        assert!(cache.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn increment_counts_from_one() {
        let cache = MokaKvCache::new();

        assert_eq!(cache.increment("hits").await.unwrap(), 1);
        assert_eq!(cache.increment("hits").await.unwrap(), 2);
        assert_eq!(cache.get("hits").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn increment_keeps_deadline() {
        let cache = MokaKvCache::new();
        cache.increment("hits").await.unwrap();
        cache
            .expire("hits", Duration::from_millis(50))
            .await
            .unwrap();

        assert_eq!(cache.increment("hits").await.unwrap(), 2);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(cache.get("hits").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let cache = MokaKvCache::new();

        let mut handles = vec![];
        for _ in 0..20 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.increment("hits").await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.get("hits").await.unwrap().as_deref(), Some("20"));
    }

    #[tokio::test]
    async fn increments_survive_concurrent_expires() {
        let cache = MokaKvCache::new();

        let mut handles = vec![];
        for _ in 0..20 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.increment("hits").await.unwrap();
                cache.expire("hits", Duration::from_secs(60)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.get("hits").await.unwrap().as_deref(), Some("20"));
    }

    #[tokio::test]
    async fn builder_pattern() {
        let cache: MokaKvCache = MokaKvCache::builder()
            .max_capacity(1000)
            .tti(Duration::from_secs(30))
            .build()
            .into();

        cache.set("k", "v", None).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_some());
    }
}
