use std::time::Duration;
use tinylink_core::{KvCache, ShortCode, UrlMapping};
use tracing::{debug, trace, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// TTL and promotion settings for [`MappingCache`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct CachePolicy {
    /// TTL applied to freshly populated entries.
    #[builder(default = 24 * HOUR)]
    pub default_ttl: Duration,
    /// TTL applied once an entry's access counter passes the threshold.
    #[builder(default = 7 * DAY)]
    pub extended_ttl: Duration,
    /// Access count above which an entry is promoted to `extended_ttl`.
    #[builder(default = 100)]
    pub hot_key_threshold: i64,
    /// TTL of the per-mapping access counter, refreshed on every population.
    #[builder(default = 7 * DAY)]
    pub access_counter_ttl: Duration,
    /// TTL of the per-mapping click counter.
    #[builder(default = 30 * DAY)]
    pub click_counter_ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn code_key(code: &ShortCode) -> String {
    format!("url:tiny:{code}")
}

fn original_key(original_url: &str) -> String {
    format!("url:original:{original_url}")
}

fn access_key(id: &Uuid) -> String {
    format!("analytics:access:{id}")
}

fn clicks_key(id: &Uuid) -> String {
    format!("analytics:clicks:{id}")
}

/// Cache-aside projection of [`UrlMapping`]s, keyed by both code and original URL.
///
/// Every operation is best-effort: backend failures and undecodable entries
/// are logged and reported as a miss or a no-op, never as an error. The cache
/// is not authoritative; callers refresh it from the store on disagreement.
#[derive(Debug, Clone)]
pub struct MappingCache<C> {
    backend: C,
    policy: CachePolicy,
}

impl<C: KvCache> MappingCache<C> {
    pub fn new(backend: C) -> Self {
        Self::with_policy(backend, CachePolicy::default())
    }

    pub fn with_policy(backend: C, policy: CachePolicy) -> Self {
        Self { backend, policy }
    }

    /// Returns a reference to the underlying key/value backend.
    pub fn backend(&self) -> &C {
        &self.backend
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub async fn get_by_code(&self, code: &ShortCode) -> Option<UrlMapping> {
        self.load(&code_key(code)).await
    }

    pub async fn get_by_original_url(&self, original_url: &str) -> Option<UrlMapping> {
        self.load(&original_key(original_url)).await
    }

    /// Writes `mapping` under both keys and bumps its access counter.
    ///
    /// Once the counter passes the hot-key threshold both entries are
    /// re-expired with the extended TTL.
    pub async fn populate(&self, mapping: &UrlMapping) {
        if !self.write(mapping, self.policy.default_ttl).await {
            return;
        }

        let key = access_key(&mapping.id);
        let accesses = match self.backend.increment(&key).await {
            Ok(accesses) => accesses,
            Err(e) => {
                warn!(code = %mapping.code, error = %e, "Failed to bump cache access counter");
                return;
            }
        };
        if let Err(e) = self.backend.expire(&key, self.policy.access_counter_ttl).await {
            warn!(key = %key, error = %e, "Failed to set access counter TTL");
        }

        if accesses > self.policy.hot_key_threshold {
            debug!(code = %mapping.code, accesses, "Promoting hot cache entry");
            for key in [code_key(&mapping.code), original_key(&mapping.original_url)] {
                if let Err(e) = self.backend.expire(&key, self.policy.extended_ttl).await {
                    warn!(key = %key, error = %e, "Failed to extend cache TTL");
                }
            }
        }
    }

    /// Overwrites both entries with a newer view of `mapping` without counting
    /// an access. Promoted entries keep the extended TTL.
    pub async fn refresh(&self, mapping: &UrlMapping) {
        let ttl = if self.is_hot(&mapping.id).await {
            self.policy.extended_ttl
        } else {
            self.policy.default_ttl
        };
        self.write(mapping, ttl).await;
    }

    /// Increments the click counter for `id`. Returns the new count, if the
    /// backend answered.
    pub async fn record_click(&self, id: &Uuid) -> Option<i64> {
        let key = clicks_key(id);
        let clicks = match self.backend.increment(&key).await {
            Ok(clicks) => clicks,
            Err(e) => {
                warn!(id = %id, error = %e, "Failed to increment click counter");
                return None;
            }
        };

        if let Err(e) = self.backend.expire(&key, self.policy.click_counter_ttl).await {
            warn!(id = %id, error = %e, "Failed to set click counter TTL");
        }
        Some(clicks)
    }

    /// Removes both entries for `mapping`.
    pub async fn invalidate(&self, mapping: &UrlMapping) {
        for key in [code_key(&mapping.code), original_key(&mapping.original_url)] {
            self.delete(&key).await;
        }
        debug!(code = %mapping.code, "Invalidated cache entries");
    }

    async fn load(&self, key: &str) -> Option<UrlMapping> {
        trace!(key, "Looking up mapping in cache");

        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                trace!(key, "Cache miss");
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "Cache error on get, treating as miss");
                return None;
            }
        };

        match serde_json::from_str::<UrlMapping>(&raw) {
            Ok(mapping) => {
                debug!(key, "Cache hit");
                Some(mapping)
            }
            Err(e) => {
                warn!(key, error = %e, "Dropping undecodable cache entry");
                self.delete(key).await;
                None
            }
        }
    }

    async fn write(&self, mapping: &UrlMapping, ttl: Duration) -> bool {
        let json = match serde_json::to_string(mapping) {
            Ok(json) => json,
            Err(e) => {
                warn!(code = %mapping.code, error = %e, "Failed to serialize mapping for caching");
                return false;
            }
        };

        for key in [code_key(&mapping.code), original_key(&mapping.original_url)] {
            if let Err(e) = self.backend.set(&key, &json, Some(ttl)).await {
                warn!(key = %key, error = %e, "Failed to cache mapping");
                return false;
            }
        }

        debug!(code = %mapping.code, ?ttl, "Cached mapping");
        true
    }

    async fn is_hot(&self, id: &Uuid) -> bool {
        match self.backend.get(&access_key(id)).await {
            Ok(Some(raw)) => raw
                .parse::<i64>()
                .is_ok_and(|accesses| accesses > self.policy.hot_key_threshold),
            Ok(None) => false,
            Err(e) => {
                warn!(id = %id, error = %e, "Failed to read cache access counter");
                false
            }
        }
    }

    async fn delete(&self, key: &str) {
        if let Err(e) = self.backend.delete(key).await {
            warn!(key, error = %e, "Failed to delete cache entry");
        }
    }
}
