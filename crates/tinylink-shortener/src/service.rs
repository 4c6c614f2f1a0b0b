use crate::error::{Result, ShortenerError};
use crate::locks::KeyedLocks;
use jiff::{SignedDuration, Timestamp};
use rand::rngs::StdRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tinylink_cache::MappingCache;
use tinylink_core::{
    normalize_url, ClickOutcome, KvCache, NewMapping, ShortCode, StorageError, Store, UrlMapping,
};
use tinylink_generator::CodeGenerator;
use tracing::{debug, info, trace, warn};
use typed_builder::TypedBuilder;

/// Default number of generate-and-claim rounds in [`MappingService::shorten`].
pub const DEFAULT_MAX_CLAIM_ATTEMPTS: usize = 3;

/// Expiration policy for a shortened URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpirationPolicy {
    /// The shortened URL never expires.
    #[default]
    Never,
    /// The shortened URL expires after a certain duration.
    AfterDuration(SignedDuration),
    /// The shortened URL expires at a specific timestamp.
    AtTimestamp(Timestamp),
}

impl ExpirationPolicy {
    /// Resolves the policy to an absolute deadline relative to `now`.
    pub fn expire_at(&self, now: Timestamp) -> Result<Option<Timestamp>> {
        let expire_at = match self {
            ExpirationPolicy::Never => return Ok(None),
            ExpirationPolicy::AfterDuration(duration) => {
                if !duration.is_positive() {
                    return Err(ShortenerError::InvalidInput(format!(
                        "expiration duration must be positive, got {duration}"
                    )));
                }
                now.checked_add(*duration).map_err(|e| {
                    ShortenerError::InvalidInput(format!("invalid expiration duration: {e}"))
                })?
            }
            ExpirationPolicy::AtTimestamp(timestamp) => *timestamp,
        };

        if expire_at <= now {
            return Err(ShortenerError::InvalidInput(format!(
                "expiration must be in the future, got {expire_at}"
            )));
        }
        Ok(Some(expire_at))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortenRequest {
    /// The original URL to be shortened.
    pub original_url: String,
    /// The expiration policy for the shortened URL.
    pub expiration: ExpirationPolicy,
    /// Number of resolutions after which the mapping stops resolving.
    pub max_clicks: Option<u64>,
}

impl ShortenRequest {
    pub fn new(original_url: impl Into<String>) -> Self {
        Self {
            original_url: original_url.into(),
            expiration: ExpirationPolicy::Never,
            max_clicks: None,
        }
    }
}

#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct ServiceConfig {
    /// Generate-and-claim rounds before giving up on a new mapping.
    #[builder(default = DEFAULT_MAX_CLAIM_ATTEMPTS)]
    pub max_claim_attempts: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Creates and resolves URL mappings.
///
/// The store is authoritative; the cache is consulted first on both paths
/// and repopulated from the store on a miss. New codes are claimed under a
/// per-code lock, and the store's uniqueness constraints settle any race
/// the lock cannot see (other processes sharing the store).
pub struct MappingService<S, C, R = StdRng> {
    store: Arc<S>,
    cache: MappingCache<C>,
    generator: CodeGenerator<R>,
    locks: KeyedLocks,
    config: ServiceConfig,
}

impl<S: Store, C: KvCache> MappingService<S, C> {
    /// Creates a service with the default cache policy, an entropy-seeded
    /// generator and the default config.
    pub fn new(store: S, cache: C) -> Self {
        Self::with_parts(
            store,
            MappingCache::new(cache),
            CodeGenerator::default(),
            ServiceConfig::default(),
        )
    }
}

impl<S, C, R> MappingService<S, C, R>
where
    S: Store,
    C: KvCache,
    R: RngCore + Send + 'static,
{
    pub fn with_parts(
        store: S,
        cache: MappingCache<C>,
        generator: CodeGenerator<R>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store: Arc::new(store),
            cache,
            generator,
            locks: KeyedLocks::new(),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &MappingCache<C> {
        &self.cache
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Returns the mapping for `original_url`, creating it if needed.
    pub async fn shorten(&self, original_url: &str) -> Result<UrlMapping> {
        self.shorten_with(ShortenRequest::new(original_url)).await
    }

    /// Returns the mapping for the request's URL, creating it with the
    /// requested limits if needed.
    ///
    /// An existing mapping is returned as is; the limits of the request only
    /// apply to newly created mappings.
    pub async fn shorten_with(&self, request: ShortenRequest) -> Result<UrlMapping> {
        let original_url = normalize_url(&request.original_url)?;
        if request.max_clicks == Some(0) {
            return Err(ShortenerError::InvalidInput(
                "max clicks must be at least 1".to_string(),
            ));
        }

        if let Some(mapping) = self.cache.get_by_original_url(&original_url).await {
            debug!(code = %mapping.code, "Returning cached mapping for url");
            return Ok(mapping);
        }

        if let Some(mapping) = self.store.find_by_original_url(&original_url).await? {
            debug!(code = %mapping.code, "Returning stored mapping for url");
            self.cache.populate(&mapping).await;
            return Ok(mapping);
        }

        let expire_at = request.expiration.expire_at(Timestamp::now())?;
        let mapping = self
            .claim(&original_url, expire_at, request.max_clicks)
            .await?;
        self.cache.populate(&mapping).await;

        info!(
            code = %mapping.code,
            original_url = %mapping.original_url,
            "Created url mapping"
        );
        Ok(mapping)
    }

    /// Returns the live mapping for `code` and records the click.
    ///
    /// The store decides liveness: a cached copy that looks live is still
    /// refused once the store reports the mapping expired. The returned
    /// mapping is the view before this click was counted.
    pub async fn resolve(&self, code: &str) -> Result<UrlMapping> {
        let code = ShortCode::new(code.trim())?;

        let (mapping, cached) = match self.cache.get_by_code(&code).await {
            Some(mapping) => (mapping, true),
            None => {
                trace!(code = %code, "Falling back to store");
                let mapping = self
                    .store
                    .find_by_code(&code)
                    .await?
                    .ok_or_else(|| ShortenerError::NotFound(code.to_string()))?;
                (mapping, false)
            }
        };

        if mapping.is_expired() {
            debug!(code = %code, "Mapping has expired");
            self.cache.invalidate(&mapping).await;
            return Err(ShortenerError::NotFound(code.to_string()));
        }

        if !cached {
            self.cache.populate(&mapping).await;
        }

        match self.store.record_click(&mapping.code).await {
            Ok(ClickOutcome::Recorded(updated)) => {
                self.cache.refresh(&updated).await;
                self.cache.record_click(&mapping.id).await;
            }
            Ok(ClickOutcome::Expired(current)) => {
                debug!(code = %code, "Store reports the mapping expired");
                self.cache.invalidate(&current).await;
                return Err(ShortenerError::NotFound(code.to_string()));
            }
            Ok(ClickOutcome::Missing) => {
                debug!(code = %code, "Mapping is gone from the store");
                self.cache.invalidate(&mapping).await;
                return Err(ShortenerError::NotFound(code.to_string()));
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Failed to record click");
                self.cache.record_click(&mapping.id).await;
            }
        }

        Ok(mapping)
    }

    /// Generates a code and persists the mapping under that code's lock.
    async fn claim(
        &self,
        original_url: &str,
        expire_at: Option<Timestamp>,
        max_clicks: Option<u64>,
    ) -> Result<UrlMapping> {
        for attempt in 1..=self.config.max_claim_attempts {
            let code = self
                .generator
                .generate(original_url, self.store.as_ref())
                .await?;

            let guard = self.locks.lock(code.as_str()).await;
            if self.store.exists(&code).await? {
                debug!(code = %code, attempt, "Code was claimed before the lock was taken");
                continue;
            }

            let result = self
                .store
                .save(NewMapping {
                    code,
                    original_url: original_url.to_owned(),
                    expire_at,
                    max_clicks,
                })
                .await;
            drop(guard);

            match result {
                Ok(mapping) => return Ok(mapping),
                Err(StorageError::Conflict { field, value }) => {
                    if let Some(existing) = self.store.find_by_original_url(original_url).await? {
                        debug!(code = %existing.code, "Lost the race to a concurrent shorten");
                        return Ok(existing);
                    }
                    debug!(%field, %value, attempt, "Store rejected the claim, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            attempts = self.config.max_claim_attempts,
            "Exhausted code claim attempts"
        );
        Err(ShortenerError::ShortenFailed(format!(
            "no code could be claimed after {} attempts",
            self.config.max_claim_attempts
        )))
    }
}
