//! Short code generation.
//!
//! [`CodeGenerator`] first tries a deterministic candidate derived from the
//! SHA-256 digest of the URL, so the same URL tends to get the same code even
//! across restarts. If that candidate is already taken it falls back to
//! random codes, giving up after a bounded number of attempts.

pub mod base62;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tinylink_core::{ReadStore, ShortCode, StorageError, CODE_LENGTH};
use tracing::{debug, trace, warn};
use typed_builder::TypedBuilder;

/// Default number of random attempts after the deterministic candidate.
pub const MAX_RETRIES: usize = 5;

#[derive(Debug, Clone, Error)]
pub enum GeneratorError {
    #[error("failed to generate an available code after {attempts} random attempts")]
    Exhausted { attempts: usize },
    #[error("availability check failed: {0}")]
    Availability(#[from] StorageError),
}

/// Configures a [`CodeGenerator`].
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct GeneratorSettings {
    /// Random attempts made once the deterministic candidate is taken.
    #[builder(default = MAX_RETRIES)]
    pub max_retries: usize,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Returns the deterministic candidate code for a normalized URL.
pub fn deterministic_code(original_url: &str) -> ShortCode {
    let digest = Sha256::digest(original_url.as_bytes());
    ShortCode::new_unchecked(base62::encode_fixed(&digest, CODE_LENGTH))
}

/// Produces short codes that are free in the store at the time of the check.
///
/// The random source is injected so tests can use a seeded generator.
pub struct CodeGenerator<R = StdRng> {
    rng: Mutex<R>,
    settings: GeneratorSettings,
}

impl CodeGenerator<StdRng> {
    /// Creates a generator seeded from the operating system's entropy source.
    pub fn new(settings: GeneratorSettings) -> Self {
        Self::with_rng(StdRng::from_entropy(), settings)
    }
}

impl Default for CodeGenerator<StdRng> {
    fn default() -> Self {
        Self::new(GeneratorSettings::default())
    }
}

impl<R: RngCore + Send + 'static> CodeGenerator<R> {
    pub fn with_rng(rng: R, settings: GeneratorSettings) -> Self {
        Self {
            rng: Mutex::new(rng),
            settings,
        }
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Draws a random code of [`CODE_LENGTH`] characters.
    pub fn random_code(&self) -> ShortCode {
        let mut bytes = [0_u8; CODE_LENGTH];
        self.rng.lock().fill_bytes(&mut bytes);
        ShortCode::new_unchecked(base62::encode_fixed(&bytes, CODE_LENGTH))
    }

    /// Generates a code for `original_url` that `store` reports as unassigned.
    ///
    /// Availability is always checked against the store, never a cache, so a
    /// stale cache entry cannot hide an assigned code.
    pub async fn generate<S>(
        &self,
        original_url: &str,
        store: &S,
    ) -> Result<ShortCode, GeneratorError>
    where
        S: ReadStore + ?Sized,
    {
        let candidate = deterministic_code(original_url);
        if !store.exists(&candidate).await? {
            trace!(code = %candidate, "deterministic candidate is available");
            return Ok(candidate);
        }

        debug!(
            code = %candidate,
            "deterministic candidate is taken, falling back to random codes"
        );

        for attempt in 1..=self.settings.max_retries {
            let candidate = self.random_code();
            if !store.exists(&candidate).await? {
                trace!(code = %candidate, attempt, "random candidate is available");
                return Ok(candidate);
            }
            debug!(code = %candidate, attempt, "random candidate collided");
        }

        warn!(
            attempts = self.settings.max_retries,
            "exhausted random code attempts"
        );
        Err(GeneratorError::Exhausted {
            attempts: self.settings.max_retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tinylink_core::UrlMapping;

    type StoreResult<T> = std::result::Result<T, StorageError>;

    /// A store that only answers availability checks.
    #[derive(Default)]
    struct TakenCodes {
        taken: Mutex<HashSet<String>>,
        take_everything: bool,
        checks: AtomicUsize,
    }

    impl TakenCodes {
        fn everything() -> Self {
            Self {
                take_everything: true,
                ..Self::default()
            }
        }

        fn with(codes: &[&ShortCode]) -> Self {
            let store = Self::default();
            store
                .taken
                .lock()
                .extend(codes.iter().map(|c| c.as_str().to_owned()));
            store
        }
    }

    #[async_trait]
    impl ReadStore for TakenCodes {
        async fn find_by_code(&self, _code: &ShortCode) -> StoreResult<Option<UrlMapping>> {
            Ok(None)
        }

        async fn find_by_original_url(&self, _url: &str) -> StoreResult<Option<UrlMapping>> {
            Ok(None)
        }

        async fn exists(&self, code: &ShortCode) -> StoreResult<bool> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            Ok(self.take_everything || self.taken.lock().contains(code.as_str()))
        }
    }

    struct Unreachable;

    #[async_trait]
    impl ReadStore for Unreachable {
        async fn find_by_code(&self, _code: &ShortCode) -> StoreResult<Option<UrlMapping>> {
            Err(StorageError::Unavailable("down".to_string()))
        }

        async fn find_by_original_url(&self, _url: &str) -> StoreResult<Option<UrlMapping>> {
            Err(StorageError::Unavailable("down".to_string()))
        }

        async fn exists(&self, _code: &ShortCode) -> StoreResult<bool> {
            Err(StorageError::Unavailable("down".to_string()))
        }
    }

    fn seeded(max_retries: usize) -> CodeGenerator<StdRng> {
        CodeGenerator::with_rng(
            StdRng::seed_from_u64(7),
            GeneratorSettings::builder().max_retries(max_retries).build(),
        )
    }

    fn is_base62(code: &ShortCode) -> bool {
        code.as_str().bytes().all(|b| base62::ALPHABET.contains(&b))
    }

    #[test]
    fn deterministic_code_is_stable() {
        assert_eq!(deterministic_code("https://example.com/a").as_str(), "k1AGNABb");
        assert_eq!(deterministic_code("https://example.com/b").as_str(), "ZnITEYPG");
        assert_eq!(
            deterministic_code("https://example.com/a"),
            deterministic_code("https://example.com/a")
        );
    }

    #[test]
    fn random_codes_have_fixed_length_and_alphabet() {
        let generator = seeded(MAX_RETRIES);
        for _ in 0..100 {
            let code = generator.random_code();
            assert_eq!(code.as_str().len(), CODE_LENGTH);
            assert!(is_base62(&code), "unexpected character in {code}");
        }
    }

    #[test]
    fn random_codes_differ() {
        let generator = seeded(MAX_RETRIES);
        let codes: HashSet<_> = (0..50).map(|_| generator.random_code()).collect();
        assert_eq!(codes.len(), 50);
    }

    #[tokio::test]
    async fn returns_deterministic_candidate_when_free() {
        let generator = seeded(MAX_RETRIES);
        let store = TakenCodes::default();

        let code = generator
            .generate("https://example.com/a", &store)
            .await
            .unwrap();

        assert_eq!(code, deterministic_code("https://example.com/a"));
        assert_eq!(store.checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn falls_back_to_random_when_deterministic_is_taken() {
        let generator = seeded(MAX_RETRIES);
        let taken = deterministic_code("https://example.com/a");
        let store = TakenCodes::with(&[&taken]);

        let code = generator
            .generate("https://example.com/a", &store)
            .await
            .unwrap();

        assert_ne!(code, taken);
        assert_eq!(code.as_str().len(), CODE_LENGTH);
        assert!(is_base62(&code));
    }

    #[tokio::test]
    async fn exhausts_after_max_retries() {
        let generator = seeded(3);
        let store = TakenCodes::everything();

        let err = generator
            .generate("https://example.com/a", &store)
            .await
            .unwrap_err();

        assert!(matches!(err, GeneratorError::Exhausted { attempts: 3 }));
        // one deterministic check plus three random ones
        assert_eq!(store.checks.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn propagates_store_failures() {
        let generator = seeded(MAX_RETRIES);

        let err = generator
            .generate("https://example.com/a", &Unreachable)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GeneratorError::Availability(StorageError::Unavailable(_))
        ));
    }

    #[test]
    fn generator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CodeGenerator>();
    }
}
