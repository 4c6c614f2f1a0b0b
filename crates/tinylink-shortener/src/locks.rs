use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A registry of async mutexes keyed by string.
///
/// Mutexes are created on first use and removed again once the last guard
/// for a key is dropped and nobody is waiting on it, so the registry only
/// holds keys that are currently contended.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyGuard<'_> {
        // Clone under the shard lock so the strong count already covers us
        // if a concurrent guard is being dropped.
        let mutex = Arc::clone(self.locks.entry(key.to_owned()).or_default().value());

        let mut guard = KeyGuard {
            locks: &self.locks,
            key: key.to_owned(),
            inner: None,
        };
        guard.inner = Some(mutex.lock_owned().await);
        guard
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one key of a [`KeyedLocks`].
#[derive(Debug)]
pub struct KeyGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    inner: Option<OwnedMutexGuard<()>>,
}

impl KeyGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // Release first so the guard's own reference no longer counts.
        drop(self.inner.take());
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
