use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use jiff::Timestamp;
use tinylink_core::store::Result;
use tinylink_core::{
    ClickOutcome, ConflictField, NewMapping, ReadStore, ShortCode, StorageError, Store,
    UrlMapping,
};

/// In-memory implementation of the [`Store`] trait using DashMap.
///
/// Mappings are indexed by code, with a secondary index from original URL to
/// code. Inserts hold the original-URL shard and then the code shard, so both
/// uniqueness checks and both writes happen atomically with respect to other
/// inserts. Readers never hold both indexes at once.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    by_code: DashMap<String, UrlMapping>,
    by_original_url: DashMap<String, String>,
}

impl InMemoryStore {
    /// Creates a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored mappings.
    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

#[async_trait]
impl ReadStore for InMemoryStore {
    async fn find_by_code(&self, code: &ShortCode) -> Result<Option<UrlMapping>> {
        Ok(self
            .by_code
            .get(code.as_str())
            .map(|entry| entry.value().clone()))
    }

    async fn find_by_original_url(&self, original_url: &str) -> Result<Option<UrlMapping>> {
        // Release the index guard before touching the primary map.
        let Some(code) = self
            .by_original_url
            .get(original_url)
            .map(|entry| entry.value().clone())
        else {
            return Ok(None);
        };

        Ok(self.by_code.get(&code).map(|entry| entry.value().clone()))
    }

    async fn exists(&self, code: &ShortCode) -> Result<bool> {
        Ok(self.by_code.contains_key(code.as_str()))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn save(&self, mapping: NewMapping) -> Result<UrlMapping> {
        let url_slot = match self.by_original_url.entry(mapping.original_url.clone()) {
            Entry::Occupied(_) => {
                return Err(StorageError::Conflict {
                    field: ConflictField::OriginalUrl,
                    value: mapping.original_url,
                });
            }
            Entry::Vacant(slot) => slot,
        };

        let code_slot = match self.by_code.entry(mapping.code.as_str().to_owned()) {
            Entry::Occupied(_) => {
                return Err(StorageError::Conflict {
                    field: ConflictField::Code,
                    value: mapping.code.to_string(),
                });
            }
            Entry::Vacant(slot) => slot,
        };

        let stored = UrlMapping::from_new(mapping, Timestamp::now());
        code_slot.insert(stored.clone());
        url_slot.insert(stored.code.as_str().to_owned());
        Ok(stored)
    }

    async fn record_click(&self, code: &ShortCode) -> Result<ClickOutcome> {
        let Some(mut entry) = self.by_code.get_mut(code.as_str()) else {
            return Ok(ClickOutcome::Missing);
        };

        // The shard stays write-locked between the check and the increment.
        let now = Timestamp::now();
        if entry.is_expired_at(now) {
            return Ok(ClickOutcome::Expired(entry.value().clone()));
        }

        entry.click_count += 1;
        entry.updated_at = now;
        Ok(ClickOutcome::Recorded(entry.value().clone()))
    }
}
