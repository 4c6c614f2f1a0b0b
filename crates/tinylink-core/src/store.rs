use crate::error::StorageError;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// The canonical mapping between a short code and an original URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlMapping {
    pub id: Uuid,
    pub code: ShortCode,
    /// The normalized original URL.
    pub original_url: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// When the mapping stops resolving, if ever.
    pub expire_at: Option<Timestamp>,
    /// Maximum number of resolutions, if capped.
    pub max_clicks: Option<u64>,
    pub click_count: u64,
}

impl UrlMapping {
    /// Builds a fresh mapping for the given insert payload.
    ///
    /// Stores call this to assign the id, timestamps and a zero click count.
    pub fn from_new(new: NewMapping, now: Timestamp) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: new.code,
            original_url: new.original_url,
            created_at: now,
            updated_at: now,
            expire_at: new.expire_at,
            max_clicks: new.max_clicks,
            click_count: 0,
        }
    }

    /// Returns `true` if the mapping must no longer resolve at `now`.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        if self.expire_at.is_some_and(|expire_at| now >= expire_at) {
            return true;
        }
        self.max_clicks
            .is_some_and(|max_clicks| self.click_count >= max_clicks)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Timestamp::now())
    }
}

/// Insert payload for [`Store::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMapping {
    pub code: ShortCode,
    pub original_url: String,
    pub expire_at: Option<Timestamp>,
    pub max_clicks: Option<u64>,
}

impl NewMapping {
    pub fn new(code: ShortCode, original_url: impl Into<String>) -> Self {
        Self {
            code,
            original_url: original_url.into(),
            expire_at: None,
            max_clicks: None,
        }
    }
}

/// Result of [`Store::record_click`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The click was counted; holds the updated mapping.
    Recorded(UrlMapping),
    /// The mapping exists but was already expired; nothing was counted.
    Expired(UrlMapping),
    /// No mapping has this code.
    Missing,
}

/// A read-only view of the authoritative mapping store.
#[async_trait]
pub trait ReadStore: Send + Sync + 'static {
    /// Retrieves the mapping for a given short code.
    /// Returns `None` if the code does not exist.
    async fn find_by_code(&self, code: &ShortCode) -> Result<Option<UrlMapping>>;

    /// Retrieves the mapping for a given normalized original URL.
    async fn find_by_original_url(&self, original_url: &str) -> Result<Option<UrlMapping>>;

    /// Checks whether a short code is already assigned.
    async fn exists(&self, code: &ShortCode) -> Result<bool>;
}

#[async_trait]
pub trait Store: ReadStore {
    /// Persists a new mapping.
    ///
    /// Returns `Err(StorageError::Conflict { .. })` if either the code or the
    /// original URL is already taken.
    async fn save(&self, mapping: NewMapping) -> Result<UrlMapping>;

    /// Increments the click count of the mapping for `code` and refreshes
    /// `updated_at`, but only while the mapping is unexpired.
    ///
    /// The expiry check and the increment are a single atomic step, so at
    /// most `max_clicks` calls ever return [`ClickOutcome::Recorded`].
    async fn record_click(&self, code: &ShortCode) -> Result<ClickOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::SignedDuration;

    fn mapping() -> UrlMapping {
        let new = NewMapping::new(
            ShortCode::new_unchecked("k7Qp2R9x"),
            "https://example.com/a",
        );
        UrlMapping::from_new(new, Timestamp::now())
    }

    #[test]
    fn fresh_mapping_is_live() {
        let m = mapping();
        assert_eq!(m.click_count, 0);
        assert_eq!(m.created_at, m.updated_at);
        assert!(!m.is_expired());
    }

    #[test]
    fn expired_by_time() {
        let mut m = mapping();
        let now = Timestamp::now();
        m.expire_at = Some(now - SignedDuration::from_secs(1));
        assert!(m.is_expired_at(now));

        m.expire_at = Some(now + SignedDuration::from_hours(1));
        assert!(!m.is_expired_at(now));
    }

    #[test]
    fn expired_by_clicks() {
        let mut m = mapping();
        m.max_clicks = Some(2);
        m.click_count = 1;
        assert!(!m.is_expired());

        m.click_count = 2;
        assert!(m.is_expired());
    }

    #[test]
    fn round_trips_through_json() {
        let m = mapping();
        let json = serde_json::to_string(&m).unwrap();
        let back: UrlMapping = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
