//! Core types and traits for the tinylink URL shortener.
//!
//! This crate provides the domain model shared by the generator, cache,
//! storage and shortener crates: short codes, URL mappings, the store and
//! cache contracts, and URL normalization.

pub mod cache;
pub mod error;
pub mod normalize;
pub mod shortcode;
pub mod store;

pub use cache::KvCache;
pub use error::{CacheError, ConflictField, CoreError, StorageError};
pub use normalize::{is_valid_url, normalize_url, validate_url, MAX_URL_LENGTH};
pub use shortcode::{ShortCode, CODE_LENGTH};
pub use store::{ClickOutcome, NewMapping, ReadStore, Store, UrlMapping};
