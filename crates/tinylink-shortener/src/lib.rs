//! URL shortener service implementation.
//!
//! This crate provides [`MappingService`], which ties the store, the mapping
//! cache and the code generator together. Core types are re-exported from
//! `tinylink_core`.

pub mod error;
pub mod locks;
pub mod service;

pub use error::ShortenerError;
pub use locks::{KeyGuard, KeyedLocks};
pub use service::{ExpirationPolicy, MappingService, ServiceConfig, ShortenRequest};
pub use tinylink_core::{ShortCode, UrlMapping};
