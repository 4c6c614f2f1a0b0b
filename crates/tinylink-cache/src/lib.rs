//! Cache backends and the mapping cache shared by tinylink services.

pub mod mapping;
pub mod moka;
pub mod redis;

pub use mapping::{CachePolicy, MappingCache};
pub use moka::{MokaCacheConfig, MokaKvCache};
pub use redis::RedisKvCache;
pub use tinylink_core::{CacheError, KvCache};
