//! Store backends for tinylink.

pub mod memory;
pub mod mysql;

pub use memory::InMemoryStore;
pub use mysql::MySqlStore;
pub use tinylink_core::{ClickOutcome, ReadStore, StorageError, Store};
