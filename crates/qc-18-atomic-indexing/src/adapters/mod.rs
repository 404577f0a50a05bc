//! # Adapters
//!
//! `KeyValueStore` implementations.
//!
//! - `memory` - ordered in-memory store for tests and ephemeral nodes
//! - `rocksdb` - production store (feature `rocksdb`)

pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocksdb;

pub use memory::InMemoryKVStore;
#[cfg(feature = "rocksdb")]
pub use self::rocksdb::{RocksDbConfig, RocksDbStore};
