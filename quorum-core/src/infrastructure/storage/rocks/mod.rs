//! Persistent `Storage` on RocksDB: contexts, sealed key shares and request records.

pub mod engine;
pub mod schema;
pub mod util;

pub use engine::RocksStorage;
