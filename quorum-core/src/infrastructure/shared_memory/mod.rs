//! Process-wide key/value store with TTL.
//!
//! Used for write-once locks, app memory writes and the nonce index counters. Entries are
//! last-writer-wins; an expired entry reads as absent.

pub mod lock;
pub mod memory;

use crate::foundation::ThresholdError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub use lock::DistributedLock;
pub use memory::InMemorySharedMemory;

pub type Result<T> = std::result::Result<T, ThresholdError>;

#[async_trait]
pub trait SharedMemory: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Writes `value`; `ttl = None` keeps it until deleted.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()>;

    /// Writes `value` only when `key` is absent or expired. Returns whether it was written.
    async fn set_if_absent(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<bool>;

    /// Deletes `key` only while it still holds `expected`.
    async fn delete_if(&self, key: &str, expected: &Value) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Resolves when `key` is released or `timeout` elapses, whichever comes first.
    async fn wait_released(&self, key: &str, timeout: Duration) -> Result<()>;
}
