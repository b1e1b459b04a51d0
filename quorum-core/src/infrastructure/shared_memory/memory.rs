use super::{Result, SharedMemory};
use crate::foundation::ThresholdError;
use async_trait::async_trait;
use log::trace;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    waiters: HashMap<String, Arc<Notify>>,
}

/// `SharedMemory` for a single process.
///
/// A release wakes one waiter of the key (or leaves a permit when none is waiting); TTL expiry
/// wakes nobody, so waiters bound each wait and re-check.
#[derive(Default)]
pub struct InMemorySharedMemory {
    inner: Mutex<Inner>,
}

impl InMemorySharedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| ThresholdError::StorageError {
            operation: "shared memory lock".to_string(),
            details: "poisoned".to_string(),
        })
    }

    fn waiter(inner: &mut Inner, key: &str) -> Arc<Notify> {
        inner.waiters.entry(key.to_string()).or_insert_with(|| Arc::new(Notify::new())).clone()
    }

    fn wake(inner: &Inner, key: &str) {
        if let Some(notify) = inner.waiters.get(key) {
            notify.notify_one();
        }
    }

    /// Drops expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let mut inner = self.lock_inner()?;
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.is_live(now));
        let removed = before - inner.entries.len();
        let Inner { entries, waiters } = &mut *inner;
        waiters.retain(|key, notify| entries.contains_key(key) || Arc::strong_count(notify) > 1);
        Ok(removed)
    }
}

#[async_trait]
impl SharedMemory for InMemorySharedMemory {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = Instant::now();
        let inner = self.lock_inner()?;
        Ok(inner.entries.get(key).filter(|entry| entry.is_live(now)).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.lock_inner()?.entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
        let now = Instant::now();
        let mut inner = self.lock_inner()?;
        if inner.entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        inner.entries.insert(key.to_string(), Entry { value, expires_at: ttl.map(|ttl| now + ttl) });
        Ok(true)
    }

    async fn delete_if(&self, key: &str, expected: &Value) -> Result<bool> {
        let now = Instant::now();
        let mut inner = self.lock_inner()?;
        let matches = inner.entries.get(key).is_some_and(|entry| entry.is_live(now) && &entry.value == expected);
        if !matches {
            trace!("shared memory delete_if skipped key={}", key);
            return Ok(false);
        }
        inner.entries.remove(key);
        Self::wake(&inner, key);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.lock_inner()?;
        if inner.entries.remove(key).is_some() {
            Self::wake(&inner, key);
        }
        Ok(())
    }

    async fn wait_released(&self, key: &str, timeout: Duration) -> Result<()> {
        let notify = {
            let now = Instant::now();
            let mut inner = self.lock_inner()?;
            if !inner.entries.get(key).is_some_and(|entry| entry.is_live(now)) {
                return Ok(());
            }
            Self::waiter(&mut inner, key)
        };
        let _ = tokio::time::timeout(timeout, notify.notified()).await;
        Ok(())
    }
}
