//! TTL-bounded mutual exclusion over `SharedMemory`.

use super::SharedMemory;
use crate::foundation::ThresholdError;
use log::{debug, warn};
use rand::RngCore;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone)]
pub struct DistributedLock {
    memory: Arc<dyn SharedMemory>,
    ttl: Duration,
    wait: Duration,
}

impl DistributedLock {
    pub fn new(memory: Arc<dyn SharedMemory>, ttl: Duration, wait: Duration) -> Self {
        Self { memory, ttl, wait }
    }

    /// Runs `critical` while holding `key`, releasing it on every exit path.
    ///
    /// A holder that is cancelled mid-section loses the lock once its TTL lapses.
    pub async fn with_lock<F, T>(&self, key: &str, critical: F) -> Result<T, ThresholdError>
    where
        F: Future<Output = Result<T, ThresholdError>>,
    {
        let token = self.acquire(key).await?;
        let outcome = critical.await;
        if let Err(err) = self.release(key, &token).await {
            warn!("lock release failed key={} error={}", key, err);
        }
        outcome
    }

    async fn acquire(&self, key: &str) -> Result<Value, ThresholdError> {
        let mut raw = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut raw);
        let token = Value::String(hex::encode(raw));
        let started = Instant::now();
        let deadline = started + self.wait;
        loop {
            if self.memory.set_if_absent(key, token.clone(), Some(self.ttl)).await? {
                return Ok(token);
            }
            let now = Instant::now();
            if now >= deadline {
                debug!("lock wait exhausted key={} waited_ms={}", key, (now - started).as_millis());
                return Err(ThresholdError::LockTimeout { key: key.to_string(), waited_ms: (now - started).as_millis() as u64 });
            }
            let slice = (deadline - now).min(self.ttl);
            self.memory.wait_released(key, slice).await?;
        }
    }

    async fn release(&self, key: &str, token: &Value) -> Result<(), ThresholdError> {
        if !self.memory.delete_if(key, token).await? {
            warn!("lock expired before release key={}", key);
        }
        Ok(())
    }
}
