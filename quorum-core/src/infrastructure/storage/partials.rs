//! Per-request accumulator of accepted partner partials.

use crate::foundation::util::time::now_nanos;
use crate::foundation::{Hash32, NodeId, RequestId, ThresholdError};
use k256::Scalar;
use log::{debug, trace};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// One partner's accepted contribution to a request.
#[derive(Clone, Debug)]
pub struct PartialResult {
    pub owner: NodeId,
    /// Share index of `owner` in the signing party.
    pub index: u32,
    pub hash: Hash32,
    pub result: Value,
    pub partial: Scalar,
}

struct Bucket {
    created_at: u64,
    entries: Vec<PartialResult>,
}

pub struct PartialResultStore {
    buckets: Mutex<HashMap<RequestId, Bucket>>,
}

impl Default for PartialResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialResultStore {
    pub fn new() -> Self {
        Self { buckets: Mutex::new(HashMap::new()) }
    }

    fn lock_buckets(&self) -> Result<MutexGuard<'_, HashMap<RequestId, Bucket>>, ThresholdError> {
        self.buckets.lock().map_err(|_| ThresholdError::StorageError { operation: "partial store lock".to_string(), details: "poisoned".to_string() })
    }

    /// Records `partial`; returns `false` when its owner already contributed to `req_id`.
    pub fn record(&self, req_id: &RequestId, partial: PartialResult) -> Result<bool, ThresholdError> {
        let mut buckets = self.lock_buckets()?;
        let bucket = buckets.entry(*req_id).or_insert_with(|| Bucket { created_at: now_nanos(), entries: Vec::new() });
        if bucket.entries.iter().any(|entry| entry.owner == partial.owner) {
            debug!("duplicate partial ignored req_id={:#x} owner={}", req_id, partial.owner);
            return Ok(false);
        }
        trace!("partial recorded req_id={:#x} owner={} index={}", req_id, partial.owner, partial.index);
        bucket.entries.push(partial);
        Ok(true)
    }

    pub fn count(&self, req_id: &RequestId) -> Result<usize, ThresholdError> {
        Ok(self.lock_buckets()?.get(req_id).map_or(0, |bucket| bucket.entries.len()))
    }

    /// Accepted partials in arrival order.
    pub fn list(&self, req_id: &RequestId) -> Result<Vec<PartialResult>, ThresholdError> {
        Ok(self.lock_buckets()?.get(req_id).map(|bucket| bucket.entries.clone()).unwrap_or_default())
    }

    pub fn remove(&self, req_id: &RequestId) -> Result<(), ThresholdError> {
        self.lock_buckets()?.remove(req_id);
        Ok(())
    }

    /// Drops buckets older than `max_age_nanos`; returns how many were dropped.
    pub fn purge_older_than(&self, max_age_nanos: u64, now: u64) -> Result<usize, ThresholdError> {
        let mut buckets = self.lock_buckets()?;
        let before = buckets.len();
        buckets.retain(|_, bucket| now.saturating_sub(bucket.created_at) < max_age_nanos);
        Ok(before - buckets.len())
    }
}
