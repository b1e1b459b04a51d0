//! Pre-agreed signing nonces per `(seed, owner)`.
//!
//! Batches live in process memory. The next free index of a batch is a counter in
//! `SharedMemory`, advanced under a `DistributedLock` so workers sharing the pool never issue
//! the same index twice.

use crate::domain::signing::{NonceBatch, NonceRef, NonceSecret};
use crate::foundation::{DealingId, NodeId, Seed, ThresholdError};
use crate::infrastructure::shared_memory::{DistributedLock, SharedMemory};
use k256::{ProjectivePoint, Scalar};
use log::{debug, info};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct NonceSlot {
    current: Option<DealingId>,
    batches: HashMap<DealingId, NonceBatch>,
}

pub struct NonceStore {
    memory: Arc<dyn SharedMemory>,
    lock: DistributedLock,
    slots: Mutex<HashMap<(Seed, NodeId), NonceSlot>>,
}

impl NonceStore {
    pub fn new(memory: Arc<dyn SharedMemory>, lock: DistributedLock) -> Self {
        Self { memory, lock, slots: Mutex::new(HashMap::new()) }
    }

    fn lock_slots(&self) -> Result<MutexGuard<'_, HashMap<(Seed, NodeId), NonceSlot>>, ThresholdError> {
        self.slots.lock().map_err(|_| ThresholdError::StorageError { operation: "nonce store lock".to_string(), details: "poisoned".to_string() })
    }

    fn counter_key(seed: &Seed, owner: &NodeId, batch: &DealingId) -> String {
        format!("nonce:next:{}:{}:{:x}", seed, owner, batch)
    }

    fn lock_key(seed: &Seed, owner: &NodeId) -> String {
        format!("nonce:lock:{}:{}", seed, owner)
    }

    /// Installs a batch and makes it the one `pick_index` draws from.
    pub fn put(&self, batch: NonceBatch) -> Result<(), ThresholdError> {
        let mut slots = self.lock_slots()?;
        let slot = slots.entry((batch.seed.clone(), batch.owner.clone())).or_default();
        if slot.batches.contains_key(&batch.id) {
            return Err(ThresholdError::ValidationError(format!("nonce batch {:#x} already stored", batch.id)));
        }
        info!("nonce batch stored seed={} owner={} batch={:#x} size={}", batch.seed, batch.owner, batch.id, batch.len());
        slot.current = Some(batch.id);
        slot.batches.insert(batch.id, batch);
        Ok(())
    }

    fn current(&self, seed: &Seed, owner: &NodeId) -> Result<Option<(DealingId, usize)>, ThresholdError> {
        let slots = self.lock_slots()?;
        Ok(slots
            .get(&(seed.clone(), owner.clone()))
            .and_then(|slot| slot.current.and_then(|id| slot.batches.get(&id).map(|batch| (id, batch.len())))))
    }

    async fn issued(&self, seed: &Seed, owner: &NodeId, batch: &DealingId) -> Result<usize, ThresholdError> {
        let value = self.memory.get(&Self::counter_key(seed, owner, batch)).await?;
        Ok(value.and_then(|v| v.as_u64()).unwrap_or(0) as usize)
    }

    /// Whether the current batch still has unissued indices.
    pub async fn has(&self, seed: &Seed, owner: &NodeId) -> Result<bool, ThresholdError> {
        match self.current(seed, owner)? {
            Some((batch, len)) => Ok(self.issued(seed, owner, &batch).await? < len),
            None => Ok(false),
        }
    }

    /// Issues the next index of the current batch, or `None` when it is exhausted or missing.
    pub async fn pick_index(&self, seed: &Seed, owner: &NodeId) -> Result<Option<NonceRef>, ThresholdError> {
        let Some((batch, len)) = self.current(seed, owner)? else {
            return Ok(None);
        };
        let counter = Self::counter_key(seed, owner, &batch);
        let index = self
            .lock
            .with_lock(&Self::lock_key(seed, owner), async {
                let next = self.memory.get(&counter).await?.and_then(|v| v.as_u64()).unwrap_or(0);
                if next as usize >= len {
                    return Ok(None);
                }
                self.memory.set(&counter, Value::from(next + 1), None).await?;
                Ok(Some(next as u32))
            })
            .await?;
        if index.is_none() {
            debug!("nonce batch exhausted seed={} owner={} batch={:#x}", seed, owner, batch);
        }
        Ok(index.map(|index| NonceRef { seed: seed.clone(), owner: owner.clone(), batch, index }))
    }

    /// Group commitments of one slot; `[0]` is the group nonce.
    pub fn get_commitment(&self, nonce: &NonceRef) -> Result<Vec<ProjectivePoint>, ThresholdError> {
        let slots = self.lock_slots()?;
        let batch = Self::batch_of(&slots, nonce)?;
        batch
            .commitments
            .get(nonce.index as usize)
            .cloned()
            .ok_or_else(|| ThresholdError::NonceUnavailable { seed: nonce.seed.to_string(), owner: nonce.owner.to_string() })
    }

    /// Returns the live secret on the first call and `NonceSecret::Used` afterwards.
    pub fn get_nonce(&self, nonce: &NonceRef) -> Result<NonceSecret, ThresholdError> {
        let mut slots = self.lock_slots()?;
        let batch = Self::batch_of_mut(&mut slots, nonce)?;
        batch.take(nonce.index)
    }

    /// Secret nonce share for signing; a second use of the same slot is `NonceReuse`.
    pub fn take_nonce(&self, nonce: &NonceRef) -> Result<Scalar, ThresholdError> {
        let mut slots = self.lock_slots()?;
        let batch = Self::batch_of_mut(&mut slots, nonce)?;
        batch.take_secret(nonce.index)
    }

    /// Forgets every batch of `seed`; returns how many were dropped.
    pub async fn clear_seed(&self, seed: &Seed) -> Result<usize, ThresholdError> {
        let removed: Vec<(NodeId, Vec<DealingId>)> = {
            let mut slots = self.lock_slots()?;
            let keys: Vec<(Seed, NodeId)> = slots.keys().filter(|(s, _)| s == seed).cloned().collect();
            keys.into_iter()
                .filter_map(|key| slots.remove(&key).map(|slot| (key.1, slot.batches.into_keys().collect())))
                .collect()
        };
        let mut count = 0;
        for (owner, batches) in removed {
            for batch in batches {
                self.memory.delete(&Self::counter_key(seed, &owner, &batch)).await?;
                count += 1;
            }
        }
        if count > 0 {
            info!("nonce batches cleared seed={} batches={}", seed, count);
        }
        Ok(count)
    }

    pub fn batch_count(&self, seed: &Seed, owner: &NodeId) -> Result<usize, ThresholdError> {
        Ok(self.lock_slots()?.get(&(seed.clone(), owner.clone())).map_or(0, |slot| slot.batches.len()))
    }

    fn batch_of<'a>(slots: &'a HashMap<(Seed, NodeId), NonceSlot>, nonce: &NonceRef) -> Result<&'a NonceBatch, ThresholdError> {
        slots
            .get(&(nonce.seed.clone(), nonce.owner.clone()))
            .and_then(|slot| slot.batches.get(&nonce.batch))
            .ok_or_else(|| ThresholdError::NonceUnavailable { seed: nonce.seed.to_string(), owner: nonce.owner.to_string() })
    }

    fn batch_of_mut<'a>(
        slots: &'a mut HashMap<(Seed, NodeId), NonceSlot>,
        nonce: &NonceRef,
    ) -> Result<&'a mut NonceBatch, ThresholdError> {
        slots
            .get_mut(&(nonce.seed.clone(), nonce.owner.clone()))
            .and_then(|slot| slot.batches.get_mut(&nonce.batch))
            .ok_or_else(|| ThresholdError::NonceUnavailable { seed: nonce.seed.to_string(), owner: nonce.owner.to_string() })
    }
}
