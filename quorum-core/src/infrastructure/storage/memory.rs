use crate::domain::context::SealedKeyShare;
use crate::domain::{AppContext, AppRequest};
use crate::foundation::ThresholdError;
use crate::foundation::{AppId, RequestId, Seed};
use crate::infrastructure::storage::Storage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct MemoryInner {
    contexts: HashMap<(AppId, Seed), AppContext>,
    key_shares: HashMap<(AppId, Seed), SealedKeyShare>,
    requests: HashMap<RequestId, AppRequest>,
}

pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(MemoryInner::default())) }
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, MemoryInner>, ThresholdError> {
        self.inner.lock().map_err(|_| ThresholdError::StorageError {
            operation: "memory storage lock".to_string(),
            details: "poisoned".to_string(),
        })
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn put_context(&self, context: &AppContext) -> Result<(), ThresholdError> {
        self.lock_inner()?.contexts.insert((context.app_id.clone(), context.seed.clone()), context.clone());
        Ok(())
    }

    fn get_context(&self, app_id: &AppId, seed: &Seed) -> Result<Option<AppContext>, ThresholdError> {
        Ok(self.lock_inner()?.contexts.get(&(app_id.clone(), seed.clone())).cloned())
    }

    fn list_contexts(&self, app_id: &AppId) -> Result<Vec<AppContext>, ThresholdError> {
        let inner = self.lock_inner()?;
        let mut out: Vec<AppContext> = inner.contexts.values().filter(|ctx| &ctx.app_id == app_id).cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.seed.cmp(&b.seed)));
        Ok(out)
    }

    fn list_all_contexts(&self) -> Result<Vec<AppContext>, ThresholdError> {
        let inner = self.lock_inner()?;
        let mut out: Vec<AppContext> = inner.contexts.values().cloned().collect();
        out.sort_by(|a, b| a.app_id.cmp(&b.app_id).then_with(|| a.created_at.cmp(&b.created_at)));
        Ok(out)
    }

    fn insert_key_share(&self, share: &SealedKeyShare) -> Result<bool, ThresholdError> {
        let mut inner = self.lock_inner()?;
        let key = (share.app_id.clone(), share.seed.clone());
        if inner.key_shares.contains_key(&key) {
            return Ok(false);
        }
        inner.key_shares.insert(key, share.clone());
        Ok(true)
    }

    fn get_key_share(&self, app_id: &AppId, seed: &Seed) -> Result<Option<SealedKeyShare>, ThresholdError> {
        Ok(self.lock_inner()?.key_shares.get(&(app_id.clone(), seed.clone())).cloned())
    }

    fn put_request(&self, request: &AppRequest) -> Result<(), ThresholdError> {
        self.lock_inner()?.requests.insert(request.req_id, request.clone());
        Ok(())
    }

    fn get_request(&self, req_id: &RequestId) -> Result<Option<AppRequest>, ThresholdError> {
        Ok(self.lock_inner()?.requests.get(req_id).cloned())
    }

    fn delete_requests_before(&self, cutoff_nanos: u64) -> Result<usize, ThresholdError> {
        let mut inner = self.lock_inner()?;
        let before = inner.requests.len();
        inner.requests.retain(|_, request| request.started_at >= cutoff_nanos);
        Ok(before - inner.requests.len())
    }
}
