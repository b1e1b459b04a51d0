use super::RocksStorage;
use crate::domain::context::SealedKeyShare;
use crate::domain::{AppContext, AppRequest};
use crate::foundation::{AppId, RequestId, Seed, ThresholdError};
use crate::infrastructure::storage::rocks::schema::*;
use crate::infrastructure::storage::rocks::util::lock_bounded;
use crate::infrastructure::storage::Storage;
use crate::storage_err;
use log::{debug, trace};
use rocksdb::WriteBatch;

fn by_creation(contexts: &mut [AppContext]) {
    contexts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.seed.cmp(&b.seed)));
}

impl Storage for RocksStorage {
    fn put_context(&self, context: &AppContext) -> Result<(), ThresholdError> {
        trace!("put_context app_id={} seed={}", context.app_id, context.seed);
        let cf = self.cf(CF_CONTEXT)?;
        self.db
            .put_cf(cf, context_key(&context.app_id, &context.seed), Self::to_json(context)?)
            .map_err(|err| storage_err!("rocksdb put context", err))
    }

    fn get_context(&self, app_id: &AppId, seed: &Seed) -> Result<Option<AppContext>, ThresholdError> {
        self.read(CF_CONTEXT, &context_key(app_id, seed), Self::from_json)
    }

    fn list_contexts(&self, app_id: &AppId) -> Result<Vec<AppContext>, ThresholdError> {
        let mut contexts = Vec::new();
        for (_, value) in self.scan_prefix(CF_CONTEXT, &context_prefix(app_id))? {
            let context: AppContext = Self::from_json(&value)?;
            // An app id containing ':' can share another app's prefix.
            if &context.app_id == app_id {
                contexts.push(context);
            }
        }
        by_creation(&mut contexts);
        Ok(contexts)
    }

    fn list_all_contexts(&self) -> Result<Vec<AppContext>, ThresholdError> {
        let mut contexts =
            self.scan_prefix(CF_CONTEXT, PREFIX_CONTEXT)?.iter().map(|(_, value)| Self::from_json(value)).collect::<Result<Vec<AppContext>, _>>()?;
        by_creation(&mut contexts);
        contexts.sort_by(|a, b| a.app_id.cmp(&b.app_id));
        Ok(contexts)
    }

    fn insert_key_share(&self, share: &SealedKeyShare) -> Result<bool, ThresholdError> {
        let _guard = lock_bounded(&self.share_guard, "insert_key_share")?;
        let key = key_share_key(&share.app_id, &share.seed);
        let cf = self.cf(CF_KEY_SHARE)?;
        if self.db.get_cf(cf, &key).map_err(|err| storage_err!("rocksdb get key_share", err))?.is_some() {
            return Ok(false);
        }
        self.db.put_cf(cf, key, Self::to_bincode(share)?).map_err(|err| storage_err!("rocksdb put key_share", err))?;
        debug!("key share stored app_id={} seed={} index={}", share.app_id, share.seed, share.index);
        Ok(true)
    }

    fn get_key_share(&self, app_id: &AppId, seed: &Seed) -> Result<Option<SealedKeyShare>, ThresholdError> {
        self.read(CF_KEY_SHARE, &key_share_key(app_id, seed), Self::from_bincode)
    }

    fn put_request(&self, request: &AppRequest) -> Result<(), ThresholdError> {
        trace!("put_request req_id={:#x} app={} method={}", request.req_id, request.app, request.method);
        let cf = self.cf(CF_REQUEST)?;
        self.db.put_cf(cf, request_key(&request.req_id), Self::to_json(request)?).map_err(|err| storage_err!("rocksdb put request", err))
    }

    fn get_request(&self, req_id: &RequestId) -> Result<Option<AppRequest>, ThresholdError> {
        self.read(CF_REQUEST, &request_key(req_id), Self::from_json)
    }

    fn delete_requests_before(&self, cutoff_nanos: u64) -> Result<usize, ThresholdError> {
        let cf = self.cf(CF_REQUEST)?;
        let mut batch = WriteBatch::default();
        for (key, value) in self.scan_prefix(CF_REQUEST, PREFIX_REQUEST)? {
            let request: AppRequest = Self::from_json(&value)?;
            if request.started_at < cutoff_nanos {
                batch.delete_cf(cf, key);
            }
        }
        let removed = batch.len();
        if removed > 0 {
            self.db.write(batch).map_err(|err| storage_err!("rocksdb prune requests", err))?;
            debug!("requests pruned removed={} cutoff_nanos={}", removed, cutoff_nanos);
        }
        Ok(removed)
    }

    fn health_check(&self) -> Result<(), ThresholdError> {
        self.db.get_cf(self.cf(CF_METADATA)?, SCHEMA_VERSION_KEY).map_err(|err| storage_err!("rocksdb health_check", err))?;
        Ok(())
    }
}
