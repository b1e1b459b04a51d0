//! Durable record of contexts and this node's key shares.
//!
//! Reads are open to every component. Writes need a `ContextWriter`, which the repository hands
//! out exactly once; the party manager takes it at start-up so its confirm hooks are the only
//! write path.

use crate::domain::context::{ensure_forward, AppContext, ContextStatus, DeploymentInfo, KeyShare};
use crate::foundation::util::time::now_nanos;
use crate::foundation::{AppId, Seed, ThresholdError};
use crate::infrastructure::keys::ShareSealer;
use crate::infrastructure::storage::Storage;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use subtle::ConstantTimeEq;

static NEXT_REPOSITORY_TAG: AtomicU64 = AtomicU64::new(1);

/// Write capability for one `ContextRepository`.
#[derive(Debug)]
pub struct ContextWriter {
    repository_tag: u64,
}

pub struct ContextRepository {
    storage: Arc<dyn Storage>,
    sealer: ShareSealer,
    tag: u64,
    writer_taken: AtomicBool,
}

impl ContextRepository {
    pub fn new(storage: Arc<dyn Storage>, sealer: ShareSealer) -> Self {
        Self { storage, sealer, tag: NEXT_REPOSITORY_TAG.fetch_add(1, Ordering::Relaxed), writer_taken: AtomicBool::new(false) }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Hands out the write capability; any later call fails.
    pub fn take_writer(&self) -> Result<ContextWriter, ThresholdError> {
        if self.writer_taken.swap(true, Ordering::AcqRel) {
            warn!("context writer requested twice repository_tag={}", self.tag);
            return Err(ThresholdError::RepositoryGuard("context writer already taken".to_string()));
        }
        Ok(ContextWriter { repository_tag: self.tag })
    }

    fn check_writer(&self, writer: &ContextWriter) -> Result<(), ThresholdError> {
        if writer.repository_tag != self.tag {
            return Err(ThresholdError::RepositoryGuard(format!(
                "writer of repository {} used on repository {}",
                writer.repository_tag, self.tag
            )));
        }
        Ok(())
    }

    /// With a seed, returns that context whatever its status. Without one, returns the most
    /// recent signable context of the app (DEPLOYED, or PENDING when `include_pending`).
    pub fn get_context(&self, app_id: &AppId, seed: Option<&Seed>, include_pending: bool) -> Result<Option<AppContext>, ThresholdError> {
        if let Some(seed) = seed {
            return self.storage.get_context(app_id, seed);
        }
        let now = now_nanos();
        let contexts = self.storage.list_contexts(app_id)?;
        Ok(contexts.into_iter().rev().find(|ctx| ctx.is_signable(now, include_pending)))
    }

    pub fn require_context(&self, app_id: &AppId, seed: Option<&Seed>, include_pending: bool) -> Result<AppContext, ThresholdError> {
        self.get_context(app_id, seed, include_pending)?
            .ok_or_else(|| ThresholdError::context_not_found(app_id.as_str(), seed.map(Seed::as_str)))
    }

    /// Status of the most recently created context of `app_id`.
    pub fn get_last_deployment_info(&self, app_id: &AppId) -> Result<DeploymentInfo, ThresholdError> {
        let now = now_nanos();
        let contexts = self.storage.list_contexts(app_id)?;
        let Some(last) = contexts.last() else {
            return Ok(DeploymentInfo { deployed: false, status: None, seed: None });
        };
        let status = last.status_at(now);
        Ok(DeploymentInfo {
            deployed: matches!(status, ContextStatus::Deployed | ContextStatus::Pending),
            status: Some(status),
            seed: Some(last.seed.clone()),
        })
    }

    pub fn list_contexts(&self, app_id: &AppId) -> Result<Vec<AppContext>, ThresholdError> {
        self.storage.list_contexts(app_id)
    }

    pub fn list_all_contexts(&self) -> Result<Vec<AppContext>, ThresholdError> {
        self.storage.list_all_contexts()
    }

    /// Saves `context`, refusing any change that moves it backwards.
    pub fn save(&self, writer: &ContextWriter, context: &AppContext) -> Result<(), ThresholdError> {
        self.check_writer(writer)?;
        let existing = self.storage.get_context(&context.app_id, &context.seed)?;
        if let Some(previous_seed) = &context.previous_seed {
            if existing.is_none() && self.storage.get_context(&context.app_id, previous_seed)?.is_none() {
                return Err(ThresholdError::context_not_found(context.app_id.as_str(), Some(previous_seed.as_str())));
            }
        }
        ensure_forward(existing.as_ref(), context, now_nanos())?;
        self.storage.put_context(context)?;
        info!(
            "context saved app_id={} seed={} status={} partners={}",
            context.app_id,
            context.seed,
            context.status_at(now_nanos()),
            context.party.partners.len()
        );
        Ok(())
    }

    /// Stores this node's share of a context key. Re-saving the same share is a no-op; a
    /// different share for the same seed is rejected.
    pub fn save_key_share(&self, writer: &ContextWriter, share: &KeyShare) -> Result<bool, ThresholdError> {
        self.check_writer(writer)?;
        let sealed = self.sealer.seal(share)?;
        if self.storage.insert_key_share(&sealed)? {
            debug!("key share saved app_id={} seed={} index={}", share.app_id, share.seed, share.index);
            return Ok(true);
        }
        let stored = self.get_key_share(&share.app_id, &share.seed)?.ok_or_else(|| ThresholdError::StorageError {
            operation: "save_key_share".to_string(),
            details: format!("key share {}/{} vanished", share.app_id, share.seed),
        })?;
        let same = stored.index == share.index
            && stored.public_key == share.public_key
            && bool::from(stored.secret_bytes().ct_eq(share.secret_bytes()));
        if !same {
            return Err(ThresholdError::RepositoryGuard(format!("key share {}/{} is immutable", share.app_id, share.seed)));
        }
        Ok(false)
    }

    pub fn get_key_share(&self, app_id: &AppId, seed: &Seed) -> Result<Option<KeyShare>, ThresholdError> {
        match self.storage.get_key_share(app_id, seed)? {
            Some(sealed) => Ok(Some(self.sealer.open(&sealed)?)),
            None => Ok(None),
        }
    }

    pub fn has_key_share(&self, app_id: &AppId, seed: &Seed) -> Result<bool, ThresholdError> {
        Ok(self.storage.get_key_share(app_id, seed)?.is_some())
    }
}
