use crate::domain::{AppContext, AppRequest};
use crate::domain::context::SealedKeyShare;
use crate::foundation::ThresholdError;
use crate::foundation::{AppId, RequestId, Seed};

pub type Result<T> = std::result::Result<T, ThresholdError>;

/// Durable records of a node: contexts, sealed key shares and requests.
///
/// Writes to contexts go through `ContextRepository`, which enforces the single-writer rule; this
/// trait is the raw persistence seam.
pub trait Storage: Send + Sync {
    fn put_context(&self, context: &AppContext) -> Result<()>;
    fn get_context(&self, app_id: &AppId, seed: &Seed) -> Result<Option<AppContext>>;
    fn list_contexts(&self, app_id: &AppId) -> Result<Vec<AppContext>>;
    fn list_all_contexts(&self) -> Result<Vec<AppContext>>;

    /// Insert a key share only if none exists for `(app_id, seed)`.
    /// Returns `Ok(true)` if inserted, `Ok(false)` if it already existed.
    fn insert_key_share(&self, share: &SealedKeyShare) -> Result<bool>;
    fn get_key_share(&self, app_id: &AppId, seed: &Seed) -> Result<Option<SealedKeyShare>>;

    fn put_request(&self, request: &AppRequest) -> Result<()>;
    fn get_request(&self, req_id: &RequestId) -> Result<Option<AppRequest>>;
    /// Drops requests that started before `cutoff_nanos`; returns how many were removed.
    fn delete_requests_before(&self, cutoff_nanos: u64) -> Result<usize>;

    fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
