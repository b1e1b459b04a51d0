//! Partner side of a request: re-execute, sign with the pre-agreed nonce, and apply confirmations.

use crate::application::apps::AppModule;
use crate::application::node::NodeServices;
use crate::domain::app::{sign_hash, ConfirmAudience};
use crate::domain::context::AppContext;
use crate::domain::request::compute_request_id;
use crate::domain::signing::tss::{self, SchnorrSignature};
use crate::domain::AppRequest;
use crate::foundation::util::encoding::parse_hex_32bytes;
use crate::foundation::util::time::now_nanos;
use crate::foundation::{Hash32, NodeId, ThresholdError};
use crate::infrastructure::transport::SignResponse;
use log::{debug, info, warn};
use std::sync::Arc;

pub struct RequestPartner {
    services: Arc<NodeServices>,
}

impl RequestPartner {
    pub fn new(services: Arc<NodeServices>) -> Self {
        Self { services }
    }

    /// Checks that `request` is what its gateway claims: a registered app and method, and a
    /// request id matching its content.
    fn authenticate(&self, from: &NodeId, request: &AppRequest) -> Result<Arc<dyn AppModule>, ThresholdError> {
        if &request.gateway != from {
            return Err(ThresholdError::InvalidPeerIdentity);
        }
        let module = self.services.registry.get(&request.app)?;
        if module.app_id() != request.app_id {
            return Err(ThresholdError::ValidationError(format!("app {} does not have id {}", request.app, request.app_id)));
        }
        module.check_method(&request.method)?;
        let expected =
            compute_request_id(&request.app, &request.method, &request.params, &request.deployment_seed, &request.gateway, request.started_at)?;
        if expected != request.req_id {
            return Err(ThresholdError::ValidationError(format!("request id {:#x} does not match its content", request.req_id)));
        }
        Ok(module)
    }

    fn signing_context(&self, request: &AppRequest) -> Result<AppContext, ThresholdError> {
        let context = self.services.repository.require_context(&request.app_id, Some(&request.deployment_seed), true)?;
        if !context.is_signable(now_nanos(), true) {
            return Err(crate::application::party_manager::invalid_status(&context, now_nanos(), "DEPLOYED or PENDING"));
        }
        Ok(context)
    }

    /// Executes `request` locally and returns this node's partial signature over the result.
    pub async fn sign(&self, from: &NodeId, request: AppRequest) -> Result<SignResponse, ThresholdError> {
        let module = self.authenticate(from, &request)?;
        let nonce = request.nonce.clone().ok_or_else(|| ThresholdError::ValidationError("sign request carries no nonce".to_string()))?;
        if &nonce.owner != from || nonce.seed != request.deployment_seed {
            return Err(ThresholdError::ValidationError(format!("nonce {} does not belong to {}", nonce, from)));
        }
        let context = self.signing_context(&request)?;
        if !context.party.contains(&self.services.node_id) {
            return Err(ThresholdError::ValidationError(format!("{} is not a partner of {}", self.services.node_id, context.key_label())));
        }

        let ctx = self.services.app_context(now_nanos());
        module.validate_request(&ctx, &request).await?;
        let result = module.on_request(&ctx, &request).await?;
        let params = module.sign_params(&request, &result)?;
        let hash = sign_hash(&request.app_id, &request.req_id, &params)?;

        let key_share = self
            .services
            .repository
            .get_key_share(&context.app_id, &context.seed)?
            .ok_or_else(|| ThresholdError::KeyNotFound(format!("key share {}", context.key_label())))?;
        let commitments = self.services.nonces.get_commitment(&nonce)?;
        let group_nonce = commitments.first().ok_or_else(|| ThresholdError::crypto("sign", "empty nonce commitments"))?;
        let challenge = tss::challenge(group_nonce, &context.group_key()?, &hash);
        let secret_nonce = self.services.nonces.take_nonce(&nonce)?;
        let partial = tss::sign_partial(&secret_nonce, &key_share.scalar()?, &challenge);
        debug!("partial signed req_id={:#x} app={} method={} nonce={}", request.req_id, request.app, request.method, nonce);
        Ok(SignResponse { hash: hex::encode(hash), result, partial: tss::scalar_hex(&partial) })
    }

    /// Verifies a confirmed request's group signature and runs the confirm hooks once.
    pub async fn confirm(&self, from: &NodeId, request: AppRequest) -> Result<(), ThresholdError> {
        let module = self.authenticate(from, &request)?;
        if request.confirmed_at.is_none() {
            return Err(ThresholdError::ValidationError(format!("request {:#x} is not confirmed", request.req_id)));
        }
        let context = self.services.repository.require_context(&request.app_id, Some(&request.deployment_seed), true)?;
        if module.audience() == ConfirmAudience::Party && !context.party.contains(&self.services.node_id) {
            return Err(ThresholdError::ValidationError(format!("{} is outside the audience of {:#x}", self.services.node_id, request.req_id)));
        }
        let hash = verify_confirmed(module.as_ref(), &context, &request)?;
        if request.signatures.iter().all(|signature| &signature.owner != from) {
            return Err(ThresholdError::InvalidPeerIdentity);
        }
        if let Some(stored) = self.services.repository.storage().get_request(&request.req_id)? {
            if stored.is_confirmed() {
                debug!("confirm already applied req_id={:#x}", request.req_id);
                return Ok(());
            }
        }
        apply_confirm_hooks(&self.services, module.as_ref(), &request).await?;
        self.services.repository.storage().put_request(&request)?;
        info!("request confirmation applied req_id={:#x} app={} method={} hash={}", request.req_id, request.app, request.method, hex::encode(hash));
        Ok(())
    }
}

/// Recomputes the signed digest from the confirmed result and checks the group signature on it.
pub fn verify_confirmed(module: &dyn AppModule, context: &AppContext, request: &AppRequest) -> Result<Hash32, ThresholdError> {
    let params = module.sign_params(request, &request.data.result)?;
    let hash = sign_hash(&request.app_id, &request.req_id, &params)?;
    let claimed = request.data.hash.as_deref().map(parse_hex_32bytes).transpose()?;
    if claimed != Some(hash) {
        return Err(ThresholdError::ValidationError(format!("request {:#x} hash does not match its result", request.req_id)));
    }
    let group_key = context.group_key()?;
    let signature = request.signatures.first().ok_or_else(|| ThresholdError::ValidationError("confirmed request carries no signature".to_string()))?;
    let signature = SchnorrSignature { nonce: tss::point_from_hex(&signature.nonce)?, s: tss::scalar_from_hex(&signature.signature)? };
    if !signature.verify(&group_key, &hash) {
        warn!("group signature rejected req_id={:#x} key={}", request.req_id, context.key_label());
        return Err(ThresholdError::SignatureVerificationFailed);
    }
    Ok(hash)
}

/// `on_confirm`, then the app's shared-memory writes.
pub(crate) async fn apply_confirm_hooks(services: &NodeServices, module: &dyn AppModule, request: &AppRequest) -> Result<(), ThresholdError> {
    let ctx = services.app_context(now_nanos());
    module.on_confirm(&ctx, request).await?;
    for write in module.on_mem_write(request)? {
        debug!("memory write req_id={:#x} key={} ttl={:?}", request.req_id, write.key, write.ttl);
        services.memory.set(&write.key, write.data, write.ttl).await?;
    }
    Ok(())
}
