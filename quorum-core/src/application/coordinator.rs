//! Request coordinator: runs a request locally, collects partner partials, decides quorum and
//! publishes the confirmed request.

use crate::application::apps::AppModule;
use crate::application::node::NodeServices;
use crate::application::partner::apply_confirm_hooks;
use crate::domain::app::{sign_hash, ConfirmAudience};
use crate::domain::context::AppContext;
use crate::domain::quorum::{quorum_reached, QuorumCheck};
use crate::domain::request::{compute_request_id, RequestData, RequestMode, RequestProgress, RequestSignature, RequestStatus};
use crate::domain::signing::tss::{self, SchnorrSignature};
use crate::domain::signing::NonceRef;
use crate::domain::AppRequest;
use crate::foundation::util::encoding::parse_hex_32bytes;
use crate::foundation::util::time::now_nanos;
use crate::foundation::{NodeId, RequestId, Seed, ThresholdError};
use crate::infrastructure::rpc::{gather, TimeoutPolicy};
use crate::infrastructure::storage::PartialResult;
use crate::infrastructure::transport::{NodeCall, NodeReply};
use k256::Scalar;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// A request as submitted by a gateway or the scheduler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub app: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub mode: RequestMode,
    /// Signs with this context instead of the app's latest one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<Seed>,
    /// Accepted for compatibility; one signature is produced per request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_sign: Option<u32>,
}

impl Submission {
    pub fn new(app: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self { app: app.into(), method: method.into(), params, mode: RequestMode::Sign, seed: None, n_sign: None }
    }

    pub fn view(mut self) -> Self {
        self.mode = RequestMode::View;
        self
    }
}

pub struct RequestCoordinator {
    services: Arc<NodeServices>,
}

impl RequestCoordinator {
    pub fn new(services: Arc<NodeServices>) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &Arc<NodeServices> {
        &self.services
    }

    /// Runs `submission` to a terminal state. A signed request is returned only once confirmed;
    /// every failure surfaces as an error and nothing is retried.
    pub async fn submit(&self, submission: Submission) -> Result<AppRequest, ThresholdError> {
        let started = Instant::now();
        let services = &self.services;
        let module = services.registry.get(&submission.app)?;
        module.check_method(&submission.method)?;
        if let Some(n_sign) = submission.n_sign {
            debug!("nSign ignored app={} n_sign={}", submission.app, n_sign);
        }
        let app_id = module.app_id();
        let context = services.repository.require_context(&app_id, submission.seed.as_ref(), true)?;
        let started_at = now_nanos();
        let req_id = compute_request_id(&submission.app, &submission.method, &submission.params, &context.seed, &services.node_id, started_at)?;
        let mut request = AppRequest {
            req_id,
            app: submission.app,
            app_id,
            method: submission.method,
            params: submission.params,
            deployment_seed: context.seed.clone(),
            gateway: services.node_id.clone(),
            started_at,
            confirmed_at: None,
            data: RequestData::default(),
            nonce: None,
            signatures: Vec::new(),
        };
        services.observer.on_request_arrived(&req_id, &request.app, &request.method);
        info!(
            "request arrived req_id={:#x} app={} method={} mode={:?} seed={}",
            req_id, request.app, request.method, submission.mode, context.seed
        );

        let mut progress = RequestProgress::new(req_id);
        let outcome = match self.arrive(module.as_ref(), &context, &mut request, submission.mode, &mut progress).await {
            Ok(()) => self.run(module.as_ref(), &context, &mut request, submission.mode, &mut progress).await.map_err(|err| (err, true)),
            Err(err) => Err((err, false)),
        };
        if let Err(err) = services.partials.remove(&req_id) {
            warn!("partials not released req_id={:#x} error={}", req_id, err);
        }
        match outcome {
            Ok(()) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let signers = request.signatures.first().map(|s| s.signers.clone()).unwrap_or_default();
                services.observer.on_confirmed(&req_id, &signers, elapsed_ms);
                if submission.mode == RequestMode::Sign {
                    self.publish(module.as_ref(), &context, &request).await;
                    services.repository.storage().put_request(&request)?;
                }
                Ok(request)
            }
            Err((err, arrived)) => {
                let status = progress.fail(matches!(err, ThresholdError::QuorumTimeout { .. }));
                services.observer.on_failed(&req_id, status, &err.to_string());
                warn!("request failed req_id={:#x} status={} error={}", req_id, status, err);
                if submission.mode == RequestMode::Sign {
                    if let Err(hook_err) = module.on_failed(&services.app_context(now_nanos()), &request).await {
                        warn!("failure hook failed req_id={:#x} error={}", req_id, hook_err);
                    }
                    // Requests rejected before on_arrive completed never reached partners.
                    if arrived {
                        if let Err(store_err) = services.repository.storage().put_request(&request) {
                            warn!("failed request not persisted req_id={:#x} error={}", req_id, store_err);
                        }
                    }
                }
                Err(err)
            }
        }
    }

    fn advance(&self, progress: &mut RequestProgress, req_id: &RequestId, to: RequestStatus) -> Result<(), ThresholdError> {
        let from = progress.advance(to)?;
        if from != to {
            self.services.observer.on_status_changed(req_id, from, to);
        }
        Ok(())
    }

    /// Signability, validation and the coordinator-only `on_arrive` step.
    async fn arrive(
        &self,
        module: &dyn AppModule,
        context: &AppContext,
        request: &mut AppRequest,
        mode: RequestMode,
        progress: &mut RequestProgress,
    ) -> Result<(), ThresholdError> {
        let services = &self.services;
        let req_id = request.req_id;
        if mode == RequestMode::Sign && !context.is_signable(now_nanos(), true) {
            return Err(crate::application::party_manager::invalid_status(context, now_nanos(), "DEPLOYED or PENDING"));
        }

        self.advance(progress, &req_id, RequestStatus::Validating)?;
        let ctx = services.app_context(now_nanos());
        module.validate_request(&ctx, request).await?;

        self.advance(progress, &req_id, RequestStatus::Executing)?;
        request.data.init = module.on_arrive(&ctx, request).await?;
        Ok(())
    }

    async fn run(
        &self,
        module: &dyn AppModule,
        context: &AppContext,
        request: &mut AppRequest,
        mode: RequestMode,
        progress: &mut RequestProgress,
    ) -> Result<(), ThresholdError> {
        let services = &self.services;
        let req_id = request.req_id;
        let ctx = services.app_context(now_nanos());
        let result = module.on_request(&ctx, request).await?;
        let params = module.sign_params(request, &result)?;
        let hash = sign_hash(&request.app_id, &request.req_id, &params)?;
        request.data.result = result;
        request.data.sign_params = params;
        request.data.hash = Some(hex::encode(hash));
        if mode == RequestMode::View {
            self.advance(progress, &req_id, RequestStatus::Confirmed)?;
            return Ok(());
        }

        let nonce = self.reserve_nonce(context).await?;
        let nonce_commitments = services.nonces.get_commitment(&nonce)?;
        request.nonce = Some(nonce.clone());
        let check = QuorumCheck::new(context, hash, &nonce_commitments)?;
        let required = check.required();

        self.advance(progress, &req_id, RequestStatus::AwaitingPartners)?;
        if let Some(index) = context.party.index_of(&services.node_id) {
            let partial = self.local_partial(context, &nonce, &check)?;
            services.partials.record(
                &req_id,
                PartialResult { owner: services.node_id.clone(), index, hash, result: request.data.result.clone(), partial },
            )?;
        }
        let local = services.partials.count(&req_id)?;
        let want = required.saturating_sub(local);
        let outbound = request.for_partner();
        let outbound_ref = &outbound;
        let check_ref = &check;
        let remote: Vec<NodeId> = context.party.partners.iter().filter(|p| **p != services.node_id).cloned().collect();
        let calls = remote
            .iter()
            .map(|partner| (partner.clone(), async move { self.ask_partner(partner, outbound_ref, check_ref).await }))
            .collect();
        debug!("fan-out req_id={:#x} partners={} want={} local={}", req_id, remote.len(), want, local);
        let gathered = match gather(calls, want, services.settings.request_timeout, TimeoutPolicy::Reject).await {
            Ok(gathered) => gathered,
            Err(ThresholdError::QuorumTimeout { received, failures, .. }) => {
                return Err(ThresholdError::QuorumTimeout { required, received: received + local, failures });
            }
            Err(err) => return Err(err),
        };
        for failure in &gathered.failures {
            debug!("partner failed req_id={:#x} partner={} reason={}", req_id, failure.partner, failure.reason);
        }

        self.advance(progress, &req_id, RequestStatus::QuorumCheck)?;
        let accepted = services.partials.list(&req_id)?;
        if !quorum_reached(accepted.len(), required) {
            return Err(ThresholdError::QuorumTimeout { required, received: accepted.len(), failures: gathered.failures });
        }
        let signers: Vec<&PartialResult> = accepted.iter().take(required).collect();
        let shares: Vec<(u32, Scalar)> = signers.iter().map(|p| (p.index, p.partial)).collect();
        let group_nonce = nonce_commitments[0];
        let signature = SchnorrSignature { nonce: group_nonce, s: tss::aggregate(&shares)? };
        let group_key = context.group_key()?;
        if !signature.verify(&group_key, &hash) {
            return Err(ThresholdError::crypto("aggregate", format!("group signature of {:#x} does not verify", req_id)));
        }

        request.signatures.push(RequestSignature {
            owner: services.node_id.clone(),
            signers: signers.iter().map(|p| p.owner.clone()).collect(),
            public_key: tss::point_hex(&group_key),
            nonce: tss::point_hex(&group_nonce),
            signature: tss::scalar_hex(&signature.s),
        });
        request.confirmed_at = Some(now_nanos());
        self.advance(progress, &req_id, RequestStatus::Confirmed)?;
        Ok(())
    }

    /// Next free nonce of this node for `context`, dealing a fresh batch when none is left.
    async fn reserve_nonce(&self, context: &AppContext) -> Result<NonceRef, ThresholdError> {
        let services = &self.services;
        if let Some(nonce) = services.nonces.pick_index(&context.seed, &services.node_id).await? {
            return Ok(nonce);
        }
        services.parties.ensure_nonce_batch(context, services.settings.nonce_batch_size).await?;
        services
            .nonces
            .pick_index(&context.seed, &services.node_id)
            .await?
            .ok_or_else(|| ThresholdError::NonceUnavailable { seed: context.seed.to_string(), owner: services.node_id.to_string() })
    }

    fn local_partial(&self, context: &AppContext, nonce: &NonceRef, check: &QuorumCheck<'_>) -> Result<Scalar, ThresholdError> {
        let services = &self.services;
        let key_share = services
            .repository
            .get_key_share(&context.app_id, &context.seed)?
            .ok_or_else(|| ThresholdError::KeyNotFound(format!("key share {}", context.key_label())))?;
        let secret_nonce = services.nonces.take_nonce(nonce)?;
        let partial = tss::sign_partial(&secret_nonce, &key_share.scalar()?, &check.challenge);
        check.check(&services.node_id, &check.expected_hash, &partial)?;
        Ok(partial)
    }

    /// One partner round trip; the partial counts only after it passes `check`.
    async fn ask_partner(&self, partner: &NodeId, request: &AppRequest, check: &QuorumCheck<'_>) -> Result<u32, ThresholdError> {
        let services = &self.services;
        let reply = services.transport.call(partner, NodeCall::Sign { request: request.clone() }, services.settings.partner_call_timeout).await?;
        let NodeReply::Signed(response) = reply else {
            return Err(ThresholdError::transport("sign", format!("unexpected reply {} from {}", reply.name(), partner)));
        };
        let verdict = parse_hex_32bytes(&response.hash)
            .and_then(|hash| tss::scalar_from_hex(&response.partial).map(|partial| (hash, partial)))
            .and_then(|(hash, partial)| check.check(partner, &hash, &partial).map(|index| (hash, partial, index)));
        let (hash, partial, index) = match verdict {
            Ok(accepted) => accepted,
            Err(err) => {
                services.observer.on_partial_rejected(&request.req_id, partner, &err.to_string());
                return Err(err);
            }
        };
        let recorded = services
            .partials
            .record(&request.req_id, PartialResult { owner: partner.clone(), index, hash, result: response.result, partial })?;
        if !recorded {
            return Err(ThresholdError::SignatureMismatch { partner: partner.to_string(), details: "duplicate partial".to_string() });
        }
        services.observer.on_partial_accepted(&request.req_id, partner);
        Ok(index)
    }

    /// Runs the confirm hooks here when this node is in the audience and sends the confirmed
    /// request to the rest of it. Delivery is best effort.
    async fn publish(&self, module: &dyn AppModule, context: &AppContext, request: &AppRequest) {
        let services = &self.services;
        let audience: &[NodeId] = match module.audience() {
            ConfirmAudience::Party => &context.party.partners,
            ConfirmAudience::Network => &services.network,
        };
        if audience.contains(&services.node_id) {
            if let Err(err) = apply_confirm_hooks(services, module, request).await {
                warn!("local confirm hooks failed req_id={:#x} error={}", request.req_id, err);
            }
        }
        let others: Vec<NodeId> = audience.iter().filter(|n| **n != services.node_id).cloned().collect();
        let calls = others
            .iter()
            .map(|peer| {
                (peer.clone(), async move {
                    services.transport.call(peer, NodeCall::Confirm { request: request.clone() }, services.settings.partner_call_timeout).await
                })
            })
            .collect();
        match gather(calls, others.len(), services.settings.partner_call_timeout, TimeoutPolicy::ResolvePartial).await {
            Ok(acks) => {
                for failure in &acks.failures {
                    warn!("confirm delivery failed req_id={:#x} peer={} reason={}", request.req_id, failure.partner, failure.reason);
                }
                debug!("confirm published req_id={:#x} acks={}/{}", request.req_id, acks.values.len(), others.len());
            }
            Err(err) => warn!("confirm publish failed req_id={:#x} error={}", request.req_id, err),
        }
    }
}
