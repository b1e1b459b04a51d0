//! TSS party manager: dealing rounds, key installation and the only context write path.
//!
//! The manager plays three roles in a dealing round. As owner it asks the dealers for their
//! commitments and tells every recipient to finalize. As dealer it samples the secret polynomials
//! and hands each recipient its shares. As recipient it pulls, verifies and sums the shares, then
//! installs the result: genesis keys immediately, key-gen and reshare shares once the request that
//! announces them is confirmed, nonce batches into the `NonceStore`.

use crate::application::lifecycle::{LifecycleObserver, NoopObserver};
use crate::domain::context::{AppContext, ContextStatus, KeyShare, Party};
use crate::domain::signing::dealing::{combine_commitments, dealing_id, sum_shares, verify_dealer_shares};
use crate::domain::signing::tss::{self, GroupPublicKey};
use crate::domain::signing::{DealerCommitments, Dealing, DealingKind, DealingPlan, NonceBatch};
use crate::domain::AppRequest;
use crate::foundation::util::time::now_nanos;
use crate::foundation::{
    AppId, DealingId, NodeId, RequestId, Seed, ThresholdError, DEPLOYMENT_APP_ID, DEPLOYMENT_APP_NAME, GENESIS_SEED,
    MAX_NONCE_BATCH_SIZE,
};
use crate::infrastructure::rpc::{gather, TimeoutPolicy};
use crate::infrastructure::storage::{ContextRepository, ContextWriter, NonceStore};
use crate::infrastructure::transport::{DealerShares, FinalizeReceipt, NodeCall, NodeReply, PeerTransport, ShareStatus};
use k256::{ProjectivePoint, Scalar};
use log::{debug, info, warn};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use zeroize::Zeroizing;

/// Outcome of a key dealing, forwarded to partners as `data.init`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DkgInit {
    pub dkg_id: DealingId,
    pub dealers: Vec<NodeId>,
    pub commitments: Vec<DealerCommitments>,
}

impl DkgInit {
    pub fn from_request(request: &AppRequest) -> Result<Self, ThresholdError> {
        let init = request.data.init.as_ref().ok_or_else(|| ThresholdError::ValidationError("request carries no dealing init".to_string()))?;
        serde_json::from_value(init.clone()).map_err(|err| ThresholdError::ValidationError(format!("invalid dealing init: {}", err)))
    }

    pub fn to_value(&self) -> Result<Value, ThresholdError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Each dealer's commitments to its single dealt secret, in dealer order.
    pub fn dealer_polynomials(&self, threshold: u16) -> Result<Vec<Vec<ProjectivePoint>>, ThresholdError> {
        if self.dealers.len() != self.commitments.len() || self.dealers.is_empty() {
            return Err(ThresholdError::crypto("dkg_init", format!("{} dealers with {} commitment sets", self.dealers.len(), self.commitments.len())));
        }
        let mut out = Vec::with_capacity(self.dealers.len());
        for (dealer, set) in self.dealers.iter().zip(&self.commitments) {
            if &set.dealer != dealer {
                return Err(ThresholdError::crypto("dkg_init", format!("commitments of {} listed under {}", set.dealer, dealer)));
            }
            let [single] = set.commitments.as_slice() else {
                return Err(ThresholdError::crypto("dkg_init", format!("dealer {} committed {} secrets", dealer, set.commitments.len())));
            };
            if single.len() != usize::from(threshold) {
                return Err(ThresholdError::crypto("dkg_init", format!("dealer {} polynomial degree mismatch", dealer)));
            }
            out.push(tss::commitments_from_hex(single)?);
        }
        Ok(out)
    }

    /// Group commitments of the dealt key; `[0]` is the group public key.
    pub fn group_commitments(&self, threshold: u16) -> Result<Vec<ProjectivePoint>, ThresholdError> {
        let sets: Vec<Vec<Vec<ProjectivePoint>>> = self.dealer_polynomials(threshold)?.into_iter().map(|p| vec![p]).collect();
        combine_commitments(&sets)?.into_iter().next().ok_or_else(|| ThresholdError::crypto("dkg_init", "no secrets"))
    }
}

/// Checks that reshare dealers deal `lambda_i * x_i` and that their sum is the previous group key.
pub fn verify_reshare_constants(previous: &AppContext, dealers: &[NodeId], constants: &[ProjectivePoint]) -> Result<(), ThresholdError> {
    if dealers.len() != constants.len() {
        return Err(ThresholdError::crypto("reshare", format!("{} dealers with {} constants", dealers.len(), constants.len())));
    }
    if dealers.len() < previous.party.threshold() {
        return Err(ThresholdError::crypto("reshare", format!("{} dealers below previous threshold {}", dealers.len(), previous.party.t)));
    }
    let indices = dealers
        .iter()
        .map(|dealer| {
            previous
                .party
                .index_of(dealer)
                .ok_or_else(|| ThresholdError::crypto("reshare", format!("dealer {} is not a partner of {}", dealer, previous.key_label())))
        })
        .collect::<Result<Vec<u32>, ThresholdError>>()?;
    let old_commitments = previous.decoded_commitments()?;
    let mut total = ProjectivePoint::IDENTITY;
    for ((dealer, index), constant) in dealers.iter().zip(&indices).zip(constants) {
        let expected = tss::evaluate_commitments(&old_commitments, *index) * tss::lagrange_coefficient(*index, &indices)?;
        if expected != *constant {
            return Err(ThresholdError::crypto("reshare", format!("dealer {} does not deal its weighted share", dealer)));
        }
        total += constant;
    }
    if total != previous.group_key()? {
        return Err(ThresholdError::crypto("reshare", "dealt key differs from the previous group key"));
    }
    Ok(())
}

/// Result of a completed dealing as seen by its owner.
pub struct DealingOutcome {
    /// The plan as finalized: `dealers` lists only dealers that committed.
    pub plan: DealingPlan,
    pub commitments: Vec<DealerCommitments>,
    pub group: Vec<Vec<ProjectivePoint>>,
    pub finalized: Vec<NodeId>,
}

impl DealingOutcome {
    pub fn init(&self) -> DkgInit {
        DkgInit { dkg_id: self.plan.id, dealers: self.plan.dealers.clone(), commitments: self.commitments.clone() }
    }
}

struct DealerState {
    plan: DealingPlan,
    dealing: Dealing,
    commitments: DealerCommitments,
    created_at: u64,
}

struct PendingKey {
    plan: DealingPlan,
    index: u32,
    share: Zeroizing<[u8; 32]>,
    commitments: Vec<String>,
    created_at: u64,
}

pub struct PartyManager {
    node_id: NodeId,
    deployers: Vec<NodeId>,
    repository: Arc<ContextRepository>,
    writer: ContextWriter,
    nonces: Arc<NonceStore>,
    transport: Arc<dyn PeerTransport>,
    observer: Arc<dyn LifecycleObserver>,
    dkg_timeout: Duration,
    dealings: Mutex<HashMap<DealingId, DealerState>>,
    pending: Mutex<HashMap<DealingId, PendingKey>>,
    batch_guard: tokio::sync::Mutex<()>,
}

impl PartyManager {
    /// Takes the repository's writer; a second manager over the same repository fails.
    pub fn new(
        node_id: NodeId,
        deployers: Vec<NodeId>,
        repository: Arc<ContextRepository>,
        nonces: Arc<NonceStore>,
        transport: Arc<dyn PeerTransport>,
        dkg_timeout: Duration,
    ) -> Result<Self, ThresholdError> {
        let writer = repository.take_writer()?;
        Ok(Self {
            node_id,
            deployers,
            repository,
            writer,
            nonces,
            transport,
            observer: Arc::new(NoopObserver),
            dkg_timeout,
            dealings: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            batch_guard: tokio::sync::Mutex::new(()),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn deployers(&self) -> &[NodeId] {
        &self.deployers
    }

    pub fn repository(&self) -> &Arc<ContextRepository> {
        &self.repository
    }

    pub fn nonces(&self) -> &Arc<NonceStore> {
        &self.nonces
    }

    fn lock_dealings(&self) -> Result<MutexGuard<'_, HashMap<DealingId, DealerState>>, ThresholdError> {
        self.dealings.lock().map_err(|_| crate::storage_err!("dealer state lock", "poisoned"))
    }

    fn lock_pending(&self) -> Result<MutexGuard<'_, HashMap<DealingId, PendingKey>>, ThresholdError> {
        self.pending.lock().map_err(|_| crate::storage_err!("pending key lock", "poisoned"))
    }

    fn save_context(&self, context: &AppContext) -> Result<(), ThresholdError> {
        self.repository.save(&self.writer, context)?;
        self.observer.on_context_saved(context);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn new_plan(
        &self,
        kind: DealingKind,
        app_id: AppId,
        seed: Seed,
        dealers: Vec<NodeId>,
        recipients: Vec<NodeId>,
        threshold: u16,
        count: u32,
    ) -> DealingPlan {
        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        let id = dealing_id(&kind, &app_id, &seed, &self.node_id, now_nanos(), &salt);
        DealingPlan { id, kind, app_id, seed, owner: self.node_id.clone(), dealers, recipients, threshold, count }
    }

    // === Owner ===

    /// Drives `plan` to completion: collect commitments, then have every recipient finalize.
    ///
    /// With `require_all_dealers` every listed dealer must commit; otherwise `threshold` dealers
    /// suffice and the finalized plan lists only those that answered.
    pub async fn run_dealing(&self, plan: DealingPlan, require_all_dealers: bool) -> Result<DealingOutcome, ThresholdError> {
        plan.validate()?;
        info!(
            "dealing started dealing={:#x} kind={} app_id={} seed={} dealers={} recipients={} count={}",
            plan.id,
            plan.kind.as_str(),
            plan.app_id,
            plan.seed,
            plan.dealers.len(),
            plan.recipients.len(),
            plan.count
        );
        let threshold = usize::from(plan.threshold);
        let plan_ref = &plan;
        let calls = plan
            .dealers
            .iter()
            .map(|dealer| {
                (dealer.clone(), async move {
                    let commitments = self.request_deal(dealer, plan_ref).await?;
                    if &commitments.dealer != dealer {
                        return Err(ThresholdError::InvalidPeerIdentity);
                    }
                    let decoded = commitments.decode(plan_ref)?;
                    Ok((commitments, decoded))
                })
            })
            .collect();
        let gathered = gather(calls, plan.dealers.len(), self.dkg_timeout, TimeoutPolicy::ResolvePartial).await?;

        let mut answered: HashMap<NodeId, (DealerCommitments, Vec<Vec<ProjectivePoint>>)> = gathered.values.into_iter().collect();
        let mut dealers = Vec::new();
        let mut commitments = Vec::new();
        let mut sets = Vec::new();
        for dealer in &plan.dealers {
            if let Some((committed, decoded)) = answered.remove(dealer) {
                dealers.push(dealer.clone());
                commitments.push(committed);
                sets.push(decoded);
            }
        }
        let required = if require_all_dealers { plan.dealers.len() } else { threshold };
        if dealers.len() < required {
            warn!("dealing lacks dealers dealing={:#x} required={} committed={}", plan.id, required, dealers.len());
            return Err(ThresholdError::QuorumTimeout { required, received: dealers.len(), failures: gathered.failures });
        }
        let group = combine_commitments(&sets)?;
        let plan = DealingPlan { dealers, ..plan };

        let plan_ref = &plan;
        let commitments_ref = &commitments;
        let calls = plan
            .recipients
            .iter()
            .map(|recipient| {
                (recipient.clone(), async move {
                    let receipt = self.request_finalize(recipient, plan_ref, commitments_ref).await?;
                    if &receipt.recipient != recipient || receipt.dealing != plan_ref.id {
                        return Err(ThresholdError::InvalidPeerIdentity);
                    }
                    Ok(receipt.index)
                })
            })
            .collect();
        let gathered = gather(calls, plan.recipients.len(), self.dkg_timeout * 2, TimeoutPolicy::ResolvePartial).await?;
        let finalized: Vec<NodeId> = gathered.values.into_iter().map(|(recipient, _)| recipient).collect();
        for failure in &gathered.failures {
            warn!("recipient did not finalize dealing={:#x} recipient={} reason={}", plan.id, failure.partner, failure.reason);
        }
        if finalized.len() < threshold {
            return Err(ThresholdError::QuorumTimeout { required: threshold, received: finalized.len(), failures: gathered.failures });
        }
        info!("dealing finished dealing={:#x} kind={} finalized={}/{}", plan.id, plan.kind.as_str(), finalized.len(), plan.recipients.len());
        Ok(DealingOutcome { plan, commitments, group, finalized })
    }

    async fn request_deal(&self, dealer: &NodeId, plan: &DealingPlan) -> Result<DealerCommitments, ThresholdError> {
        if dealer == &self.node_id {
            return self.deal(&self.node_id, plan.clone());
        }
        match self.transport.call(dealer, NodeCall::DkgDeal { plan: plan.clone() }, self.dkg_timeout).await? {
            NodeReply::Dealt(commitments) => Ok(commitments),
            other => Err(unexpected_reply("dkg_deal", dealer, &other)),
        }
    }

    async fn request_finalize(
        &self,
        recipient: &NodeId,
        plan: &DealingPlan,
        commitments: &[DealerCommitments],
    ) -> Result<FinalizeReceipt, ThresholdError> {
        if recipient == &self.node_id {
            return self.finalize(&self.node_id, plan.clone(), commitments.to_vec()).await;
        }
        let call = NodeCall::DkgFinalize { plan: plan.clone(), commitments: commitments.to_vec() };
        match self.transport.call(recipient, call, self.dkg_timeout * 2).await? {
            NodeReply::Finalized(receipt) => Ok(receipt),
            other => Err(unexpected_reply("dkg_finalize", recipient, &other)),
        }
    }

    async fn fetch_shares(&self, dealer: &NodeId, dealing: &DealingId) -> Result<Vec<Scalar>, ThresholdError> {
        let reply = if dealer == &self.node_id {
            self.dealer_shares(&self.node_id, dealing)?
        } else {
            match self.transport.call(dealer, NodeCall::DkgShares { dealing: *dealing }, self.dkg_timeout).await? {
                NodeReply::Shares(shares) => shares,
                other => return Err(unexpected_reply("dkg_shares", dealer, &other)),
            }
        };
        if &reply.dealer != dealer || &reply.dealing != dealing {
            return Err(ThresholdError::InvalidPeerIdentity);
        }
        reply.shares.iter().map(|share| tss::scalar_from_hex(share)).collect()
    }

    async fn request_share_status(&self, peer: &NodeId, app_id: &AppId, seed: &Seed) -> Result<ShareStatus, ThresholdError> {
        if peer == &self.node_id {
            return self.share_status(app_id, seed);
        }
        match self.transport.call(peer, NodeCall::ShareCheck { app_id: app_id.clone(), seed: seed.clone() }, self.dkg_timeout).await? {
            NodeReply::ShareStatus(reply) => Ok(reply),
            other => Err(unexpected_reply("share_check", peer, &other)),
        }
    }

    /// Creates the deployers' genesis key and announces the context to the rest of the network.
    /// Returns the installed context; a node that already holds it returns it unchanged.
    pub async fn bootstrap_genesis(&self, threshold: u16, network: &[NodeId]) -> Result<AppContext, ThresholdError> {
        let app_id = AppId::from(DEPLOYMENT_APP_ID);
        let seed = Seed::from(GENESIS_SEED);
        if let Some(existing) = self.repository.get_context(&app_id, Some(&seed), true)? {
            if existing.public_key.is_some() {
                debug!("genesis already installed node_id={}", self.node_id);
                return Ok(existing);
            }
        }
        if !self.deployers.contains(&self.node_id) {
            return Err(ThresholdError::ConfigError(format!("{} is not a deployer and cannot bootstrap genesis", self.node_id)));
        }
        let mut deployers = self.deployers.clone();
        deployers.sort();
        deployers.dedup();
        let plan = self.new_plan(DealingKind::Genesis, app_id.clone(), seed.clone(), deployers.clone(), deployers, threshold, 1);
        self.run_dealing(plan, true).await?;
        let context = self.repository.require_context(&app_id, Some(&seed), true)?;

        let others: Vec<NodeId> = network.iter().filter(|node| !context.party.contains(node) && *node != &self.node_id).cloned().collect();
        let context_ref = &context;
        let calls = others
            .iter()
            .map(|peer| {
                (peer.clone(), async move {
                    self.transport.call(peer, NodeCall::ContextAnnounce { context: context_ref.clone() }, self.dkg_timeout).await
                })
            })
            .collect();
        let announced = gather(calls, others.len(), self.dkg_timeout, TimeoutPolicy::ResolvePartial).await?;
        for failure in &announced.failures {
            warn!("genesis announce failed peer={} reason={}", failure.partner, failure.reason);
        }
        info!("genesis installed key={} partners={} announced={}", context.key_label(), context.party.partners.len(), announced.values.len());
        Ok(context)
    }

    /// Key-gen round for a context whose party was just selected.
    pub async fn keygen(&self, context: &AppContext) -> Result<DkgInit, ThresholdError> {
        let partners = context.party.partners.clone();
        let plan = self.new_plan(
            DealingKind::KeyGen,
            context.app_id.clone(),
            context.seed.clone(),
            partners.clone(),
            partners,
            context.party.t,
            1,
        );
        Ok(self.run_dealing(plan, true).await?.init())
    }

    /// Reshare round from `previous` into `context`. Dealers are the first `t` previous partners
    /// that confirm they still hold a share.
    pub async fn reshare(&self, context: &AppContext, previous: &AppContext) -> Result<DkgInit, ThresholdError> {
        let want = previous.party.threshold();
        let calls = previous
            .party
            .partners
            .iter()
            .map(|partner| {
                (partner.clone(), async move {
                    let reply = self.request_share_status(partner, &previous.app_id, &previous.seed).await?;
                    if !reply.has_share || reply.index != previous.party.index_of(partner) {
                        return Err(ThresholdError::KeyNotFound(format!("{} holds no share of {}", partner, previous.key_label())));
                    }
                    Ok(())
                })
            })
            .collect();
        let responsive = gather(calls, want, self.dkg_timeout, TimeoutPolicy::ResolvePartial).await?;
        let dealers: Vec<NodeId> = responsive.values.into_iter().map(|(partner, _)| partner).take(want).collect();
        if dealers.len() < want {
            return Err(ThresholdError::QuorumTimeout { required: want, received: dealers.len(), failures: responsive.failures });
        }
        let plan = self.new_plan(
            DealingKind::Reshare { previous_seed: previous.seed.clone() },
            context.app_id.clone(),
            context.seed.clone(),
            dealers,
            context.party.partners.clone(),
            context.party.t,
            1,
        );
        Ok(self.run_dealing(plan, true).await?.init())
    }

    /// Makes sure this node owns a nonce batch with free slots for `context`.
    pub async fn ensure_nonce_batch(&self, context: &AppContext, batch_size: u32) -> Result<(), ThresholdError> {
        let _guard = self.batch_guard.lock().await;
        if self.nonces.has(&context.seed, &self.node_id).await? {
            return Ok(());
        }
        let partners = context.party.partners.clone();
        let plan = self.new_plan(
            DealingKind::NonceBatch,
            context.app_id.clone(),
            context.seed.clone(),
            partners.clone(),
            partners,
            context.party.t,
            batch_size.clamp(1, MAX_NONCE_BATCH_SIZE),
        );
        let outcome = self.run_dealing(plan, false).await?;
        if outcome.plan.recipient_index(&self.node_id).is_none() {
            self.nonces.put(NonceBatch::public_only(outcome.plan.id, context.seed.clone(), self.node_id.clone(), outcome.group))?;
        }
        Ok(())
    }

    // === Dealer ===

    /// Samples this node's polynomials for `plan` and returns their commitments.
    pub fn deal(&self, from: &NodeId, plan: DealingPlan) -> Result<DealerCommitments, ThresholdError> {
        if from != &plan.owner {
            return Err(ThresholdError::InvalidPeerIdentity);
        }
        plan.validate()?;
        if !plan.is_dealer(&self.node_id) {
            return Err(ThresholdError::ValidationError(format!("{} is not a dealer of {:#x}", self.node_id, plan.id)));
        }
        if let Some(state) = self.lock_dealings()?.get(&plan.id) {
            if state.plan != plan {
                return Err(ThresholdError::ValidationError(format!("dealing {:#x} already planned differently", plan.id)));
            }
            return Ok(state.commitments.clone());
        }
        self.check_plan(&plan)?;
        let threshold = usize::from(plan.threshold);
        let dealing = match &plan.kind {
            DealingKind::Reshare { previous_seed } => {
                let constant = self.reshare_constant(&plan, previous_seed)?;
                Dealing::with_constants(&[constant], threshold, &mut OsRng)
            }
            _ => Dealing::random(plan.count as usize, threshold, &mut OsRng),
        };
        let commitments = DealerCommitments::from_dealing(self.node_id.clone(), &dealing);
        debug!("dealt dealing={:#x} kind={} owner={} secrets={}", plan.id, plan.kind.as_str(), plan.owner, dealing.len());
        self.lock_dealings()?.insert(plan.id, DealerState { plan, dealing, commitments: commitments.clone(), created_at: now_nanos() });
        Ok(commitments)
    }

    /// Shares of dealing `dealing` for recipient `from`.
    pub fn dealer_shares(&self, from: &NodeId, dealing: &DealingId) -> Result<DealerShares, ThresholdError> {
        let dealings = self.lock_dealings()?;
        let state = dealings.get(dealing).ok_or_else(|| ThresholdError::KeyNotFound(format!("dealing {:#x}", dealing)))?;
        let index = state.plan.recipient_index(from).ok_or(ThresholdError::InvalidPeerIdentity)?;
        let shares = state.dealing.shares_for(index).iter().map(tss::scalar_hex).collect();
        Ok(DealerShares { dealer: self.node_id.clone(), dealing: *dealing, shares })
    }

    fn reshare_constant(&self, plan: &DealingPlan, previous_seed: &Seed) -> Result<Scalar, ThresholdError> {
        let previous = self.repository.require_context(&plan.app_id, Some(previous_seed), true)?;
        let own_index = previous
            .party
            .index_of(&self.node_id)
            .ok_or_else(|| ThresholdError::ValidationError(format!("{} is not a partner of {}", self.node_id, previous.key_label())))?;
        let indices = plan
            .dealers
            .iter()
            .map(|dealer| {
                previous.party.index_of(dealer).ok_or_else(|| ThresholdError::ValidationError(format!("dealer {} outside previous party", dealer)))
            })
            .collect::<Result<Vec<u32>, ThresholdError>>()?;
        let lambda = tss::lagrange_coefficient(own_index, &indices)?;
        let share = self
            .repository
            .get_key_share(&plan.app_id, previous_seed)?
            .ok_or_else(|| ThresholdError::KeyNotFound(format!("key share {}", previous.key_label())))?;
        Ok(lambda * share.scalar()?)
    }

    /// Context preconditions a dealer and a recipient check before taking part in `plan`.
    fn check_plan(&self, plan: &DealingPlan) -> Result<(), ThresholdError> {
        let now = now_nanos();
        match &plan.kind {
            DealingKind::Genesis => {
                if plan.app_id.as_str() != DEPLOYMENT_APP_ID || plan.seed.as_str() != GENESIS_SEED {
                    return Err(ThresholdError::ValidationError("genesis dealing outside the deployment app".to_string()));
                }
                let all_deployers = plan.recipients.iter().chain(&plan.dealers).chain(std::iter::once(&plan.owner)).all(|n| self.deployers.contains(n));
                if !all_deployers || plan.dealers != plan.recipients || plan.count != 1 {
                    return Err(ThresholdError::ValidationError("genesis dealing must run among deployers".to_string()));
                }
                let existing = self.repository.get_context(&plan.app_id, Some(&plan.seed), true)?;
                if existing.is_some_and(|ctx| ctx.public_key.is_some()) {
                    return Err(ThresholdError::ValidationError("genesis key already installed".to_string()));
                }
            }
            DealingKind::KeyGen => {
                let context = self.repository.require_context(&plan.app_id, Some(&plan.seed), true)?;
                expect_status(&context, now, &[ContextStatus::TssGroupSelected])?;
                if plan.dealers != context.party.partners || plan.recipients != context.party.partners {
                    return Err(ThresholdError::ValidationError(format!("key-gen participants of {} differ from its partners", context.key_label())));
                }
                expect_shape(plan, &context, 1)?;
            }
            DealingKind::Reshare { previous_seed } => {
                let context = self.repository.require_context(&plan.app_id, Some(&plan.seed), true)?;
                expect_status(&context, now, &[ContextStatus::TssGroupSelected])?;
                if context.previous_seed.as_ref() != Some(previous_seed) {
                    return Err(ThresholdError::ValidationError(format!("{} does not rotate {}", context.key_label(), previous_seed)));
                }
                if plan.recipients != context.party.partners {
                    return Err(ThresholdError::ValidationError(format!("reshare recipients differ from partners of {}", context.key_label())));
                }
                expect_shape(plan, &context, 1)?;
                let previous = self.repository.require_context(&plan.app_id, Some(previous_seed), true)?;
                expect_status(&previous, now, &[ContextStatus::Pending, ContextStatus::Expired])?;
                if plan.dealers.len() < previous.party.threshold() || !plan.dealers.iter().all(|d| previous.party.contains(d)) {
                    return Err(ThresholdError::ValidationError(format!("reshare dealers are not {} partners of {}", previous.party.t, previous.key_label())));
                }
            }
            DealingKind::NonceBatch => {
                let context = self.repository.require_context(&plan.app_id, Some(&plan.seed), true)?;
                if !context.is_signable(now, true) {
                    return Err(invalid_status(&context, now, "DEPLOYED or PENDING"));
                }
                if plan.recipients != context.party.partners || !plan.dealers.iter().all(|d| context.party.contains(d)) {
                    return Err(ThresholdError::ValidationError(format!("nonce dealing outside the party of {}", context.key_label())));
                }
                if plan.threshold != context.party.t || plan.count > MAX_NONCE_BATCH_SIZE {
                    return Err(ThresholdError::ValidationError(format!("nonce dealing shape invalid for {}", context.key_label())));
                }
            }
        }
        Ok(())
    }

    // === Recipient ===

    /// Pulls and verifies this node's shares from every dealer of `plan`, then installs them.
    pub async fn finalize(&self, from: &NodeId, plan: DealingPlan, commitments: Vec<DealerCommitments>) -> Result<FinalizeReceipt, ThresholdError> {
        if from != &plan.owner {
            return Err(ThresholdError::InvalidPeerIdentity);
        }
        plan.validate()?;
        let index = plan
            .recipient_index(&self.node_id)
            .ok_or_else(|| ThresholdError::ValidationError(format!("{} is not a recipient of {:#x}", self.node_id, plan.id)))?;
        if commitments.len() != plan.dealers.len() {
            return Err(ThresholdError::crypto("finalize", format!("{} commitment sets for {} dealers", commitments.len(), plan.dealers.len())));
        }
        let mut sets = Vec::with_capacity(commitments.len());
        for (dealer, committed) in plan.dealers.iter().zip(&commitments) {
            if &committed.dealer != dealer {
                return Err(ThresholdError::crypto("finalize", format!("commitments of {} listed under {}", committed.dealer, dealer)));
            }
            sets.push(committed.decode(&plan)?);
        }
        self.check_plan(&plan)?;
        if let DealingKind::Reshare { previous_seed } = &plan.kind {
            let previous = self.repository.require_context(&plan.app_id, Some(previous_seed), true)?;
            let constants: Vec<ProjectivePoint> = sets.iter().filter_map(|set| set.first().and_then(|c| c.first().copied())).collect();
            verify_reshare_constants(&previous, &plan.dealers, &constants)?;
        }

        let plan_ref = &plan;
        let calls = plan
            .dealers
            .iter()
            .map(|dealer| (dealer.clone(), async move { self.fetch_shares(dealer, &plan_ref.id).await }))
            .collect();
        let gathered = gather(calls, plan.dealers.len(), self.dkg_timeout, TimeoutPolicy::Reject).await?;
        let mut by_dealer: HashMap<NodeId, Vec<Scalar>> = gathered.values.into_iter().collect();
        let mut per_dealer = Vec::with_capacity(plan.dealers.len());
        for (dealer, set) in plan.dealers.iter().zip(&sets) {
            let shares = by_dealer.remove(dealer).ok_or_else(|| ThresholdError::crypto("finalize", format!("no shares from {}", dealer)))?;
            verify_dealer_shares(&shares, index, set)
                .map_err(|err| ThresholdError::crypto("finalize", format!("dealer {} sent bad shares: {}", dealer, err)))?;
            per_dealer.push(shares);
        }
        let shares = sum_shares(&per_dealer)?;
        let group = combine_commitments(&sets)?;
        self.install_dealt(&plan, index, shares, group)?;
        Ok(FinalizeReceipt { recipient: self.node_id.clone(), dealing: plan.id, index })
    }

    fn install_dealt(&self, plan: &DealingPlan, index: u32, shares: Vec<Scalar>, group: Vec<Vec<ProjectivePoint>>) -> Result<(), ThresholdError> {
        match &plan.kind {
            DealingKind::Genesis => {
                let (share, commitments) = single_secret(&shares, &group)?;
                let public_key = GroupPublicKey::from_point(&commitments[0]);
                let now = now_nanos();
                let mut context = AppContext::new(plan.app_id.clone(), DEPLOYMENT_APP_NAME, plan.seed.clone(), 0, 0, now);
                context.party = Party { t: plan.threshold, max: plan.recipients.len() as u16, partners: plan.recipients.clone() };
                context.public_key = Some(public_key.clone());
                context.commitments = tss::commitments_to_hex(commitments);
                context.deployed_at = Some(now);
                self.repository.save_key_share(&self.writer, &KeyShare::new(plan.app_id.clone(), plan.seed.clone(), index, public_key, share))?;
                self.save_context(&context)?;
            }
            DealingKind::KeyGen | DealingKind::Reshare { .. } => {
                let (share, commitments) = single_secret(&shares, &group)?;
                let pending = PendingKey {
                    plan: plan.clone(),
                    index,
                    share: Zeroizing::new(tss::encode_scalar(share)),
                    commitments: tss::commitments_to_hex(commitments),
                    created_at: now_nanos(),
                };
                self.lock_pending()?.insert(plan.id, pending);
                debug!("key share pending confirmation dealing={:#x} app_id={} seed={} index={}", plan.id, plan.app_id, plan.seed, index);
            }
            DealingKind::NonceBatch => {
                let batch = NonceBatch::new(plan.id, plan.seed.clone(), plan.owner.clone(), group, Some(index), shares)?;
                self.nonces.put(batch)?;
            }
        }
        Ok(())
    }

    /// Whether this node holds a share of `(app_id, seed)`.
    pub fn share_status(&self, app_id: &AppId, seed: &Seed) -> Result<ShareStatus, ThresholdError> {
        let index = self.repository.get_context(app_id, Some(seed), true)?.and_then(|ctx| ctx.party.index_of(&self.node_id));
        let has_share = index.is_some() && self.repository.has_key_share(app_id, seed)?;
        Ok(ShareStatus { index, has_share })
    }

    /// Installs a genesis context announced by one of its partners.
    pub fn accept_announced(&self, from: &NodeId, context: AppContext) -> Result<(), ThresholdError> {
        if context.app_id.as_str() != DEPLOYMENT_APP_ID || context.seed.as_str() != GENESIS_SEED {
            return Err(ThresholdError::ValidationError(format!("only the genesis context is announced, got {}", context.key_label())));
        }
        if !context.party.contains(from) || !self.deployers.contains(from) {
            return Err(ThresholdError::InvalidPeerIdentity);
        }
        if context.public_key.is_none() || context.commitments.is_empty() {
            return Err(ThresholdError::ValidationError("announced genesis has no key".to_string()));
        }
        if let Some(existing) = self.repository.get_context(&context.app_id, Some(&context.seed), true)? {
            if existing.public_key.is_some() {
                return Ok(());
            }
        }
        info!("genesis context accepted from={} partners={}", from, context.party.partners.len());
        self.save_context(&context)
    }

    // === Confirm hooks ===

    /// Stores a context whose party was selected by a confirmed request.
    pub fn install_party(&self, context: &AppContext) -> Result<(), ThresholdError> {
        if let Some(existing) = self.repository.get_context(&context.app_id, Some(&context.seed), true)? {
            if existing.party == context.party && existing.previous_seed == context.previous_seed {
                return Ok(());
            }
        }
        self.save_context(context)
    }

    /// Attaches a confirmed group key to its context and stores this node's pending share of it.
    #[allow(clippy::too_many_arguments)]
    pub fn install_key(
        &self,
        app_id: &AppId,
        seed: &Seed,
        dkg_id: &DealingId,
        public_key: &GroupPublicKey,
        commitments: &[String],
        request: RequestId,
        deployed_at: u64,
    ) -> Result<bool, ThresholdError> {
        let mut context = self.repository.require_context(app_id, Some(seed), true)?;
        let pending = self.lock_pending()?.remove(dkg_id);
        if let Some(pending) = pending {
            if &pending.plan.app_id != app_id || &pending.plan.seed != seed || pending.commitments != commitments {
                return Err(ThresholdError::crypto("install_key", format!("dealing {:#x} does not match the confirmed key", dkg_id)));
            }
            let share = KeyShare::from_bytes(app_id.clone(), seed.clone(), pending.index, public_key.clone(), pending.share);
            self.repository.save_key_share(&self.writer, &share)?;
        }
        if let Some(existing) = &context.public_key {
            if existing == public_key && context.commitments == commitments {
                return Ok(false);
            }
            return Err(ThresholdError::ValidationError(format!("{} already carries a different key", context.key_label())));
        }
        context.public_key = Some(public_key.clone());
        context.commitments = commitments.to_vec();
        context.deployed_at = Some(deployed_at);
        context.keygen_request = Some(request);
        self.save_context(&context)?;
        Ok(true)
    }

    /// Forgets dealer state and unconfirmed shares older than `max_age_nanos`.
    pub fn purge_stale(&self, max_age_nanos: u64, now: u64) -> Result<usize, ThresholdError> {
        let mut removed = 0;
        {
            let mut dealings = self.lock_dealings()?;
            let before = dealings.len();
            dealings.retain(|_, state| now.saturating_sub(state.created_at) < max_age_nanos);
            removed += before - dealings.len();
        }
        let mut pending = self.lock_pending()?;
        let before = pending.len();
        pending.retain(|_, key| now.saturating_sub(key.created_at) < max_age_nanos);
        removed += before - pending.len();
        Ok(removed)
    }
}

fn single_secret<'a>(shares: &'a [Scalar], group: &'a [Vec<ProjectivePoint>]) -> Result<(&'a Scalar, &'a Vec<ProjectivePoint>), ThresholdError> {
    match (shares, group) {
        ([share], [commitments]) if !commitments.is_empty() => Ok((share, commitments)),
        _ => Err(ThresholdError::crypto("install_key", format!("expected one secret, got {}", shares.len()))),
    }
}

fn expect_shape(plan: &DealingPlan, context: &AppContext, count: u32) -> Result<(), ThresholdError> {
    if plan.threshold != context.party.t || plan.count != count {
        return Err(ThresholdError::ValidationError(format!("dealing shape does not match {}", context.key_label())));
    }
    Ok(())
}

fn expect_status(context: &AppContext, now: u64, allowed: &[ContextStatus]) -> Result<(), ThresholdError> {
    let status = context.status_at(now);
    if allowed.contains(&status) {
        return Ok(());
    }
    let expected = allowed.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" or ");
    Err(invalid_status(context, now, &expected))
}

pub(crate) fn invalid_status(context: &AppContext, now: u64, expected: &str) -> ThresholdError {
    ThresholdError::InvalidContextStatus {
        app_id: context.app_id.to_string(),
        seed: context.seed.to_string(),
        status: context.status_at(now).to_string(),
        expected: expected.to_string(),
    }
}

fn unexpected_reply(call: &str, peer: &NodeId, reply: &NodeReply) -> ThresholdError {
    ThresholdError::transport(call, format!("unexpected reply {} from {}", reply.name(), peer))
}
