#![allow(dead_code)]

use k256::elliptic_curve::Field;
use k256::{ProjectivePoint, Scalar};
use quorum_core::domain::context::Party;
use quorum_core::domain::signing::tss::{self, GroupPublicKey, SchnorrSignature};
use quorum_core::domain::signing::NonceBatch;
use quorum_core::domain::{AppContext, AppRequest};
use quorum_core::foundation::util::encoding::parse_hex_32bytes;
use quorum_core::foundation::{AppId, DealingId, NodeId, Seed};
use quorum_core::infrastructure::shared_memory::{DistributedLock, InMemorySharedMemory, SharedMemory};
use quorum_core::infrastructure::storage::NonceStore;
use rand::rngs::OsRng;
use std::sync::Arc;
use std::time::Duration;

pub struct KeyedContext {
    pub context: AppContext,
    /// `shares[i]` belongs to partner index `i + 1`.
    pub shares: Vec<Scalar>,
}

/// Deployed context over `partners` with a freshly dealt key.
pub fn keyed_context(app_id: &str, seed: &str, t: u16, partners: &[&str], deployed_at: u64) -> KeyedContext {
    let (shares, commitments) =
        tss::share(Scalar::random(&mut OsRng), usize::from(t), partners.len(), &mut OsRng).expect("share");
    let mut context = AppContext::new(AppId::from(app_id), "fixture", Seed::from(seed), 0, 0, deployed_at);
    context.party = Party { t, max: partners.len() as u16, partners: partners.iter().map(|p| NodeId::from(*p)).collect() };
    context.public_key = Some(GroupPublicKey::from_point(&commitments[0]));
    context.commitments = tss::commitments_to_hex(&commitments);
    context.deployed_at = Some(deployed_at);
    KeyedContext { context, shares }
}

pub fn nonce_store(lock_ttl: Duration, lock_wait: Duration) -> NonceStore {
    let memory: Arc<dyn SharedMemory> = Arc::new(InMemorySharedMemory::new());
    NonceStore::new(memory.clone(), DistributedLock::new(memory, lock_ttl, lock_wait))
}

/// Batch of `size` slots whose commitments are all the generator; enough for index bookkeeping.
pub fn public_batch(id: u8, seed: &str, owner: &str, size: usize) -> NonceBatch {
    NonceBatch::public_only(DealingId::new([id; 32]), Seed::from(seed), NodeId::from(owner), vec![vec![ProjectivePoint::GENERATOR]; size])
}

/// Checks the first group signature of a confirmed `request` against `context`'s key.
pub fn assert_group_signature(context: &AppContext, request: &AppRequest) {
    let hash = parse_hex_32bytes(request.data.hash.as_deref().expect("signed hash")).expect("hash hex");
    let signature = request.signatures.first().expect("group signature");
    assert_eq!(signature.public_key, tss::point_hex(&context.group_key().expect("group key")));
    let signature = SchnorrSignature {
        nonce: tss::point_from_hex(&signature.nonce).expect("nonce"),
        s: tss::scalar_from_hex(&signature.signature).expect("scalar"),
    };
    assert!(signature.verify(&context.group_key().expect("group key"), &hash), "group signature must verify");
}
