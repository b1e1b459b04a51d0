//! Verifiable secret dealing shared by key generation, reshare and nonce pre-generation.
//!
//! Every dealer samples one polynomial per secret and publishes Feldman commitments. A recipient
//! with 1-based index `j` verifies each dealer's shares against that dealer's commitments and sums
//! them; the group commitments are the coefficient-wise sums over dealers.

use crate::domain::signing::tss::{self, Polynomial};
use crate::foundation::{AppId, DealingId, NodeId, Seed, ThresholdError};
use k256::{ProjectivePoint, Scalar};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DealingKind {
    /// Deployers' bootstrap key; installed directly on every recipient.
    Genesis,
    KeyGen,
    /// Old partners deal `lambda_i * x_i` so the new group keeps the previous public key.
    Reshare { previous_seed: Seed },
    NonceBatch,
}

impl DealingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealingKind::Genesis => "genesis",
            DealingKind::KeyGen => "key_gen",
            DealingKind::Reshare { .. } => "reshare",
            DealingKind::NonceBatch => "nonce_batch",
        }
    }
}

/// Everything a dealer and a recipient need to agree on before shares move.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealingPlan {
    pub id: DealingId,
    pub kind: DealingKind,
    pub app_id: AppId,
    pub seed: Seed,
    pub owner: NodeId,
    pub dealers: Vec<NodeId>,
    /// Ordered; a recipient's share index is its 1-based position.
    pub recipients: Vec<NodeId>,
    pub threshold: u16,
    pub count: u32,
}

impl DealingPlan {
    pub fn recipient_index(&self, node: &NodeId) -> Option<u32> {
        self.recipients.iter().position(|r| r == node).map(|pos| pos as u32 + 1)
    }

    pub fn is_dealer(&self, node: &NodeId) -> bool {
        self.dealers.iter().any(|d| d == node)
    }

    pub fn validate(&self) -> Result<(), ThresholdError> {
        let t = usize::from(self.threshold);
        if t == 0 || t > self.recipients.len() {
            return Err(ThresholdError::ValidationError(format!(
                "dealing {} threshold {} invalid for {} recipients",
                self.id,
                self.threshold,
                self.recipients.len()
            )));
        }
        if self.count == 0 {
            return Err(ThresholdError::ValidationError(format!("dealing {} has zero secrets", self.id)));
        }
        if self.dealers.is_empty() {
            return Err(ThresholdError::ValidationError(format!("dealing {} has no dealers", self.id)));
        }
        if has_duplicates(&self.recipients) || has_duplicates(&self.dealers) {
            return Err(ThresholdError::ValidationError(format!("dealing {} lists a node twice", self.id)));
        }
        Ok(())
    }
}

fn has_duplicates(nodes: &[NodeId]) -> bool {
    let mut sorted: Vec<&NodeId> = nodes.iter().collect();
    sorted.sort();
    sorted.windows(2).any(|w| w[0] == w[1])
}

/// Derives a fresh dealing id.
pub fn dealing_id(kind: &DealingKind, app_id: &AppId, seed: &Seed, owner: &NodeId, now_nanos: u64, salt: &[u8; 16]) -> DealingId {
    const DOMAIN: &[u8] = b"quorum:dealing:id:v1:";
    let mut hasher = blake3::Hasher::new();
    hasher.update(DOMAIN);
    hasher.update(kind.as_str().as_bytes());
    hasher.update(&[0]);
    hasher.update(app_id.as_bytes());
    hasher.update(&[0]);
    hasher.update(seed.as_bytes());
    hasher.update(&[0]);
    hasher.update(owner.as_bytes());
    hasher.update(&now_nanos.to_le_bytes());
    hasher.update(salt);
    DealingId::new(*hasher.finalize().as_bytes())
}

/// A dealer's secret polynomials for one plan.
pub struct Dealing {
    polynomials: Vec<Polynomial>,
}

impl Dealing {
    pub fn random(count: usize, threshold: usize, rng: &mut (impl RngCore + CryptoRng)) -> Self {
        Self { polynomials: (0..count).map(|_| Polynomial::random(&mut *rng, threshold)).collect() }
    }

    pub fn with_constants(constants: &[Scalar], threshold: usize, rng: &mut (impl RngCore + CryptoRng)) -> Self {
        Self { polynomials: constants.iter().map(|c| Polynomial::with_constant(*c, &mut *rng, threshold)).collect() }
    }

    pub fn len(&self) -> usize {
        self.polynomials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polynomials.is_empty()
    }

    pub fn commitments(&self) -> Vec<Vec<ProjectivePoint>> {
        self.polynomials.iter().map(Polynomial::commit).collect()
    }

    pub fn shares_for(&self, index: u32) -> Vec<Scalar> {
        let x = tss::index_scalar(index);
        self.polynomials.iter().map(|p| p.evaluate(&x)).collect()
    }
}

/// Dealer's public commitments, hex-encoded for the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerCommitments {
    pub dealer: NodeId,
    pub commitments: Vec<Vec<String>>,
}

impl DealerCommitments {
    pub fn from_dealing(dealer: NodeId, dealing: &Dealing) -> Self {
        Self { dealer, commitments: dealing.commitments().iter().map(|c| tss::commitments_to_hex(c)).collect() }
    }

    pub fn decode(&self, plan: &DealingPlan) -> Result<Vec<Vec<ProjectivePoint>>, ThresholdError> {
        if self.commitments.len() != plan.count as usize {
            return Err(ThresholdError::crypto(
                "dealing_commitments",
                format!("dealer {} committed {} secrets, expected {}", self.dealer, self.commitments.len(), plan.count),
            ));
        }
        let mut out = Vec::with_capacity(self.commitments.len());
        for set in &self.commitments {
            if set.len() != usize::from(plan.threshold) {
                return Err(ThresholdError::crypto(
                    "dealing_commitments",
                    format!("dealer {} polynomial degree mismatch", self.dealer),
                ));
            }
            out.push(tss::commitments_from_hex(set)?);
        }
        Ok(out)
    }
}

/// Coefficient-wise sum of every dealer's commitments.
pub fn combine_commitments(sets: &[Vec<Vec<ProjectivePoint>>]) -> Result<Vec<Vec<ProjectivePoint>>, ThresholdError> {
    let first = sets.first().ok_or_else(|| ThresholdError::crypto("combine_commitments", "no dealers"))?;
    let mut out = first.clone();
    for set in &sets[1..] {
        if set.len() != out.len() {
            return Err(ThresholdError::crypto("combine_commitments", "secret count mismatch"));
        }
        for (acc, commitments) in out.iter_mut().zip(set) {
            if acc.len() != commitments.len() {
                return Err(ThresholdError::crypto("combine_commitments", "threshold mismatch"));
            }
            for (a, c) in acc.iter_mut().zip(commitments) {
                *a += *c;
            }
        }
    }
    Ok(out)
}

/// Verifies one dealer's shares for recipient `index`.
pub fn verify_dealer_shares(shares: &[Scalar], index: u32, commitments: &[Vec<ProjectivePoint>]) -> Result<(), ThresholdError> {
    if shares.len() != commitments.len() {
        return Err(ThresholdError::crypto("verify_shares", format!("got {} shares for {} secrets", shares.len(), commitments.len())));
    }
    for (position, (share, commitment)) in shares.iter().zip(commitments).enumerate() {
        if !tss::verify_share(share, index, commitment) {
            return Err(ThresholdError::crypto("verify_shares", format!("share {position} does not match commitments")));
        }
    }
    Ok(())
}

/// Sums verified shares from all dealers into this recipient's final shares.
pub fn sum_shares(per_dealer: &[Vec<Scalar>]) -> Result<Vec<Scalar>, ThresholdError> {
    let first = per_dealer.first().ok_or_else(|| ThresholdError::crypto("sum_shares", "no dealers"))?;
    let mut out = first.clone();
    for shares in &per_dealer[1..] {
        if shares.len() != out.len() {
            return Err(ThresholdError::crypto("sum_shares", "secret count mismatch"));
        }
        for (acc, share) in out.iter_mut().zip(shares) {
            *acc += *share;
        }
    }
    Ok(out)
}
