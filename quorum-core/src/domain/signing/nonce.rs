use crate::domain::signing::tss;
use crate::foundation::{DealingId, NodeId, Seed, ThresholdError};
use k256::{ProjectivePoint, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Identifies one pre-agreed nonce: batch `batch` owned by `owner` for context `seed`, slot `index`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceRef {
    pub seed: Seed,
    pub owner: NodeId,
    pub batch: DealingId,
    pub index: u32,
}

impl fmt::Display for NonceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{:#x}/{}", self.seed, self.owner, self.batch, self.index)
    }
}

pub enum NonceSecret {
    Live(Zeroizing<[u8; 32]>),
    Used,
}

impl fmt::Debug for NonceSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NonceSecret::Live(_) => f.write_str("Live(<redacted>)"),
            NonceSecret::Used => f.write_str("Used"),
        }
    }
}

/// A batch of jointly generated nonces.
///
/// Every node of the party stores the public commitments; recipients additionally hold their
/// secret share of each nonce. A share is handed out once and replaced by `Used`.
#[derive(Debug)]
pub struct NonceBatch {
    pub id: DealingId,
    pub seed: Seed,
    pub owner: NodeId,
    /// Group commitments per slot; `commitments[i][0]` is the group nonce `R_i`.
    pub commitments: Vec<Vec<ProjectivePoint>>,
    /// This node's position in the party, when it holds shares.
    pub recipient_index: Option<u32>,
    secrets: Vec<NonceSecret>,
}

impl NonceBatch {
    pub fn new(
        id: DealingId,
        seed: Seed,
        owner: NodeId,
        commitments: Vec<Vec<ProjectivePoint>>,
        recipient_index: Option<u32>,
        secrets: Vec<Scalar>,
    ) -> Result<Self, ThresholdError> {
        if recipient_index.is_some() && secrets.len() != commitments.len() {
            return Err(ThresholdError::crypto(
                "nonce_batch",
                format!("{} secrets for {} commitments", secrets.len(), commitments.len()),
            ));
        }
        let secrets = secrets.iter().map(|s| NonceSecret::Live(Zeroizing::new(tss::encode_scalar(s)))).collect();
        Ok(Self { id, seed, owner, commitments, recipient_index, secrets })
    }

    /// Batch holding only public commitments (owner outside the party).
    pub fn public_only(id: DealingId, seed: Seed, owner: NodeId, commitments: Vec<Vec<ProjectivePoint>>) -> Self {
        Self { id, seed, owner, commitments, recipient_index: None, secrets: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.commitments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commitments.is_empty()
    }

    pub fn group_nonce(&self, index: u32) -> Result<ProjectivePoint, ThresholdError> {
        self.commitments
            .get(index as usize)
            .and_then(|c| c.first().copied())
            .ok_or_else(|| ThresholdError::crypto("group_nonce", format!("slot {index} outside batch {:#x}", self.id)))
    }

    /// Public commitment `R_{i,j}` of partner `partner_index` for slot `index`.
    pub fn share_commitment(&self, index: u32, partner_index: u32) -> Result<ProjectivePoint, ThresholdError> {
        let commitments = self
            .commitments
            .get(index as usize)
            .ok_or_else(|| ThresholdError::crypto("share_commitment", format!("slot {index} outside batch {:#x}", self.id)))?;
        Ok(tss::evaluate_commitments(commitments, partner_index))
    }

    /// Hands out the secret of slot `index` and leaves `Used` in its place.
    pub fn take(&mut self, index: u32) -> Result<NonceSecret, ThresholdError> {
        let slot = self.secrets.get_mut(index as usize).ok_or_else(|| ThresholdError::NonceUnavailable {
            seed: self.seed.to_string(),
            owner: self.owner.to_string(),
        })?;
        Ok(std::mem::replace(slot, NonceSecret::Used))
    }

    /// Returns this node's secret for `index` exactly once.
    pub fn take_secret(&mut self, index: u32) -> Result<Scalar, ThresholdError> {
        match self.take(index)? {
            NonceSecret::Live(bytes) => tss::decode_scalar(bytes.as_ref()),
            NonceSecret::Used => Err(ThresholdError::NonceReuse { seed: self.seed.to_string(), owner: self.owner.to_string(), index }),
        }
    }

    pub fn used_count(&self) -> usize {
        self.secrets.iter().filter(|s| matches!(s, NonceSecret::Used)).count()
    }
}
