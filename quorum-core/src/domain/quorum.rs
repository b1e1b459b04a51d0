//! Acceptance rules for partner partials.
//!
//! A partial counts toward quorum only when the partner belongs to the signing party, its hash is
//! byte-identical to the coordinator's, and the partial verifies against the partner's public key
//! share and nonce share commitment. The decision depends on the accepted set only, never on the
//! order responses arrived in.

use crate::domain::context::AppContext;
use crate::domain::signing::tss;
use crate::foundation::{Hash32, NodeId, ThresholdError};
use k256::{ProjectivePoint, Scalar};

/// Inputs shared by every partial of one request.
pub struct QuorumCheck<'a> {
    pub context: &'a AppContext,
    pub expected_hash: Hash32,
    /// Group commitments of the nonce slot used by the request.
    pub nonce_commitments: &'a [ProjectivePoint],
    pub challenge: Scalar,
    group_commitments: Vec<ProjectivePoint>,
}

impl<'a> QuorumCheck<'a> {
    pub fn new(context: &'a AppContext, expected_hash: Hash32, nonce_commitments: &'a [ProjectivePoint]) -> Result<Self, ThresholdError> {
        let group_key = context.group_key()?;
        let group_commitments = context.decoded_commitments()?;
        let nonce = nonce_commitments.first().ok_or_else(|| ThresholdError::crypto("quorum_check", "empty nonce commitments"))?;
        let challenge = tss::challenge(nonce, &group_key, &expected_hash);
        Ok(Self { context, expected_hash, nonce_commitments, challenge, group_commitments })
    }

    pub fn required(&self) -> usize {
        self.context.party.threshold()
    }

    /// Returns the partner's share index when the partial is acceptable.
    pub fn check(&self, partner: &NodeId, claimed_hash: &Hash32, partial: &Scalar) -> Result<u32, ThresholdError> {
        let index = self.context.party.index_of(partner).ok_or_else(|| ThresholdError::SignatureMismatch {
            partner: partner.to_string(),
            details: "not a partner of the signing context".to_string(),
        })?;
        if claimed_hash != &self.expected_hash {
            return Err(ThresholdError::SignatureMismatch {
                partner: partner.to_string(),
                details: format!("hash mismatch expected={} got={}", hex::encode(self.expected_hash), hex::encode(claimed_hash)),
            });
        }
        let public_share = tss::evaluate_commitments(&self.group_commitments, index);
        let nonce_share = tss::evaluate_commitments(self.nonce_commitments, index);
        if !tss::verify_partial(partial, &nonce_share, &public_share, &self.challenge) {
            return Err(ThresholdError::SignatureMismatch {
                partner: partner.to_string(),
                details: "partial does not verify against public share".to_string(),
            });
        }
        Ok(index)
    }
}

pub fn quorum_reached(accepted: usize, threshold: usize) -> bool {
    threshold > 0 && accepted >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::Party;
    use crate::domain::signing::tss::GroupPublicKey;
    use crate::foundation::{AppId, Seed};
    use k256::elliptic_curve::Field;
    use rand::rngs::OsRng;

    struct Fixture {
        context: AppContext,
        key_shares: Vec<Scalar>,
        nonce_shares: Vec<Scalar>,
        nonce_commitments: Vec<ProjectivePoint>,
    }

    fn fixture() -> Fixture {
        let secret = Scalar::random(&mut OsRng);
        let (key_shares, key_commitments) = tss::share(secret, 2, 3, &mut OsRng).expect("share");
        let (nonce_shares, nonce_commitments) = tss::share(Scalar::random(&mut OsRng), 2, 3, &mut OsRng).expect("share");
        let mut context = AppContext::new(AppId::from("7"), "demo", Seed::from("s"), 0, 0, 0);
        context.party = Party { t: 2, max: 3, partners: vec!["a".into(), "b".into(), "c".into()] };
        context.public_key = Some(GroupPublicKey::from_point(&key_commitments[0]));
        context.commitments = tss::commitments_to_hex(&key_commitments);
        context.deployed_at = Some(0);
        Fixture { context, key_shares, nonce_shares, nonce_commitments }
    }

    #[test]
    fn test_accepts_valid_partial_and_rejects_outsiders() {
        let f = fixture();
        let check = QuorumCheck::new(&f.context, [5u8; 32], &f.nonce_commitments).expect("check");
        let partial = tss::sign_partial(&f.nonce_shares[1], &f.key_shares[1], &check.challenge);
        assert_eq!(check.check(&"b".into(), &[5u8; 32], &partial).expect("accept"), 2);

        let err = check.check(&"z".into(), &[5u8; 32], &partial).expect_err("outsider");
        assert!(matches!(err, ThresholdError::SignatureMismatch { .. }));
    }

    #[test]
    fn test_rejects_hash_mismatch_and_wrong_share() {
        let f = fixture();
        let check = QuorumCheck::new(&f.context, [5u8; 32], &f.nonce_commitments).expect("check");
        let partial = tss::sign_partial(&f.nonce_shares[0], &f.key_shares[0], &check.challenge);
        assert!(check.check(&"a".into(), &[6u8; 32], &partial).is_err());
        // a's partial presented as c's
        assert!(check.check(&"c".into(), &[5u8; 32], &partial).is_err());
    }

    #[test]
    fn test_quorum_reached() {
        assert!(!quorum_reached(2, 3));
        assert!(quorum_reached(3, 3));
        assert!(!quorum_reached(0, 0));
    }
}
