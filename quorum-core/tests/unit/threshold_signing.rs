use crate::fixtures::keyed_context;
use k256::elliptic_curve::Field;
use k256::Scalar;
use quorum_core::domain::quorum::QuorumCheck;
use quorum_core::domain::signing::tss::{self, SchnorrSignature};
use quorum_core::foundation::{NodeId, ThresholdError};
use rand::rngs::OsRng;

const PARTNERS: [&str; 5] = ["a", "b", "c", "d", "e"];

fn partials(indices: &[u32], key: &[Scalar], nonce: &[Scalar], challenge: &Scalar) -> Vec<(u32, Scalar)> {
    indices.iter().map(|&i| (i, tss::sign_partial(&nonce[i as usize - 1], &key[i as usize - 1], challenge))).collect()
}

#[test]
fn any_threshold_subset_yields_the_same_signature() {
    let keyed = keyed_context("9", "seed", 3, &PARTNERS, 1);
    let (nonce_shares, nonce_commitments) = tss::share(Scalar::random(&mut OsRng), 3, 5, &mut OsRng).expect("nonce");
    let message = [7u8; 32];
    let group_key = keyed.context.group_key().expect("group key");
    let challenge = tss::challenge(&nonce_commitments[0], &group_key, &message);

    let first = tss::aggregate(&partials(&[1, 3, 5], &keyed.shares, &nonce_shares, &challenge)).expect("aggregate");
    let second = tss::aggregate(&partials(&[4, 2, 5], &keyed.shares, &nonce_shares, &challenge)).expect("aggregate");
    assert_eq!(first, second);

    let signature = SchnorrSignature { nonce: nonce_commitments[0], s: first };
    assert!(signature.verify(&group_key, &message));
    assert!(!signature.verify(&group_key, &[8u8; 32]));
    assert_eq!(SchnorrSignature::from_bytes(&signature.to_bytes()).expect("decode"), signature);
}

#[test]
fn below_threshold_partials_do_not_verify() {
    let keyed = keyed_context("9", "seed", 3, &PARTNERS, 1);
    let (nonce_shares, nonce_commitments) = tss::share(Scalar::random(&mut OsRng), 3, 5, &mut OsRng).expect("nonce");
    let message = [1u8; 32];
    let group_key = keyed.context.group_key().expect("group key");
    let challenge = tss::challenge(&nonce_commitments[0], &group_key, &message);
    let s = tss::aggregate(&partials(&[1, 2], &keyed.shares, &nonce_shares, &challenge)).expect("aggregate");
    assert!(!SchnorrSignature { nonce: nonce_commitments[0], s }.verify(&group_key, &message));
}

#[test]
fn quorum_check_accepts_each_partner_independently_of_arrival_order() {
    let keyed = keyed_context("9", "seed", 3, &PARTNERS, 1);
    let (nonce_shares, nonce_commitments) = tss::share(Scalar::random(&mut OsRng), 3, 5, &mut OsRng).expect("nonce");
    let message = [3u8; 32];
    let check = QuorumCheck::new(&keyed.context, message, &nonce_commitments).expect("check");
    let all = partials(&[1, 2, 3, 4, 5], &keyed.shares, &nonce_shares, &check.challenge);

    let forward: Vec<u32> = all.iter().map(|(i, p)| check.check(&NodeId::from(PARTNERS[*i as usize - 1]), &message, p).expect("accept")).collect();
    let backward: Vec<u32> =
        all.iter().rev().map(|(i, p)| check.check(&NodeId::from(PARTNERS[*i as usize - 1]), &message, p).expect("accept")).collect();
    assert_eq!(forward, vec![1, 2, 3, 4, 5]);
    assert_eq!(backward, vec![5, 4, 3, 2, 1]);

    let tampered = all[0].1 + Scalar::ONE;
    let err = check.check(&NodeId::from("a"), &message, &tampered).expect_err("tampered partial");
    assert!(matches!(err, ThresholdError::SignatureMismatch { .. }));
}
