use crate::fixtures::{nonce_store, public_batch};
use quorum_core::foundation::{NodeId, Seed, ThresholdError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_pick_index_issues_every_slot_once() -> Result<(), ThresholdError> {
    const SLOTS: usize = 50_000;
    let store = Arc::new(nonce_store(Duration::from_secs(5), Duration::from_secs(120)));
    store.put(public_batch(1, "seed", "node-1", SLOTS))?;
    let seed = Seed::from("seed");
    let owner = NodeId::from("node-1");

    let mut handles = Vec::with_capacity(SLOTS);
    for _ in 0..SLOTS {
        let store = store.clone();
        let seed = seed.clone();
        let owner = owner.clone();
        handles.push(tokio::spawn(async move { store.pick_index(&seed, &owner).await }));
    }
    let mut issued = HashSet::with_capacity(SLOTS);
    for handle in handles {
        let nonce = handle.await.expect("join")?.expect("slot available");
        assert!(issued.insert(nonce.index), "index {} issued twice", nonce.index);
    }
    assert_eq!(issued.len(), SLOTS);
    assert_eq!(issued.iter().copied().max(), Some(SLOTS as u32 - 1));

    assert_eq!(store.pick_index(&seed, &owner).await?, None);
    assert!(!store.has(&seed, &owner).await?);
    Ok(())
}

#[tokio::test]
async fn secret_nonce_is_handed_out_once() -> Result<(), ThresholdError> {
    use k256::elliptic_curve::Field;
    use k256::{ProjectivePoint, Scalar};
    use quorum_core::domain::signing::{NonceBatch, NonceSecret};
    use quorum_core::foundation::DealingId;
    use rand::rngs::OsRng;

    let store = nonce_store(Duration::from_secs(1), Duration::from_secs(1));
    let secrets: Vec<Scalar> = (0..2).map(|_| Scalar::random(&mut OsRng)).collect();
    let commitments = secrets.iter().map(|s| vec![ProjectivePoint::GENERATOR * s]).collect();
    store.put(NonceBatch::new(DealingId::new([2u8; 32]), Seed::from("seed"), NodeId::from("node-1"), commitments, Some(1), secrets.clone())?)?;

    let nonce = store.pick_index(&Seed::from("seed"), &NodeId::from("node-1")).await?.expect("slot");
    assert_eq!(store.take_nonce(&nonce)?, secrets[0]);
    let err = store.take_nonce(&nonce).expect_err("reuse");
    assert!(matches!(err, ThresholdError::NonceReuse { index: 0, .. }));
    assert!(err.is_fatal());
    assert!(matches!(store.get_nonce(&nonce)?, NonceSecret::Used));

    let second = store.pick_index(&Seed::from("seed"), &NodeId::from("node-1")).await?.expect("slot");
    assert_eq!(second.index, 1);
    assert!(matches!(store.get_nonce(&second)?, NonceSecret::Live(_)));
    assert_eq!(store.clear_seed(&Seed::from("seed")).await?, 1);
    assert!(store.get_commitment(&second).is_err());
    Ok(())
}
