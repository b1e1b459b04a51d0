use crate::fixtures::{keyed_context, Devnet, TEST_DEPLOYER_COUNT, TEST_GENESIS_THRESHOLD};
use quorum_core::foundation::ThresholdError;
use quorum_core::infrastructure::keys::ShareSealer;
use quorum_core::infrastructure::storage::{ContextRepository, MemoryStorage, Storage};
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn running_node_refuses_a_second_writer() {
    let devnet = Devnet::start(3, TEST_DEPLOYER_COUNT, TEST_GENESIS_THRESHOLD).await.expect("devnet");
    for node in &devnet.nodes {
        let err = node.services.repository.take_writer().expect_err("writer already held");
        assert!(matches!(err, ThresholdError::RepositoryGuard(_)));
        assert!(err.is_fatal());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn genesis_shares_are_sealed_per_node() {
    let devnet = Devnet::start(3, TEST_DEPLOYER_COUNT, TEST_GENESIS_THRESHOLD).await.expect("devnet");
    let genesis = devnet.node(1).services.repository.list_all_contexts().expect("contexts");
    let genesis = genesis.first().expect("genesis context").clone();

    let storage = devnet.node(2).services.repository.storage().clone();
    let sealed = storage.get_key_share(&genesis.app_id, &genesis.seed).expect("read").expect("node 2 holds a share");
    let foreign = ShareSealer::from_identity_seed(&[7u8; 32]);
    assert!(matches!(foreign.open(&sealed), Err(ThresholdError::SecretDecryptFailed { .. })));
    assert!(devnet.node(2).services.repository.get_key_share(&genesis.app_id, &genesis.seed).expect("open").is_some());
}

#[test]
fn deployed_context_cannot_move_backwards() {
    let repo = ContextRepository::new(Arc::new(MemoryStorage::new()), ShareSealer::from_identity_seed(&[9u8; 32]));
    let writer = repo.take_writer().expect("writer");
    let keyed = keyed_context("5", "s1", 2, &["a", "b", "c"], 1);
    repo.save(&writer, &keyed.context).expect("save deployed");
    repo.save(&writer, &keyed.context).expect("same context again");

    let mut stripped = keyed.context.clone();
    stripped.public_key = None;
    stripped.commitments.clear();
    assert!(matches!(repo.save(&writer, &stripped), Err(ThresholdError::ValidationError(_))));

    let mut reshuffled = keyed.context.clone();
    reshuffled.party.partners.reverse();
    assert!(matches!(repo.save(&writer, &reshuffled), Err(ThresholdError::ValidationError(_))));

    let mut undeployed = keyed.context.clone();
    undeployed.deployed_at = None;
    assert!(repo.save(&writer, &undeployed).is_err());

    let stored = repo.require_context(&keyed.context.app_id, Some(&keyed.context.seed), true).expect("stored");
    assert_eq!(stored, keyed.context);
}
