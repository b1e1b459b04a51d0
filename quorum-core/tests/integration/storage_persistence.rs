use crate::fixtures::keyed_context;
use quorum_core::domain::{AppRequest, KeyShare};
use quorum_core::foundation::{AppId, NodeId, RequestId, Seed, ThresholdError};
use quorum_core::infrastructure::keys::ShareSealer;
use quorum_core::infrastructure::storage::{ContextRepository, RocksStorage, Storage};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

const IDENTITY_SEED: [u8; 32] = [4u8; 32];

fn request(tag: u8, started_at: u64) -> AppRequest {
    AppRequest {
        req_id: RequestId::new([tag; 32]),
        app: "echo".to_string(),
        app_id: AppId::from("5"),
        method: "echo".to_string(),
        params: json!({ "value": tag }),
        deployment_seed: Seed::from("s1"),
        gateway: NodeId::from("node-1"),
        started_at,
        confirmed_at: None,
        data: Default::default(),
        nonce: None,
        signatures: Vec::new(),
    }
}

#[test]
fn contexts_and_shares_survive_reopen() {
    let dir = TempDir::new().expect("temp dir");
    let keyed = keyed_context("5", "s1", 2, &["node-1", "node-2", "node-3"], 10);
    let public_key = keyed.context.public_key.clone().expect("key");

    {
        let storage = Arc::new(RocksStorage::open_in_dir(dir.path()).expect("open"));
        let repo = ContextRepository::new(storage, ShareSealer::from_identity_seed(&IDENTITY_SEED));
        let writer = repo.take_writer().expect("writer");
        repo.save(&writer, &keyed.context).expect("save context");
        let share = KeyShare::new(keyed.context.app_id.clone(), keyed.context.seed.clone(), 2, public_key.clone(), &keyed.shares[1]);
        assert!(repo.save_key_share(&writer, &share).expect("save share"));
    }

    let storage = Arc::new(RocksStorage::open_in_dir(dir.path()).expect("reopen"));
    let repo = ContextRepository::new(storage.clone(), ShareSealer::from_identity_seed(&IDENTITY_SEED));
    let restored = repo.require_context(&keyed.context.app_id, None, false).expect("latest context");
    assert_eq!(restored, keyed.context);

    let share = repo.get_key_share(&keyed.context.app_id, &keyed.context.seed).expect("read").expect("share");
    assert_eq!(share.index, 2);
    assert_eq!(share.public_key, public_key);
    assert_eq!(share.scalar().expect("scalar"), keyed.shares[1]);

    let sealed = storage.get_key_share(&keyed.context.app_id, &keyed.context.seed).expect("read").expect("sealed");
    let stranger = ShareSealer::from_identity_seed(&[5u8; 32]);
    assert!(matches!(stranger.open(&sealed), Err(ThresholdError::SecretDecryptFailed { .. })));
}

#[test]
fn contexts_of_similar_app_ids_stay_apart() {
    let dir = TempDir::new().expect("temp dir");
    let storage = RocksStorage::open_in_dir(dir.path()).expect("open");
    let first = keyed_context("1", "s1", 1, &["node-1"], 1).context;
    let second = keyed_context("12", "s1", 1, &["node-1"], 2).context;
    storage.put_context(&first).expect("put");
    storage.put_context(&second).expect("put");

    assert_eq!(storage.list_contexts(&AppId::from("1")).expect("list"), vec![first]);
    assert_eq!(storage.list_all_contexts().expect("list all").len(), 2);
}

#[test]
fn requests_persist_and_prune_by_start_time() {
    let dir = TempDir::new().expect("temp dir");
    {
        let storage = RocksStorage::open_in_dir(dir.path()).expect("open");
        for (tag, started_at) in [(1u8, 100u64), (2, 200), (3, 300)] {
            storage.put_request(&request(tag, started_at)).expect("put request");
        }
    }

    let storage = RocksStorage::open_in_dir(dir.path()).expect("reopen");
    assert_eq!(storage.get_request(&RequestId::new([2; 32])).expect("get"), Some(request(2, 200)));
    assert_eq!(storage.delete_requests_before(250).expect("prune"), 2);
    assert!(storage.get_request(&RequestId::new([1; 32])).expect("get").is_none());
    assert!(storage.get_request(&RequestId::new([2; 32])).expect("get").is_none());
    assert_eq!(storage.get_request(&RequestId::new([3; 32])).expect("get"), Some(request(3, 300)));
    assert_eq!(storage.delete_requests_before(250).expect("prune again"), 0);
    storage.health_check().expect("healthy");
}
