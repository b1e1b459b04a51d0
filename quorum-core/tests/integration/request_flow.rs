use crate::fixtures::{assert_group_signature, memory_key, node_id, Devnet, TEST_APP_NAME, TEST_DEPLOYER_COUNT, TEST_GENESIS_THRESHOLD, TEST_NODE_COUNT};
use quorum_core::application::{NodeHandler, Submission};
use quorum_core::domain::app::sign_hash;
use quorum_core::domain::request::compute_request_id;
use quorum_core::domain::{AppContext, TypedValue};
use quorum_core::foundation::util::time::now_nanos;
use quorum_core::foundation::{NodeId, ThresholdError};
use quorum_core::infrastructure::shared_memory::SharedMemory;
use quorum_core::infrastructure::storage::Storage;
use quorum_core::infrastructure::transport::{CallHandler, NodeCall, PeerBehaviour};
use serde_json::{json, Value};
use std::time::Duration;

async fn echo_network() -> (Devnet, AppContext) {
    let devnet = Devnet::start(TEST_NODE_COUNT, TEST_DEPLOYER_COUNT, TEST_GENESIS_THRESHOLD).await.expect("devnet");
    let context = devnet.deploy(TEST_APP_NAME, 3, 5, 3600, 600).await.expect("deploy echo");
    devnet.prepare_nonces(&context).await.expect("nonces");
    (devnet, context)
}

fn echo(value: &str) -> Submission {
    Submission::new(TEST_APP_NAME, "echo", json!({ "value": value }))
}

fn sorted(mut ids: Vec<NodeId>) -> Vec<NodeId> {
    ids.sort();
    ids
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn request_confirms_without_waiting_for_slow_partners() {
    let (devnet, context) = echo_network().await;
    devnet.set_behaviour(4, PeerBehaviour::Delay(Duration::from_secs(1)));
    devnet.set_behaviour(5, PeerBehaviour::Delay(Duration::from_secs(1)));

    let request = devnet.gateway().submit(echo("hello")).await.expect("confirmed");

    assert!(request.is_confirmed());
    assert_eq!(request.data.result, json!({ "value": "hello" }));
    assert_eq!(request.data.sign_params, vec![TypedValue::string("hello")]);
    assert_eq!(request.signatures.len(), 1);
    assert_eq!(sorted(request.signatures[0].signers.clone()), vec![node_id(1), node_id(2), node_id(3)]);
    assert_group_signature(&context, &request);

    for index in 1..=TEST_NODE_COUNT {
        let node = devnet.node(index);
        let stored = node.services.repository.storage().get_request(&request.req_id).expect("read").expect("request stored");
        assert!(stored.is_confirmed(), "{} holds the confirmed request", node.id);
        let remembered = node.services.memory.get(&memory_key("hello")).await.expect("memory read");
        assert_eq!(remembered, Some(Value::String("hello".to_string())), "{} applied the memory write", node.id);
    }
    assert_eq!(devnet.node(1).services.partials.count(&request.req_id).expect("count"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn diverging_partner_is_left_out_of_the_signature() {
    let (devnet, context) = echo_network().await;

    let submission = Submission::new(TEST_APP_NAME, "echo", json!({ "value": "price", "divergeOn": "node-2" }));
    let request = devnet.gateway().submit(submission).await.expect("confirmed");

    let signers = &request.signatures[0].signers;
    assert_eq!(signers.len(), 3);
    assert_eq!(signers[0], node_id(1));
    assert!(!signers.contains(&node_id(2)));
    assert_eq!(request.data.result, json!({ "value": "price" }));
    assert_group_signature(&context, &request);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unreachable_partners_fail_the_request() {
    let (devnet, _context) = echo_network().await;
    for index in 3..=5 {
        devnet.set_behaviour(index, PeerBehaviour::Offline);
    }

    let err = devnet.gateway().submit(echo("lonely")).await.expect_err("no quorum");
    match err {
        ThresholdError::QuorumTimeout { required, received, failures } => {
            assert_eq!(required, 3);
            assert_eq!(received, 2);
            assert_eq!(failures.len(), 3);
        }
        other => panic!("expected QuorumTimeout, got {other:?}"),
    }
    assert!(devnet.node(2).services.memory.get(&memory_key("lonely")).await.expect("memory read").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn view_mode_answers_without_signing() {
    let (devnet, _context) = echo_network().await;

    let request = devnet.gateway().submit(echo("peek").view()).await.expect("view");

    assert_eq!(request.data.result, json!({ "value": "peek" }));
    assert!(request.data.hash.is_some());
    assert!(request.signatures.is_empty());
    assert!(request.confirmed_at.is_none());
    assert!(request.nonce.is_none());
    assert!(devnet.node(1).services.repository.storage().get_request(&request.req_id).expect("read").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn malformed_submissions_are_rejected() {
    let (devnet, _context) = echo_network().await;
    let gateway = devnet.gateway();

    let err = gateway.submit(Submission::new("weather", "echo", json!({ "value": "x" }))).await.expect_err("unknown app");
    assert!(matches!(err, ThresholdError::UnknownApp(_)));

    let err = gateway.submit(Submission::new(TEST_APP_NAME, "shout", json!({ "value": "x" }))).await.expect_err("unknown method");
    assert!(matches!(err, ThresholdError::UnknownMethod { .. }));

    let err = gateway.submit(Submission::new(TEST_APP_NAME, "echo", json!({}))).await.expect_err("missing value");
    assert!(matches!(err, ThresholdError::ValidationError(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn only_requests_that_reached_partners_are_kept_on_failure() {
    let (devnet, _context) = echo_network().await;
    let storage = devnet.node(1).services.repository.storage().clone();
    storage.delete_requests_before(u64::MAX).expect("clear");

    devnet.gateway().submit(Submission::new(TEST_APP_NAME, "echo", json!({}))).await.expect_err("missing value");
    assert_eq!(storage.delete_requests_before(u64::MAX).expect("clear"), 0, "rejected by validation, nothing stored");

    for index in 3..=5 {
        devnet.set_behaviour(index, PeerBehaviour::Offline);
    }
    devnet.gateway().submit(echo("unanswered")).await.expect_err("no quorum");
    assert_eq!(storage.delete_requests_before(u64::MAX).expect("clear"), 1, "fanned-out request is kept as failed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn forged_confirmation_is_refused() {
    let (devnet, _context) = echo_network().await;
    let confirmed = devnet.gateway().submit(echo("genuine")).await.expect("confirmed");

    let mut forged = confirmed.clone();
    forged.params = json!({ "value": "forged" });
    forged.started_at = now_nanos();
    forged.req_id = compute_request_id(&forged.app, &forged.method, &forged.params, &forged.deployment_seed, &forged.gateway, forged.started_at)
        .expect("request id");
    forged.data.result = json!({ "value": "forged" });
    forged.data.sign_params = vec![TypedValue::string("forged")];
    forged.data.hash = Some(hex::encode(sign_hash(&forged.app_id, &forged.req_id, &forged.data.sign_params).expect("hash")));

    let handler = NodeHandler::new(devnet.node(2).services.clone());
    let err = handler.handle(&node_id(1), NodeCall::Confirm { request: forged.clone() }).await.expect_err("forged signature");
    assert!(matches!(err, ThresholdError::SignatureVerificationFailed));
    assert!(devnet.node(2).services.memory.get(&memory_key("forged")).await.expect("memory read").is_none());
    assert!(devnet.node(2).services.repository.storage().get_request(&forged.req_id).expect("read").is_none());

    // Only the gateway itself may deliver its confirmation.
    let err = handler.handle(&node_id(3), NodeCall::Confirm { request: confirmed }).await.expect_err("wrong sender");
    assert!(matches!(err, ThresholdError::InvalidPeerIdentity));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn partner_never_signs_twice_with_one_nonce() {
    let (devnet, _context) = echo_network().await;
    devnet.set_behaviour(4, PeerBehaviour::Delay(Duration::from_secs(1)));
    devnet.set_behaviour(5, PeerBehaviour::Delay(Duration::from_secs(1)));
    let confirmed = devnet.gateway().submit(echo("once")).await.expect("confirmed");
    assert!(confirmed.signatures[0].signers.contains(&node_id(2)));
    let replay = confirmed.for_partner();
    assert!(replay.nonce.is_some());

    let handler = NodeHandler::new(devnet.node(2).services.clone());
    let err = handler.handle(&node_id(1), NodeCall::Sign { request: replay }).await.expect_err("nonce already spent");
    assert!(matches!(err, ThresholdError::NonceReuse { .. }));
    assert!(err.is_fatal());
}
