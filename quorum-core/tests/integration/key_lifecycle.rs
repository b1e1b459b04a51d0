use crate::fixtures::{assert_group_signature, Devnet, TEST_APP_NAME, TEST_DEPLOYER_COUNT, TEST_GENESIS_THRESHOLD, TEST_NODE_COUNT};
use quorum_core::application::apps::deployment::{random_seed_of, seed_record_key};
use quorum_core::application::{AppModule, DkgInit, Submission};
use quorum_core::domain::signing::{DealingKind, DealingPlan};
use quorum_core::domain::ContextStatus;
use quorum_core::foundation::util::time::now_nanos;
use quorum_core::foundation::{AppId, DealingId, RequestId, ThresholdError, DEPLOYMENT_APP_ID, DEPLOYMENT_APP_NAME};
use serde_json::json;
use std::time::Duration;

async fn network() -> Devnet {
    Devnet::start(TEST_NODE_COUNT, TEST_DEPLOYER_COUNT, TEST_GENESIS_THRESHOLD).await.expect("devnet")
}

fn is_validation(err: &ThresholdError, needle: &str) -> bool {
    matches!(err, ThresholdError::ValidationError(details) if details.contains(needle))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deploy_installs_the_key_on_every_partner() {
    let devnet = network().await;
    let context = devnet.deploy(TEST_APP_NAME, 3, 5, 3600, 600).await.expect("deploy");

    assert_eq!(context.status_at(now_nanos()), ContextStatus::Deployed);
    assert_eq!(context.party.t, 3);
    assert_eq!(context.party.partners.len(), 5);
    for node in &devnet.nodes {
        let local = node.services.repository.require_context(&context.app_id, Some(&context.seed), true).expect("context installed");
        assert_eq!(local.public_key, context.public_key, "{} agrees on the group key", node.id);
        assert!(node.services.repository.has_key_share(&context.app_id, &context.seed).expect("share lookup"));
    }

    let err = devnet.random_seed(&context.app_id).await.expect_err("no seed while deployed");
    assert!(is_validation(&err, "is deployed with status DEPLOYED"), "unexpected error: {}", err);

    let params = json!({ "app": TEST_APP_NAME, "seedReqId": RequestId::new([0u8; 32]).to_string(), "t": 3, "n": 5 });
    let err = devnet.gateway().submit(Submission::new(DEPLOYMENT_APP_NAME, "deploy", params)).await.expect_err("already deployed");
    assert!(matches!(err, ThresholdError::ValidationError(_)));

    let params = json!({ "appId": context.app_id.as_str(), "seed": context.seed.as_str() });
    let err = devnet.gateway().submit(Submission::new(DEPLOYMENT_APP_NAME, "tss-reshare", params)).await.expect_err("nothing to reshare");
    assert!(matches!(err, ThresholdError::InvalidContextStatus { .. }), "unexpected error: {}", err);
    assert_eq!(devnet.node(1).services.repository.list_contexts(&context.app_id).expect("list").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn random_seed_needs_a_deployable_app() {
    let devnet = network().await;
    let gateway = devnet.gateway();

    let err = gateway.submit(Submission::new(DEPLOYMENT_APP_NAME, "random-seed", json!({ "purpose": "x" }))).await.expect_err("no app");
    assert!(is_validation(&err, "appId"), "unexpected error: {}", err);

    let params = json!({ "appId": DEPLOYMENT_APP_ID, "purpose": "x" });
    let err = gateway.submit(Submission::new(DEPLOYMENT_APP_NAME, "random-seed", params)).await.expect_err("deployment app");
    assert!(matches!(err, ThresholdError::ValidationError(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deploy_takes_its_seed_from_the_latest_random_seed() {
    let devnet = network().await;
    let app_id = AppId::for_app_name(TEST_APP_NAME);
    let stale = devnet.random_seed(&app_id).await.expect("first seed");
    let latest = devnet.random_seed(&app_id).await.expect("second seed");

    let params = json!({ "app": TEST_APP_NAME, "seedReqId": latest.req_id.to_string(), "seed": "caller-picked" });
    let err = devnet.gateway().submit(Submission::new(DEPLOYMENT_APP_NAME, "deploy", params)).await.expect_err("caller seed");
    assert!(is_validation(&err, "param seed"), "unexpected error: {}", err);

    let params = json!({ "app": TEST_APP_NAME, "seedReqId": stale.req_id.to_string() });
    let err = devnet.gateway().submit(Submission::new(DEPLOYMENT_APP_NAME, "deploy", params)).await.expect_err("stale seed");
    assert!(is_validation(&err, "not the latest random seed"), "unexpected error: {}", err);
    assert!(devnet.node(1).services.repository.list_contexts(&app_id).expect("list").is_empty());

    let selection = devnet.select_party(TEST_APP_NAME, &latest, 3, 5, 3600, 600).await.expect("deploy");
    assert_eq!(selection.seed, random_seed_of(&latest).expect("seed of the confirmed request"));
    for node in &devnet.nodes {
        let record = node.services.memory.get(&seed_record_key(&app_id)).await.expect("memory read");
        assert_eq!(record, None, "{} consumed the seed", node.id);
    }

    let params = json!({ "app": TEST_APP_NAME, "seedReqId": latest.req_id.to_string() });
    let err = devnet.gateway().submit(Submission::new(DEPLOYMENT_APP_NAME, "deploy", params)).await.expect_err("seed reused");
    assert!(matches!(err, ThresholdError::ValidationError(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn keygen_refuses_participants_other_than_the_partners() {
    let devnet = network().await;
    let app_id = AppId::for_app_name(TEST_APP_NAME);
    let seed_request = devnet.random_seed(&app_id).await.expect("seed");
    let selection = devnet.select_party(TEST_APP_NAME, &seed_request, 3, 5, 3600, 600).await.expect("party selected");
    let context = devnet.node(1).services.repository.require_context(&app_id, Some(&selection.seed), true).expect("selected context");
    assert_eq!(context.status_at(now_nanos()), ContextStatus::TssGroupSelected);

    let params = json!({ "appId": app_id.as_str(), "seed": selection.seed.as_str() });
    let err = devnet.gateway().submit(Submission::new(DEPLOYMENT_APP_NAME, "tss-reshare", params.clone())).await.expect_err("not a rotation");
    assert!(is_validation(&err, "does not rotate"), "unexpected error: {}", err);

    let partners = context.party.partners.clone();
    let dealer = devnet.nodes.iter().find(|node| node.id == partners[0]).expect("dealer node");
    let plan = DealingPlan {
        id: DealingId::new([7u8; 32]),
        kind: DealingKind::KeyGen,
        app_id: app_id.clone(),
        seed: selection.seed.clone(),
        owner: partners[1].clone(),
        dealers: partners[..4].to_vec(),
        recipients: partners.clone(),
        threshold: context.party.t,
        count: 1,
    };
    let err = dealer.services.parties.deal(&partners[1], plan.clone()).expect_err("missing dealer");
    assert!(is_validation(&err, "differ from its partners"), "unexpected error: {}", err);
    let shrunk = DealingPlan { id: DealingId::new([8u8; 32]), dealers: partners.clone(), recipients: partners[..4].to_vec(), ..plan };
    let err = dealer.services.parties.deal(&partners[1], shrunk).expect_err("missing recipient");
    assert!(is_validation(&err, "differ from its partners"), "unexpected error: {}", err);

    let keygen = devnet.gateway().submit(Submission::new(DEPLOYMENT_APP_NAME, "tss-key-gen", params)).await.expect("honest keygen");
    let mut init = DkgInit::from_request(&keygen).expect("dealing init");
    init.dealers.pop();
    init.commitments.pop();
    let mut tampered = keygen.clone();
    tampered.data.init = Some(init.to_value().expect("init value"));
    let partner = devnet.node(2);
    let module = partner.services.registry.get(DEPLOYMENT_APP_NAME).expect("deployment app");
    let err = module.on_request(&partner.services.app_context(now_nanos()), &tampered).await.expect_err("dealers differ");
    assert!(is_validation(&err, "dealers differ from partners"), "unexpected error: {}", err);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rotation_waits_for_the_pending_period() {
    let devnet = network().await;
    let context = devnet.deploy(TEST_APP_NAME, 3, 5, 3600, 600).await.expect("deploy");

    let params = json!({ "appId": context.app_id.as_str(), "seedReqId": RequestId::new([0u8; 32]).to_string() });
    let err = devnet.gateway().submit(Submission::new(DEPLOYMENT_APP_NAME, "tss-rotate", params)).await.expect_err("still deployed");
    assert!(matches!(err, ThresholdError::InvalidContextStatus { .. }));
    assert_eq!(devnet.node(1).services.repository.list_contexts(&context.app_id).expect("list").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reshare_keeps_the_group_key() {
    let devnet = network().await;
    let original = devnet.deploy(TEST_APP_NAME, 3, 5, 1, 3600).await.expect("deploy");
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(original.status_at(now_nanos()), ContextStatus::Pending);

    let rotated = devnet.rotate_and_reshare(&original.app_id, 3600).await.expect("rotate and reshare");

    assert_ne!(rotated.seed, original.seed);
    assert_eq!(rotated.previous_seed.as_ref(), Some(&original.seed));
    assert_eq!(rotated.public_key, original.public_key);
    assert_eq!(rotated.status_at(now_nanos()), ContextStatus::Deployed);
    for node in &devnet.nodes {
        if rotated.party.contains(&node.id) {
            assert!(node.services.repository.has_key_share(&rotated.app_id, &rotated.seed).expect("share lookup"), "{} holds a new share", node.id);
        }
    }

    let request = devnet
        .gateway()
        .submit(Submission::new(TEST_APP_NAME, "echo", json!({ "value": "after-rotation" })))
        .await
        .expect("signed with the rotated context");
    assert_eq!(request.deployment_seed, rotated.seed);
    assert_group_signature(&original, &request);
}
