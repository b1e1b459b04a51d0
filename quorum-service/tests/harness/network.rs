#![allow(dead_code)]

use quorum_core::application::apps::deployment::PartySelection;
use quorum_core::application::{NodeSettings, Submission};
use quorum_core::domain::AppContext;
use quorum_core::foundation::{AppId, ThresholdError, DEPLOYMENT_APP_NAME};
use quorum_core::infrastructure::config::TssConfig;
use quorum_service::service::{Devnet, DevnetOptions, Metrics};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const NODE_COUNT: usize = 5;
pub const DEPLOYER_COUNT: usize = 3;
pub const GENESIS_THRESHOLD: u16 = 2;

pub fn test_settings() -> NodeSettings {
    NodeSettings {
        request_timeout: Duration::from_millis(5_000),
        partner_call_timeout: Duration::from_millis(3_000),
        nonce_batch_size: 16,
        nonce_lock_ttl: Duration::from_secs(2),
        nonce_lock_wait: Duration::from_secs(5),
        tss: TssConfig { default_threshold: 3, default_party_size: 5, dkg_timeout_ms: 5_000, ..TssConfig::default() },
    }
}

pub async fn start_devnet() -> (Devnet, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::new().expect("metrics"));
    let options = DevnetOptions::in_memory(NODE_COUNT, DEPLOYER_COUNT, GENESIS_THRESHOLD, test_settings());
    let devnet = Devnet::start(options, metrics.clone()).await.expect("devnet");
    (devnet, metrics)
}

/// Deploys `app` with an explicit context lifetime, bypassing the defaults `Devnet::deploy_app` uses.
pub async fn deploy_with_lifetime(devnet: &Devnet, app: &str, ttl_secs: u64, pending_secs: u64) -> Result<AppContext, ThresholdError> {
    let gateway = &devnet.gateway().coordinator;
    let app_id = gateway.services().registry.get(app)?.app_id();
    let seed_request =
        gateway.submit(Submission::new(DEPLOYMENT_APP_NAME, "random-seed", json!({ "appId": app_id.as_str(), "purpose": app }))).await?;
    let params = json!({
        "app": app,
        "seedReqId": seed_request.req_id.to_string(),
        "t": 3,
        "n": 5,
        "ttl": ttl_secs,
        "pendingPeriod": pending_secs,
    });
    let deployed = gateway.submit(Submission::new(DEPLOYMENT_APP_NAME, "deploy", params)).await?;
    let selection: PartySelection = serde_json::from_value(deployed.data.result.clone())?;
    let params = json!({ "appId": selection.app_id.as_str(), "seed": selection.seed.as_str() });
    gateway.submit(Submission::new(DEPLOYMENT_APP_NAME, "tss-key-gen", params)).await?;
    gateway.services().repository.require_context(&selection.app_id, Some(&selection.seed), true)
}

pub fn latest_context(devnet: &Devnet, app_id: &AppId) -> AppContext {
    devnet.gateway().services.repository.list_contexts(app_id).expect("list contexts").pop().expect("at least one context")
}
