#![allow(dead_code)]

use crate::fixtures::{EchoApp, TEST_DKG_TIMEOUT_MS, TEST_NONCE_BATCH_SIZE, TEST_PARTNER_CALL_TIMEOUT_MS, TEST_REQUEST_TIMEOUT_MS};
use quorum_core::application::apps::deployment::PartySelection;
use quorum_core::application::{AppRegistry, NodeDeps, NodeHandler, NodeServices, NodeSettings, NoopObserver, RequestCoordinator, Submission};
use quorum_core::domain::{AppContext, AppRequest};
use quorum_core::foundation::{AppId, NodeId, Seed, ThresholdError, DEPLOYMENT_APP_NAME};
use quorum_core::infrastructure::config::TssConfig;
use quorum_core::infrastructure::keys::{Ed25519Signer, ShareSealer, SignatureVerifier, StaticEd25519Verifier};
use quorum_core::infrastructure::shared_memory::InMemorySharedMemory;
use quorum_core::infrastructure::storage::MemoryStorage;
use quorum_core::infrastructure::transport::{MockNetwork, MockTransport, PeerBehaviour};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub fn node_id(index: usize) -> NodeId {
    NodeId::new(format!("node-{}", index))
}

pub fn test_settings() -> NodeSettings {
    NodeSettings {
        request_timeout: Duration::from_millis(TEST_REQUEST_TIMEOUT_MS),
        partner_call_timeout: Duration::from_millis(TEST_PARTNER_CALL_TIMEOUT_MS),
        nonce_batch_size: TEST_NONCE_BATCH_SIZE,
        nonce_lock_ttl: Duration::from_secs(2),
        nonce_lock_wait: Duration::from_secs(5),
        tss: TssConfig { default_threshold: 3, default_party_size: 5, dkg_timeout_ms: TEST_DKG_TIMEOUT_MS, ..TssConfig::default() },
    }
}

pub struct DevnetNode {
    pub id: NodeId,
    pub services: Arc<NodeServices>,
    pub coordinator: RequestCoordinator,
}

/// In-process network of full nodes with a genesis key among the first `deployers` nodes.
pub struct Devnet {
    pub network: Arc<MockNetwork>,
    pub nodes: Vec<DevnetNode>,
}

impl Devnet {
    pub async fn start(size: usize, deployers: usize, genesis_threshold: u16) -> Result<Self, ThresholdError> {
        let ids: Vec<NodeId> = (1..=size).map(node_id).collect();
        let deployer_ids = ids[..deployers].to_vec();
        let signers: Vec<Arc<Ed25519Signer>> = ids.iter().map(|id| Arc::new(Ed25519Signer::devnet(id.clone()))).collect();
        let verifier: Arc<dyn SignatureVerifier> =
            Arc::new(StaticEd25519Verifier::new(signers.iter().map(|s| (s.node_id.clone(), s.verifying_key())).collect()));
        let network = MockNetwork::new();

        let mut nodes = Vec::with_capacity(size);
        for signer in signers {
            let mut registry = AppRegistry::with_deployment()?;
            registry.register(EchoApp)?;
            let services = NodeServices::build(NodeDeps {
                node_id: signer.node_id.clone(),
                network: ids.clone(),
                deployers: deployer_ids.clone(),
                registry: Arc::new(registry),
                storage: Arc::new(MemoryStorage::new()),
                sealer: ShareSealer::from_identity_seed(signer.seed()),
                memory: Arc::new(InMemorySharedMemory::new()),
                transport: Arc::new(MockTransport::new(network.clone(), signer.clone(), verifier.clone())),
                observer: Arc::new(NoopObserver),
                settings: test_settings(),
            })?;
            network.register(signer.clone(), Arc::new(NodeHandler::new(services.clone())), verifier.clone())?;
            nodes.push(DevnetNode { id: signer.node_id.clone(), coordinator: RequestCoordinator::new(services.clone()), services });
        }

        let devnet = Self { network, nodes };
        devnet.nodes[0].services.parties.bootstrap_genesis(genesis_threshold, &ids).await?;
        Ok(devnet)
    }

    pub fn node(&self, index: usize) -> &DevnetNode {
        &self.nodes[index - 1]
    }

    pub fn gateway(&self) -> &RequestCoordinator {
        &self.nodes[0].coordinator
    }

    pub fn set_behaviour(&self, index: usize, behaviour: PeerBehaviour) {
        self.network.set_behaviour(&node_id(index), behaviour).expect("set behaviour");
    }

    /// Confirmed `random-seed` drawn for `app_id`.
    pub async fn random_seed(&self, app_id: &AppId) -> Result<AppRequest, ThresholdError> {
        self.gateway().submit(Submission::new(DEPLOYMENT_APP_NAME, "random-seed", json!({ "appId": app_id.as_str(), "purpose": "test" }))).await
    }

    /// `random-seed`, `deploy`, `tss-key-gen`; returns the deployed context as the gateway sees it.
    pub async fn deploy(&self, app: &str, t: u16, n: u16, ttl_secs: u64, pending_secs: u64) -> Result<AppContext, ThresholdError> {
        let app_id = self.gateway().services().registry.get(app)?.app_id();
        let seed_request = self.random_seed(&app_id).await?;
        let selection = self.select_party(app, &seed_request, t, n, ttl_secs, pending_secs).await?;
        self.keygen(&selection.app_id, &selection.seed).await
    }

    /// `deploy` with the seed drawn by `seed_request`; the context stays at TSS_GROUP_SELECTED.
    pub async fn select_party(
        &self,
        app: &str,
        seed_request: &AppRequest,
        t: u16,
        n: u16,
        ttl_secs: u64,
        pending_secs: u64,
    ) -> Result<PartySelection, ThresholdError> {
        let params = json!({
            "app": app,
            "seedReqId": seed_request.req_id.to_string(),
            "t": t,
            "n": n,
            "ttl": ttl_secs,
            "pendingPeriod": pending_secs,
        });
        let deployed = self.gateway().submit(Submission::new(DEPLOYMENT_APP_NAME, "deploy", params)).await?;
        Ok(serde_json::from_value(deployed.data.result.clone())?)
    }

    pub async fn keygen(&self, app_id: &AppId, seed: &Seed) -> Result<AppContext, ThresholdError> {
        let params = json!({ "appId": app_id.as_str(), "seed": seed.as_str() });
        self.gateway().submit(Submission::new(DEPLOYMENT_APP_NAME, "tss-key-gen", params)).await?;
        self.nodes[0].services.repository.require_context(app_id, Some(seed), true)
    }

    /// `random-seed`, `tss-rotate`, `tss-reshare` for the latest context of `app_id`.
    pub async fn rotate_and_reshare(&self, app_id: &AppId, ttl_secs: u64) -> Result<AppContext, ThresholdError> {
        let seed_request = self.random_seed(app_id).await?;
        let params = json!({ "appId": app_id.as_str(), "seedReqId": seed_request.req_id.to_string(), "ttl": ttl_secs });
        let rotated = self.gateway().submit(Submission::new(DEPLOYMENT_APP_NAME, "tss-rotate", params)).await?;
        let selection: PartySelection = serde_json::from_value(rotated.data.result.clone())?;
        let params = json!({ "appId": app_id.as_str(), "seed": selection.seed.as_str() });
        self.gateway().submit(Submission::new(DEPLOYMENT_APP_NAME, "tss-reshare", params)).await?;
        self.nodes[0].services.repository.require_context(app_id, Some(&selection.seed), true)
    }

    /// Deals the gateway's nonce batch for `context` ahead of any partner misbehaviour.
    pub async fn prepare_nonces(&self, context: &AppContext) -> Result<(), ThresholdError> {
        let services = &self.nodes[0].services;
        services.parties.ensure_nonce_batch(context, services.settings.nonce_batch_size).await
    }
}
