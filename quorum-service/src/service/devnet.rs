//! In-process network of full nodes wired over `MockNetwork`.

use crate::apps::service_registry;
use crate::service::metrics::Metrics;
use log::info;
use quorum_core::application::apps::deployment::PartySelection;
use quorum_core::application::{NodeDeps, NodeHandler, NodeServices, NodeSettings, RequestCoordinator, Submission};
use quorum_core::domain::AppContext;
use quorum_core::foundation::{AppId, NodeId, Seed, ThresholdError, DEPLOYMENT_APP_NAME};
use quorum_core::infrastructure::config::{AppConfig, StorageBackend};
use quorum_core::infrastructure::keys::{Ed25519Signer, ShareSealer, SignatureVerifier, StaticEd25519Verifier};
use quorum_core::infrastructure::shared_memory::InMemorySharedMemory;
use quorum_core::infrastructure::storage::{MemoryStorage, RocksStorage, Storage};
use quorum_core::infrastructure::transport::{MockNetwork, MockTransport};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct DevnetOptions {
    pub nodes: usize,
    pub deployers: usize,
    pub genesis_threshold: u16,
    /// RocksDB root holding one directory per node; `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    pub allow_schema_wipe: bool,
    pub settings: NodeSettings,
}

impl DevnetOptions {
    pub fn from_config(config: &AppConfig, data_dir: &Path) -> Self {
        let data_dir = match config.storage.backend {
            StorageBackend::Rocksdb => Some(data_dir.to_path_buf()),
            StorageBackend::Memory => None,
        };
        Self {
            nodes: usize::from(config.devnet.nodes),
            deployers: usize::from(config.devnet.deployers),
            genesis_threshold: config.devnet.genesis_threshold,
            data_dir,
            allow_schema_wipe: config.storage.allow_schema_wipe,
            settings: NodeSettings::from_config(config),
        }
    }

    pub fn in_memory(nodes: usize, deployers: usize, genesis_threshold: u16, settings: NodeSettings) -> Self {
        Self { nodes, deployers, genesis_threshold, data_dir: None, allow_schema_wipe: false, settings }
    }
}

pub fn devnet_node_id(index: usize) -> NodeId {
    NodeId::new(format!("node-{}", index))
}

pub struct DevnetNode {
    pub id: NodeId,
    pub services: Arc<NodeServices>,
    pub coordinator: Arc<RequestCoordinator>,
    /// Concrete handle on the node's shared memory, kept for expiry sweeps.
    pub memory: Arc<InMemorySharedMemory>,
}

pub struct Devnet {
    pub network: Arc<MockNetwork>,
    pub nodes: Vec<DevnetNode>,
    pub deployers: Vec<NodeId>,
}

impl Devnet {
    /// Builds every node, registers it on the mock network and bootstraps the genesis key.
    pub async fn start(options: DevnetOptions, metrics: Arc<Metrics>) -> Result<Self, ThresholdError> {
        if options.nodes == 0 || options.deployers == 0 || options.deployers > options.nodes {
            return Err(ThresholdError::ConfigError(format!("devnet needs 1..={} deployers, got {}", options.nodes, options.deployers)));
        }
        let ids: Vec<NodeId> = (1..=options.nodes).map(devnet_node_id).collect();
        let deployers = ids[..options.deployers].to_vec();
        let signers: Vec<Arc<Ed25519Signer>> = ids.iter().map(|id| Arc::new(Ed25519Signer::devnet(id.clone()))).collect();
        let verifier: Arc<dyn SignatureVerifier> =
            Arc::new(StaticEd25519Verifier::new(signers.iter().map(|s| (s.node_id.clone(), s.verifying_key())).collect()));
        let network = MockNetwork::new();
        let registry = Arc::new(service_registry()?);

        let mut nodes = Vec::with_capacity(options.nodes);
        for signer in signers {
            let storage: Arc<dyn Storage> = match &options.data_dir {
                Some(root) => Arc::new(RocksStorage::open_in_dir_with_options(root.join(signer.node_id.as_str()), options.allow_schema_wipe)?),
                None => Arc::new(MemoryStorage::new()),
            };
            let memory = Arc::new(InMemorySharedMemory::new());
            let services = NodeServices::build(NodeDeps {
                node_id: signer.node_id.clone(),
                network: ids.clone(),
                deployers: deployers.clone(),
                registry: registry.clone(),
                storage,
                sealer: ShareSealer::from_identity_seed(signer.seed()),
                memory: memory.clone(),
                transport: Arc::new(MockTransport::new(network.clone(), signer.clone(), verifier.clone())),
                observer: metrics.clone(),
                settings: options.settings.clone(),
            })?;
            network.register(signer.clone(), Arc::new(NodeHandler::new(services.clone())), verifier.clone())?;
            nodes.push(DevnetNode {
                id: signer.node_id.clone(),
                coordinator: Arc::new(RequestCoordinator::new(services.clone())),
                services,
                memory,
            });
        }

        let genesis = nodes[0].services.parties.bootstrap_genesis(options.genesis_threshold, &ids).await?;
        info!(
            "devnet started nodes={} deployers={} genesis_t={} storage={}",
            ids.len(),
            deployers.len(),
            genesis.party.t,
            if options.data_dir.is_some() { "rocksdb" } else { "memory" }
        );
        Ok(Self { network, nodes, deployers })
    }

    /// 1-based, matching node names.
    pub fn node(&self, index: usize) -> &DevnetNode {
        &self.nodes[index - 1]
    }

    pub fn gateway(&self) -> &DevnetNode {
        &self.nodes[0]
    }

    /// `random-seed`, `deploy`, `tss-key-gen` for `app`; returns the deployed context. An app that is
    /// already deployed keeps its context.
    pub async fn deploy_app(&self, app: &str, t: u16, n: u16) -> Result<AppContext, ThresholdError> {
        let gateway = &self.gateway().coordinator;
        let app_id = gateway.services().registry.get(app)?.app_id();
        if let Some(existing) = gateway.services().repository.get_context(&app_id, None, true)? {
            info!("app already deployed app={} seed={}", app, existing.seed);
            return Ok(existing);
        }
        let seed_request = gateway.submit(Submission::new(DEPLOYMENT_APP_NAME, "random-seed", json!({ "appId": app_id.as_str(), "purpose": app }))).await?;
        let params = json!({ "app": app, "seedReqId": seed_request.req_id.to_string(), "t": t, "n": n });
        let deployed = gateway.submit(Submission::new(DEPLOYMENT_APP_NAME, "deploy", params)).await?;
        let selection: PartySelection = serde_json::from_value(deployed.data.result.clone())?;
        self.keygen(&selection.app_id, &selection.seed).await
    }

    async fn keygen(&self, app_id: &AppId, seed: &Seed) -> Result<AppContext, ThresholdError> {
        let gateway = &self.gateway().coordinator;
        let params = json!({ "appId": app_id.as_str(), "seed": seed.as_str() });
        gateway.submit(Submission::new(DEPLOYMENT_APP_NAME, "tss-key-gen", params)).await?;
        let context = gateway.services().repository.require_context(app_id, Some(seed), true)?;
        info!("app deployed app_id={} seed={} partners={:?}", context.app_id, context.seed, context.party.partners);
        Ok(context)
    }
}
