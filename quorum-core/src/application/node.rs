//! Per-node service graph and the handler that answers peer calls.

use crate::application::apps::{AppCallContext, AppRegistry};
use crate::application::lifecycle::LifecycleObserver;
use crate::application::partner::RequestPartner;
use crate::application::party_manager::PartyManager;
use crate::foundation::{NodeId, ThresholdError};
use crate::infrastructure::config::{AppConfig, TssConfig};
use crate::infrastructure::keys::ShareSealer;
use crate::infrastructure::shared_memory::{DistributedLock, SharedMemory};
use crate::infrastructure::storage::{ContextRepository, NonceStore, PartialResultStore, Storage};
use crate::infrastructure::transport::{CallHandler, NodeCall, NodeReply, PeerTransport};
use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct NodeSettings {
    /// Deadline of one request, fan-out and quorum collection included.
    pub request_timeout: Duration,
    pub partner_call_timeout: Duration,
    pub nonce_batch_size: u32,
    pub nonce_lock_ttl: Duration,
    pub nonce_lock_wait: Duration,
    pub tss: TssConfig,
}

impl NodeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            request_timeout: config.runtime.request_timeout(),
            partner_call_timeout: config.runtime.partner_call_timeout(),
            nonce_batch_size: config.runtime.nonce_batch_size,
            nonce_lock_ttl: config.runtime.nonce_lock_ttl(),
            nonce_lock_wait: config.runtime.nonce_lock_wait(),
            tss: config.tss.clone(),
        }
    }
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Inputs of `NodeServices::build`.
pub struct NodeDeps {
    pub node_id: NodeId,
    /// Every node of the network, this one included.
    pub network: Vec<NodeId>,
    pub deployers: Vec<NodeId>,
    pub registry: Arc<AppRegistry>,
    pub storage: Arc<dyn Storage>,
    pub sealer: ShareSealer,
    pub memory: Arc<dyn SharedMemory>,
    pub transport: Arc<dyn PeerTransport>,
    pub observer: Arc<dyn LifecycleObserver>,
    pub settings: NodeSettings,
}

pub struct NodeServices {
    pub node_id: NodeId,
    /// Sorted and deduplicated.
    pub network: Vec<NodeId>,
    pub registry: Arc<AppRegistry>,
    pub repository: Arc<ContextRepository>,
    pub nonces: Arc<NonceStore>,
    pub partials: Arc<PartialResultStore>,
    pub memory: Arc<dyn SharedMemory>,
    pub parties: Arc<PartyManager>,
    pub transport: Arc<dyn PeerTransport>,
    pub observer: Arc<dyn LifecycleObserver>,
    pub settings: NodeSettings,
}

impl NodeServices {
    pub fn build(deps: NodeDeps) -> Result<Arc<Self>, ThresholdError> {
        let NodeDeps { node_id, mut network, deployers, registry, storage, sealer, memory, transport, observer, settings } = deps;
        if !network.contains(&node_id) {
            network.push(node_id.clone());
        }
        network.sort();
        network.dedup();

        let repository = Arc::new(ContextRepository::new(storage, sealer));
        let lock = DistributedLock::new(memory.clone(), settings.nonce_lock_ttl, settings.nonce_lock_wait);
        let nonces = Arc::new(NonceStore::new(memory.clone(), lock));
        let parties = PartyManager::new(
            node_id.clone(),
            deployers,
            repository.clone(),
            nonces.clone(),
            transport.clone(),
            settings.tss.dkg_timeout(),
        )?
        .with_observer(observer.clone());
        info!("node services ready node_id={} network={} apps={:?}", node_id, network.len(), registry.names());
        Ok(Arc::new(Self {
            node_id,
            network,
            registry,
            repository,
            nonces,
            partials: Arc::new(PartialResultStore::new()),
            memory,
            parties: Arc::new(parties),
            transport,
            observer,
            settings,
        }))
    }

    /// Dependencies handed to app hooks.
    pub fn app_context(&self, now_nanos: u64) -> AppCallContext<'_> {
        AppCallContext {
            node_id: &self.node_id,
            repository: self.repository.as_ref(),
            memory: self.memory.as_ref(),
            parties: self.parties.as_ref(),
            network: &self.network,
            tss: &self.settings.tss,
            now_nanos,
        }
    }
}

/// Routes peer calls to the partner role and the party manager.
pub struct NodeHandler {
    partner: RequestPartner,
    parties: Arc<PartyManager>,
}

impl NodeHandler {
    pub fn new(services: Arc<NodeServices>) -> Self {
        let parties = services.parties.clone();
        Self { partner: RequestPartner::new(services), parties }
    }
}

#[async_trait]
impl CallHandler for NodeHandler {
    async fn handle(&self, from: &NodeId, call: NodeCall) -> Result<NodeReply, ThresholdError> {
        debug!("peer call from={} call={}", from, call.name());
        match call {
            NodeCall::Sign { request } => Ok(NodeReply::Signed(self.partner.sign(from, request).await?)),
            NodeCall::Confirm { request } => {
                self.partner.confirm(from, request).await?;
                Ok(NodeReply::Ack)
            }
            NodeCall::DkgDeal { plan } => Ok(NodeReply::Dealt(self.parties.deal(from, plan)?)),
            NodeCall::DkgShares { dealing } => Ok(NodeReply::Shares(self.parties.dealer_shares(from, &dealing)?)),
            NodeCall::DkgFinalize { plan, commitments } => Ok(NodeReply::Finalized(self.parties.finalize(from, plan, commitments).await?)),
            NodeCall::ShareCheck { app_id, seed } => Ok(NodeReply::ShareStatus(self.parties.share_status(&app_id, &seed)?)),
            NodeCall::ContextAnnounce { context } => {
                self.parties.accept_announced(from, context)?;
                Ok(NodeReply::Ack)
            }
            NodeCall::Ping => Ok(NodeReply::Pong),
        }
    }
}
