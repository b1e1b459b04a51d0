use crate::service::metrics::Metrics;
use quorum_core::foundation::NodeId;
use quorum_core::infrastructure::rpc::IpcBus;
use quorum_core::infrastructure::storage::Storage;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct ApiState {
    pub node_id: NodeId,
    /// Gateway calls travel to the request worker over this bus.
    pub bus: Arc<IpcBus>,
    pub metrics: Arc<Metrics>,
    pub storage: Arc<dyn Storage>,
    pub call_timeout: Duration,
}
