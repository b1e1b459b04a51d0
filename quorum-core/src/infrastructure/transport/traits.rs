use super::messages::{NodeCall, NodeReply};
use crate::foundation::{NodeId, ThresholdError};
use async_trait::async_trait;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, ThresholdError>;

/// "Send a call to a peer, get its reply or a timeout."
///
/// A rejected call surfaces as `PeerRejected`, an unanswered one as `PeerTimeout`.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    fn local_id(&self) -> &NodeId;

    async fn call(&self, peer: &NodeId, call: NodeCall, timeout: Duration) -> Result<NodeReply>;
}

/// Serves calls addressed to this node. `from` is the authenticated sender.
#[async_trait]
pub trait CallHandler: Send + Sync {
    async fn handle(&self, from: &NodeId, call: NodeCall) -> Result<NodeReply>;
}
