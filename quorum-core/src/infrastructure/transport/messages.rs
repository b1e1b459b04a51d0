use crate::domain::context::AppContext;
use crate::domain::signing::{DealerCommitments, DealingPlan};
use crate::domain::AppRequest;
use crate::foundation::util::encoding::hex_serde;
use crate::foundation::{AppId, DealingId, ErrorCode, Hash32, NodeId, Seed};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MessageEnvelope {
    pub sender: NodeId,
    pub recipient: NodeId,
    pub seq_no: u64,
    pub timestamp_nanos: u64,
    pub payload: WireMessage,
    pub payload_hash: Hash32,
    #[serde(with = "hex_serde")]
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum WireMessage {
    Call(NodeCall),
    Reply(NodeReply),
    Error(RemoteError),
}

/// Calls a node answers.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum NodeCall {
    /// Execute a request as partner and return a partial signature.
    Sign { request: AppRequest },
    /// A request reached quorum; run confirm hooks.
    Confirm { request: AppRequest },
    /// Deal for `plan` and return the commitments.
    DkgDeal { plan: DealingPlan },
    /// Hand the caller its shares of dealing `dealing`.
    DkgShares { dealing: DealingId },
    /// Collect shares from every dealer, verify and store the result.
    DkgFinalize { plan: DealingPlan, commitments: Vec<DealerCommitments> },
    /// Does the node hold a share of `(app_id, seed)`?
    ShareCheck { app_id: AppId, seed: Seed },
    /// A context installed outside the request flow (genesis).
    ContextAnnounce { context: AppContext },
    Ping,
}

impl NodeCall {
    pub fn name(&self) -> &'static str {
        match self {
            NodeCall::Sign { .. } => "sign",
            NodeCall::Confirm { .. } => "confirm",
            NodeCall::DkgDeal { .. } => "dkg_deal",
            NodeCall::DkgShares { .. } => "dkg_shares",
            NodeCall::DkgFinalize { .. } => "dkg_finalize",
            NodeCall::ShareCheck { .. } => "share_check",
            NodeCall::ContextAnnounce { .. } => "context_announce",
            NodeCall::Ping => "ping",
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum NodeReply {
    Signed(SignResponse),
    Ack,
    Dealt(DealerCommitments),
    Shares(DealerShares),
    Finalized(FinalizeReceipt),
    ShareStatus(ShareStatus),
    Pong,
}

impl NodeReply {
    pub fn name(&self) -> &'static str {
        match self {
            NodeReply::Signed(_) => "signed",
            NodeReply::Ack => "ack",
            NodeReply::Dealt(_) => "dealt",
            NodeReply::Shares(_) => "shares",
            NodeReply::Finalized(_) => "finalized",
            NodeReply::ShareStatus(_) => "share_status",
            NodeReply::Pong => "pong",
        }
    }
}

/// A partner's answer to `NodeCall::Sign`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    /// Hex digest of the partner's sign params.
    pub hash: String,
    pub result: Value,
    /// Partial signature `s_j`, hex.
    pub partial: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DealerShares {
    pub dealer: NodeId,
    pub dealing: DealingId,
    /// One hex scalar per dealt secret.
    pub shares: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeReceipt {
    pub recipient: NodeId,
    pub dealing: DealingId,
    pub index: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareStatus {
    pub index: Option<u32>,
    pub has_share: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RemoteError {
    pub code: ErrorCode,
    pub message: String,
}
