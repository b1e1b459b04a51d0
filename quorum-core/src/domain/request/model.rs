use crate::domain::app::TypedValue;
use crate::domain::signing::NonceRef;
use crate::foundation::{AppId, NodeId, RequestId, Seed};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    #[default]
    Sign,
    /// Answer from local execution only.
    View,
}

/// Request payload produced along the request flow.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestData {
    /// Data computed by the coordinator in `on_arrive` and forwarded to partners.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<Value>,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub sign_params: Vec<TypedValue>,
    /// Hex digest of the sign params.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Aggregated group signature over `data.hash`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSignature {
    pub owner: NodeId,
    /// Partners whose partials formed the signature, in acceptance order.
    pub signers: Vec<NodeId>,
    pub public_key: String,
    /// Compressed group nonce `R`, hex.
    pub nonce: String,
    /// Response `s`, hex.
    pub signature: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRequest {
    pub req_id: RequestId,
    pub app: String,
    pub app_id: AppId,
    pub method: String,
    pub params: Value,
    pub deployment_seed: Seed,
    pub gateway: NodeId,
    pub started_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<u64>,
    #[serde(default)]
    pub data: RequestData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<NonceRef>,
    #[serde(default)]
    pub signatures: Vec<RequestSignature>,
}

impl AppRequest {
    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Copy handed to partners: execution output and signatures stripped.
    pub fn for_partner(&self) -> Self {
        let mut out = self.clone();
        out.data.result = Value::Null;
        out.data.sign_params.clear();
        out.data.hash = None;
        out.signatures.clear();
        out.confirmed_at = None;
        out
    }
}
