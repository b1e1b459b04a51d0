use crate::domain::signing::tss::{self, GroupPublicKey};
use crate::foundation::util::time::secs_to_nanos;
use crate::foundation::{AppId, NodeId, RequestId, Seed, ThresholdError};
use k256::{ProjectivePoint, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub t: u16,
    pub max: u16,
    /// Ordered; a partner's share index is its 1-based position.
    pub partners: Vec<NodeId>,
}

impl Party {
    pub fn index_of(&self, node: &NodeId) -> Option<u32> {
        self.partners.iter().position(|p| p == node).map(|pos| pos as u32 + 1)
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.partners.iter().any(|p| p == node)
    }

    pub fn threshold(&self) -> usize {
        usize::from(self.t)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextStatus {
    New,
    TssGroupSelected,
    Deployed,
    Pending,
    Expired,
}

impl ContextStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextStatus::New => "NEW",
            ContextStatus::TssGroupSelected => "TSS_GROUP_SELECTED",
            ContextStatus::Deployed => "DEPLOYED",
            ContextStatus::Pending => "PENDING",
            ContextStatus::Expired => "EXPIRED",
        }
    }

    pub(crate) fn rank(&self) -> u8 {
        match self {
            ContextStatus::New => 0,
            ContextStatus::TssGroupSelected => 1,
            ContextStatus::Deployed => 2,
            ContextStatus::Pending => 3,
            ContextStatus::Expired => 4,
        }
    }
}

impl fmt::Display for ContextStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deployment of an app with one threshold key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppContext {
    pub app_id: AppId,
    pub app_name: String,
    pub seed: Seed,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_seed: Option<Seed>,
    pub party: Party,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<GroupPublicKey>,
    /// Feldman commitments of the group key; evaluating them at a partner index gives its public share.
    #[serde(default)]
    pub commitments: Vec<String>,
    /// Key lifetime in seconds; `0` never expires.
    pub ttl: u64,
    /// Seconds a context stays PENDING after its ttl.
    pub pending_period: u64,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_request: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keygen_request: Option<RequestId>,
}

impl AppContext {
    pub fn new(app_id: AppId, app_name: impl Into<String>, seed: Seed, ttl: u64, pending_period: u64, created_at: u64) -> Self {
        Self {
            app_id,
            app_name: app_name.into(),
            seed,
            previous_seed: None,
            party: Party::default(),
            public_key: None,
            commitments: Vec::new(),
            ttl,
            pending_period,
            created_at,
            deployed_at: None,
            deployment_request: None,
            keygen_request: None,
        }
    }

    pub fn status_at(&self, now_nanos: u64) -> ContextStatus {
        if self.party.partners.is_empty() {
            return ContextStatus::New;
        }
        let (Some(_), Some(deployed_at)) = (&self.public_key, self.deployed_at) else {
            return ContextStatus::TssGroupSelected;
        };
        if self.ttl == 0 {
            return ContextStatus::Deployed;
        }
        let pending_at = deployed_at.saturating_add(secs_to_nanos(self.ttl));
        let expired_at = pending_at.saturating_add(secs_to_nanos(self.pending_period));
        if now_nanos < pending_at {
            ContextStatus::Deployed
        } else if now_nanos < expired_at {
            ContextStatus::Pending
        } else {
            ContextStatus::Expired
        }
    }

    pub fn is_signable(&self, now_nanos: u64, include_pending: bool) -> bool {
        match self.status_at(now_nanos) {
            ContextStatus::Deployed => true,
            ContextStatus::Pending => include_pending,
            _ => false,
        }
    }

    pub fn group_key(&self) -> Result<ProjectivePoint, ThresholdError> {
        self.public_key
            .as_ref()
            .ok_or_else(|| ThresholdError::InvalidContextStatus {
                app_id: self.app_id.to_string(),
                seed: self.seed.to_string(),
                status: ContextStatus::TssGroupSelected.to_string(),
                expected: ContextStatus::Deployed.to_string(),
            })?
            .point()
    }

    pub fn decoded_commitments(&self) -> Result<Vec<ProjectivePoint>, ThresholdError> {
        tss::commitments_from_hex(&self.commitments)
    }

    /// Public share `Y_j` of the partner at `index`.
    pub fn public_share(&self, index: u32) -> Result<ProjectivePoint, ThresholdError> {
        let commitments = self.decoded_commitments()?;
        if commitments.is_empty() {
            return Err(ThresholdError::crypto("public_share", format!("context {}/{} has no commitments", self.app_id, self.seed)));
        }
        Ok(tss::evaluate_commitments(&commitments, index))
    }

    pub fn key_label(&self) -> String {
        format!("{}/{}", self.app_id, self.seed)
    }
}

/// Summary returned by `get_last_deployment_info`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentInfo {
    pub deployed: bool,
    pub status: Option<ContextStatus>,
    pub seed: Option<Seed>,
}

/// This node's secret share of a context key.
pub struct KeyShare {
    pub app_id: AppId,
    pub seed: Seed,
    pub index: u32,
    pub public_key: GroupPublicKey,
    share: Zeroizing<[u8; 32]>,
}

impl KeyShare {
    pub fn new(app_id: AppId, seed: Seed, index: u32, public_key: GroupPublicKey, share: &Scalar) -> Self {
        Self { app_id, seed, index, public_key, share: Zeroizing::new(tss::encode_scalar(share)) }
    }

    pub fn from_bytes(app_id: AppId, seed: Seed, index: u32, public_key: GroupPublicKey, bytes: Zeroizing<[u8; 32]>) -> Self {
        Self { app_id, seed, index, public_key, share: bytes }
    }

    pub fn scalar(&self) -> Result<Scalar, ThresholdError> {
        tss::decode_scalar(self.share.as_ref())
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.share
    }
}

impl fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyShare")
            .field("app_id", &self.app_id)
            .field("seed", &self.seed)
            .field("index", &self.index)
            .field("public_key", &self.public_key.encoded)
            .field("share", &"<redacted>")
            .finish()
    }
}

/// Key share as persisted: the scalar sealed with the node's storage key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedKeyShare {
    pub app_id: AppId,
    pub seed: Seed,
    pub index: u32,
    pub public_key: GroupPublicKey,
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::NANOS_PER_SECOND;

    fn deployed_context(ttl: u64, pending: u64, deployed_at: u64) -> AppContext {
        let mut ctx = AppContext::new(AppId::from("7"), "demo", Seed::from("s1"), ttl, pending, 0);
        ctx.party = Party { t: 2, max: 3, partners: vec!["a".into(), "b".into(), "c".into()] };
        ctx.public_key = Some(GroupPublicKey::from_point(&ProjectivePoint::GENERATOR));
        ctx.commitments = vec![tss::point_hex(&ProjectivePoint::GENERATOR)];
        ctx.deployed_at = Some(deployed_at);
        ctx
    }

    #[test]
    fn test_status_progression() {
        let mut ctx = AppContext::new(AppId::from("7"), "demo", Seed::from("s1"), 10, 5, 0);
        assert_eq!(ctx.status_at(0), ContextStatus::New);
        ctx.party = Party { t: 1, max: 1, partners: vec!["a".into()] };
        assert_eq!(ctx.status_at(0), ContextStatus::TssGroupSelected);

        let ctx = deployed_context(10, 5, 100 * NANOS_PER_SECOND);
        assert_eq!(ctx.status_at(105 * NANOS_PER_SECOND), ContextStatus::Deployed);
        assert_eq!(ctx.status_at(110 * NANOS_PER_SECOND), ContextStatus::Pending);
        assert_eq!(ctx.status_at(114 * NANOS_PER_SECOND), ContextStatus::Pending);
        assert_eq!(ctx.status_at(115 * NANOS_PER_SECOND), ContextStatus::Expired);
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let ctx = deployed_context(0, 0, 0);
        assert_eq!(ctx.status_at(u64::MAX), ContextStatus::Deployed);
    }

    #[test]
    fn test_signable_respects_include_pending() {
        let ctx = deployed_context(10, 5, 0);
        let pending_time = 12 * NANOS_PER_SECOND;
        assert!(!ctx.is_signable(pending_time, false));
        assert!(ctx.is_signable(pending_time, true));
    }

    #[test]
    fn test_persisted_shape_is_camel_case() {
        let ctx = deployed_context(10, 5, 0);
        let json = serde_json::to_value(&ctx).expect("json");
        assert!(json.get("appId").is_some());
        assert!(json.get("pendingPeriod").is_some());
        assert_eq!(json["party"]["t"], 2);
        assert!(json["publicKey"].get("yParity").is_some());
    }

    #[test]
    fn test_key_share_debug_is_redacted() {
        let share = KeyShare::new(
            AppId::from("7"),
            Seed::from("s"),
            1,
            GroupPublicKey::from_point(&ProjectivePoint::GENERATOR),
            &Scalar::from(99u64),
        );
        assert!(format!("{share:?}").contains("<redacted>"));
        assert_eq!(share.scalar().expect("scalar"), Scalar::from(99u64));
    }
}
