//! Built-in deployment app: seeds, party selection, key generation, rotation and reshare.
//!
//! Every method is signed by the deployers' genesis context and confirmed on every node, so each
//! node ends up with the same view of every app context.
//!
//! `deploy` and `tss-rotate` never take a seed from the caller. They name a confirmed `random-seed`
//! request for the same app, and the seed is read back from the record every node wrote when that
//! request was confirmed. Only the latest such record per app is kept, and it lapses after
//! `RANDOM_SEED_TTL_SECS`.

use super::{App, AppCallContext};
use crate::application::party_manager::{verify_reshare_constants, DkgInit};
use crate::domain::app::{AppMethod, ConfirmAudience, MemWrite, TypedValue};
use crate::domain::context::{AppContext, ContextStatus, Party};
use crate::domain::party::selection::{rotate_party, select_party};
use crate::domain::signing::tss::{self, GroupPublicKey};
use crate::domain::AppRequest;
use crate::foundation::util::encoding::decode_hex;
use crate::foundation::{
    AppId, DealingId, NodeId, RequestId, Seed, ThresholdError, DEPLOYMENT_APP_ID, DEPLOYMENT_APP_NAME, MAX_PARTY_SIZE, RANDOM_SEED_TTL_SECS,
};
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha3::{Digest, Keccak256};
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeploymentMethod {
    RandomSeed,
    Deploy,
    KeyGen,
    Rotate,
    Reshare,
}

impl AppMethod for DeploymentMethod {
    const ALL: &'static [Self] = &[Self::RandomSeed, Self::Deploy, Self::KeyGen, Self::Rotate, Self::Reshare];

    fn as_str(&self) -> &'static str {
        match self {
            Self::RandomSeed => "random-seed",
            Self::Deploy => "deploy",
            Self::KeyGen => "tss-key-gen",
            Self::Rotate => "tss-rotate",
            Self::Reshare => "tss-reshare",
        }
    }
}

/// Party chosen by `deploy` or `tss-rotate`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartySelection {
    pub app: String,
    pub app_id: AppId,
    pub seed: Seed,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_seed: Option<Seed>,
    pub t: u16,
    pub n: u16,
    pub partners: Vec<NodeId>,
    pub ttl: u64,
    pub pending_period: u64,
}

impl PartySelection {
    fn sign_params(&self) -> Vec<TypedValue> {
        let partners: Vec<&str> = self.partners.iter().map(NodeId::as_str).collect();
        vec![
            TypedValue::string(self.app_id.as_str()),
            TypedValue::string(self.seed.as_str()),
            TypedValue::string(self.previous_seed.as_ref().map(Seed::as_str).unwrap_or_default()),
            TypedValue::uint(u64::from(self.t)),
            TypedValue::uint(u64::from(self.n)),
            TypedValue::string(partners.join(",")),
            TypedValue::uint(self.ttl),
            TypedValue::uint(self.pending_period),
        ]
    }

    /// Context every node installs once the selection is confirmed.
    pub fn to_context(&self, created_at: u64, request: RequestId) -> AppContext {
        let mut context = AppContext::new(self.app_id.clone(), self.app.clone(), self.seed.clone(), self.ttl, self.pending_period, created_at);
        context.previous_seed = self.previous_seed.clone();
        context.party = Party { t: self.t, max: self.n, partners: self.partners.clone() };
        context.deployment_request = Some(request);
        context
    }
}

/// Group key produced by `tss-key-gen` or `tss-reshare`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResult {
    pub app_id: AppId,
    pub seed: Seed,
    pub dkg_id: DealingId,
    pub public_key: GroupPublicKey,
    pub commitments: Vec<String>,
}

impl KeyResult {
    fn from_init(context: &AppContext, init: &DkgInit) -> Result<Self, ThresholdError> {
        let group = init.group_commitments(context.party.t)?;
        Ok(Self {
            app_id: context.app_id.clone(),
            seed: context.seed.clone(),
            dkg_id: init.dkg_id,
            public_key: GroupPublicKey::from_point(&group[0]),
            commitments: tss::commitments_to_hex(&group),
        })
    }

    fn sign_params(&self) -> Vec<TypedValue> {
        vec![
            TypedValue::string(self.app_id.as_str()),
            TypedValue::string(self.seed.as_str()),
            TypedValue::Bytes32(self.dkg_id.to_string()),
            TypedValue::Address(self.public_key.address.clone()),
            TypedValue::Bytes(self.public_key.encoded.clone()),
            TypedValue::string(self.commitments.join(",")),
        ]
    }
}

/// Latest confirmed random seed of an app, as held in shared memory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedRecord {
    pub req_id: RequestId,
    pub seed: Seed,
}

pub fn seed_record_key(app_id: &AppId) -> String {
    format!("deployment:seed:{}", app_id)
}

/// Seed derived from a confirmed `random-seed` request: keccak of its group signature.
pub fn random_seed_of(request: &AppRequest) -> Result<Seed, ThresholdError> {
    if request.app_id.as_str() != DEPLOYMENT_APP_ID || request.method != DeploymentMethod::RandomSeed.as_str() {
        return Err(ThresholdError::ValidationError(format!("request {:#x} is not a random-seed request", request.req_id)));
    }
    let signature = request
        .signatures
        .first()
        .filter(|_| request.is_confirmed())
        .ok_or_else(|| ThresholdError::ValidationError(format!("random-seed request {:#x} is not confirmed", request.req_id)))?;
    let mut hasher = Keccak256::new();
    hasher.update(decode_hex(&signature.nonce)?);
    hasher.update(decode_hex(&signature.signature)?);
    Ok(Seed::new(hex::encode(hasher.finalize())))
}

fn param_u64(request: &AppRequest, key: &str) -> Result<Option<u64>, ThresholdError> {
    match request.param(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| invalid_param(key, "expected an unsigned integer")),
        Some(Value::String(s)) => s.parse().map(Some).map_err(|_| invalid_param(key, "expected an unsigned integer")),
        Some(_) => Err(invalid_param(key, "expected an unsigned integer")),
    }
}

fn param_u16(request: &AppRequest, key: &str) -> Result<Option<u16>, ThresholdError> {
    param_u64(request, key)?.map(|v| u16::try_from(v).map_err(|_| invalid_param(key, "out of range"))).transpose()
}

fn required_str<'a>(request: &'a AppRequest, key: &str) -> Result<&'a str, ThresholdError> {
    request.param_str(key).filter(|v| !v.is_empty()).ok_or_else(|| invalid_param(key, "missing"))
}

fn invalid_param(key: &str, details: &str) -> ThresholdError {
    ThresholdError::ValidationError(format!("param {}: {}", key, details))
}

/// Seed of the confirmed random-seed request `seedReqId`, which must be the latest one for `app_id`.
async fn resolve_seed(ctx: &AppCallContext<'_>, request: &AppRequest, app_id: &AppId) -> Result<Seed, ThresholdError> {
    if request.param("seed").is_some() {
        return Err(invalid_param("seed", "not accepted; pass seedReqId of a confirmed random-seed request"));
    }
    let req_id = RequestId::from_str(required_str(request, "seedReqId")?)?;
    let record = ctx
        .memory
        .get(&seed_record_key(app_id))
        .await?
        .ok_or_else(|| ThresholdError::ValidationError(format!("no fresh random seed for app {}", app_id)))?;
    let record: SeedRecord = serde_json::from_value(record)?;
    if record.req_id != req_id {
        return Err(ThresholdError::ValidationError(format!("seed request {:#x} is not the latest random seed of app {}", req_id, app_id)));
    }
    Ok(record.seed)
}

/// App a `random-seed` request draws for.
fn seed_target(request: &AppRequest) -> Result<AppId, ThresholdError> {
    let app_id = AppId::from(required_str(request, "appId")?);
    if app_id.as_str() == DEPLOYMENT_APP_ID {
        return Err(ThresholdError::ValidationError("the deployment app does not draw seeds".to_string()));
    }
    Ok(app_id)
}

fn check_party_shape(ctx: &AppCallContext<'_>, t: u16, n: u16) -> Result<(), ThresholdError> {
    let limit = usize::from(MAX_PARTY_SIZE).min(ctx.network.len());
    if t == 0 || t > n || usize::from(n) > limit {
        return Err(ThresholdError::PartySelection(format!("invalid party t={} n={} for {} nodes", t, n, ctx.network.len())));
    }
    Ok(())
}

fn ensure_unused_seed(ctx: &AppCallContext<'_>, app_id: &AppId, seed: &Seed) -> Result<(), ThresholdError> {
    if ctx.repository.get_context(app_id, Some(seed), true)?.is_some() {
        return Err(ThresholdError::ValidationError(format!("seed {} already used by app {}", seed, app_id)));
    }
    Ok(())
}

fn ensure_status(context: &AppContext, now: u64, allowed: &[ContextStatus]) -> Result<(), ThresholdError> {
    let status = context.status_at(now);
    if allowed.contains(&status) {
        return Ok(());
    }
    Err(ThresholdError::InvalidContextStatus {
        app_id: context.app_id.to_string(),
        seed: context.seed.to_string(),
        status: status.to_string(),
        expected: allowed.iter().map(ContextStatus::as_str).collect::<Vec<_>>().join(" or "),
    })
}

/// Most recent context of the app named by `appId`.
fn last_context(ctx: &AppCallContext<'_>, request: &AppRequest) -> Result<AppContext, ThresholdError> {
    let app_id = AppId::from(required_str(request, "appId")?);
    ctx.repository.list_contexts(&app_id)?.pop().ok_or_else(|| ThresholdError::context_not_found(app_id.as_str(), None))
}

/// Context named by `appId` and `seed`.
fn target_context(ctx: &AppCallContext<'_>, request: &AppRequest) -> Result<AppContext, ThresholdError> {
    let app_id = AppId::from(required_str(request, "appId")?);
    let seed = Seed::from(required_str(request, "seed")?);
    ctx.repository.require_context(&app_id, Some(&seed), true)
}

fn previous_of(ctx: &AppCallContext<'_>, context: &AppContext) -> Result<AppContext, ThresholdError> {
    let previous_seed = context
        .previous_seed
        .as_ref()
        .ok_or_else(|| ThresholdError::ValidationError(format!("{} does not rotate an earlier context", context.key_label())))?;
    ctx.repository.require_context(&context.app_id, Some(previous_seed), true)
}

async fn deploy_selection(ctx: &AppCallContext<'_>, request: &AppRequest) -> Result<PartySelection, ThresholdError> {
    let app = required_str(request, "app")?.to_string();
    let app_id = request.param_str("appId").map(AppId::from).unwrap_or_else(|| AppId::for_app_name(&app));
    if app_id.as_str() == DEPLOYMENT_APP_ID || app == DEPLOYMENT_APP_NAME {
        return Err(ThresholdError::ValidationError("the deployment app is not deployed by request".to_string()));
    }
    let seed = resolve_seed(ctx, request, &app_id).await?;
    let t = param_u16(request, "t")?.unwrap_or(ctx.tss.default_threshold);
    let n = param_u16(request, "n")?.unwrap_or(ctx.tss.default_party_size);
    check_party_shape(ctx, t, n)?;
    Ok(PartySelection {
        app,
        app_id,
        seed,
        previous_seed: None,
        t,
        n,
        partners: Vec::new(),
        ttl: param_u64(request, "ttl")?.unwrap_or(ctx.tss.context_ttl_secs),
        pending_period: param_u64(request, "pendingPeriod")?.unwrap_or(ctx.tss.pending_period_secs),
    })
}

async fn rotate_selection(ctx: &AppCallContext<'_>, request: &AppRequest, previous: &AppContext) -> Result<PartySelection, ThresholdError> {
    let seed = resolve_seed(ctx, request, &previous.app_id).await?;
    let t = param_u16(request, "t")?.unwrap_or(previous.party.t);
    let n = param_u16(request, "n")?.unwrap_or(previous.party.max);
    check_party_shape(ctx, t, n)?;
    Ok(PartySelection {
        app: previous.app_name.clone(),
        app_id: previous.app_id.clone(),
        seed,
        previous_seed: Some(previous.seed.clone()),
        t,
        n,
        partners: Vec::new(),
        ttl: param_u64(request, "ttl")?.unwrap_or(previous.ttl),
        pending_period: param_u64(request, "pendingPeriod")?.unwrap_or(previous.pending_period),
    })
}

fn parse_result<T: serde::de::DeserializeOwned>(result: &Value) -> Result<T, ThresholdError> {
    serde_json::from_value(result.clone()).map_err(|err| ThresholdError::ValidationError(format!("malformed result: {}", err)))
}

pub struct DeploymentApp;

#[async_trait]
impl App for DeploymentApp {
    type Method = DeploymentMethod;

    const NAME: &'static str = DEPLOYMENT_APP_NAME;
    const APP_ID: Option<&'static str> = Some(DEPLOYMENT_APP_ID);
    const AUDIENCE: ConfirmAudience = ConfirmAudience::Network;

    async fn validate_request(&self, ctx: &AppCallContext<'_>, method: DeploymentMethod, request: &AppRequest) -> Result<(), ThresholdError> {
        match method {
            DeploymentMethod::RandomSeed => {
                let app_id = seed_target(request)?;
                let info = ctx.repository.get_last_deployment_info(&app_id)?;
                if info.deployed && info.status != Some(ContextStatus::Pending) {
                    return Err(ThresholdError::ValidationError(format!(
                        "app {} is deployed with status {}; a seed is drawn only before deployment or while PENDING",
                        app_id,
                        info.status.map(|s| s.as_str()).unwrap_or("-")
                    )));
                }
                Ok(())
            }
            DeploymentMethod::Deploy => {
                let selection = deploy_selection(ctx, request).await?;
                ensure_unused_seed(ctx, &selection.app_id, &selection.seed)?;
                let info = ctx.repository.get_last_deployment_info(&selection.app_id)?;
                if info.deployed || info.status == Some(ContextStatus::TssGroupSelected) {
                    return Err(ThresholdError::ValidationError(format!(
                        "app {} already deployed with status {}",
                        selection.app_id,
                        info.status.map(|s| s.as_str()).unwrap_or("-")
                    )));
                }
                Ok(())
            }
            DeploymentMethod::KeyGen => {
                let context = target_context(ctx, request)?;
                ensure_status(&context, ctx.now_nanos, &[ContextStatus::TssGroupSelected])?;
                if context.previous_seed.is_some() {
                    return Err(ThresholdError::ValidationError(format!("{} is a rotation; use tss-reshare", context.key_label())));
                }
                Ok(())
            }
            DeploymentMethod::Rotate => {
                let previous = last_context(ctx, request)?;
                ensure_status(&previous, ctx.now_nanos, &[ContextStatus::Pending, ContextStatus::Expired])?;
                let selection = rotate_selection(ctx, request, &previous).await?;
                ensure_unused_seed(ctx, &selection.app_id, &selection.seed)
            }
            DeploymentMethod::Reshare => {
                let context = target_context(ctx, request)?;
                ensure_status(&context, ctx.now_nanos, &[ContextStatus::TssGroupSelected])?;
                let previous = previous_of(ctx, &context)?;
                ensure_status(&previous, ctx.now_nanos, &[ContextStatus::Pending, ContextStatus::Expired])
            }
        }
    }

    async fn on_arrive(&self, ctx: &AppCallContext<'_>, method: DeploymentMethod, request: &AppRequest) -> Result<Option<Value>, ThresholdError> {
        match method {
            DeploymentMethod::KeyGen => {
                let context = target_context(ctx, request)?;
                Ok(Some(ctx.parties.keygen(&context).await?.to_value()?))
            }
            DeploymentMethod::Reshare => {
                let context = target_context(ctx, request)?;
                let previous = previous_of(ctx, &context)?;
                Ok(Some(ctx.parties.reshare(&context, &previous).await?.to_value()?))
            }
            _ => Ok(None),
        }
    }

    async fn on_request(&self, ctx: &AppCallContext<'_>, method: DeploymentMethod, request: &AppRequest) -> Result<Value, ThresholdError> {
        match method {
            DeploymentMethod::RandomSeed => {
                Ok(json!({ "appId": seed_target(request)?.as_str(), "purpose": request.param_str("purpose").unwrap_or_default() }))
            }
            DeploymentMethod::Deploy => {
                let mut selection = deploy_selection(ctx, request).await?;
                selection.partners = select_party(&selection.seed, ctx.network, selection.t, selection.n)?;
                Ok(serde_json::to_value(selection)?)
            }
            DeploymentMethod::Rotate => {
                let previous = last_context(ctx, request)?;
                let mut selection = rotate_selection(ctx, request, &previous).await?;
                selection.partners =
                    rotate_party(&previous.party.partners, &selection.seed, ctx.network, selection.t, selection.n, ctx.tss.rotation_coefficient)?;
                Ok(serde_json::to_value(selection)?)
            }
            DeploymentMethod::KeyGen => {
                let context = target_context(ctx, request)?;
                let init = DkgInit::from_request(request)?;
                if init.dealers != context.party.partners {
                    return Err(ThresholdError::ValidationError(format!("key-gen dealers differ from partners of {}", context.key_label())));
                }
                Ok(serde_json::to_value(KeyResult::from_init(&context, &init)?)?)
            }
            DeploymentMethod::Reshare => {
                let context = target_context(ctx, request)?;
                let previous = previous_of(ctx, &context)?;
                let init = DkgInit::from_request(request)?;
                let polynomials = init.dealer_polynomials(context.party.t)?;
                let constants: Vec<_> = polynomials.iter().map(|p| p[0]).collect();
                verify_reshare_constants(&previous, &init.dealers, &constants)?;
                let result = KeyResult::from_init(&context, &init)?;
                if Some(&result.public_key) != previous.public_key.as_ref() {
                    return Err(ThresholdError::crypto("reshare", format!("{} would change the group key", context.key_label())));
                }
                Ok(serde_json::to_value(result)?)
            }
        }
    }

    fn sign_params(&self, method: DeploymentMethod, _request: &AppRequest, result: &Value) -> Result<Vec<TypedValue>, ThresholdError> {
        match method {
            DeploymentMethod::RandomSeed => {
                let app_id = result.get("appId").and_then(Value::as_str).ok_or_else(|| invalid_param("appId", "missing from result"))?;
                let purpose = result.get("purpose").and_then(Value::as_str).unwrap_or_default();
                Ok(vec![TypedValue::string(method.as_str()), TypedValue::string(app_id), TypedValue::string(purpose)])
            }
            DeploymentMethod::Deploy | DeploymentMethod::Rotate => Ok(parse_result::<PartySelection>(result)?.sign_params()),
            DeploymentMethod::KeyGen | DeploymentMethod::Reshare => Ok(parse_result::<KeyResult>(result)?.sign_params()),
        }
    }

    async fn on_confirm(&self, ctx: &AppCallContext<'_>, method: DeploymentMethod, request: &AppRequest) -> Result<(), ThresholdError> {
        match method {
            DeploymentMethod::RandomSeed => Ok(()),
            DeploymentMethod::Deploy | DeploymentMethod::Rotate => {
                let selection: PartySelection = parse_result(&request.data.result)?;
                let context = selection.to_context(request.started_at, request.req_id);
                ctx.parties.install_party(&context)?;
                info!("party installed key={} partners={:?} method={}", context.key_label(), context.party.partners, method.as_str());
                let consumed = SeedRecord { req_id: RequestId::from_str(required_str(request, "seedReqId")?)?, seed: selection.seed };
                if ctx.memory.delete_if(&seed_record_key(&selection.app_id), &serde_json::to_value(consumed)?).await? {
                    debug!("random seed consumed app_id={} req_id={:#x}", selection.app_id, request.req_id);
                }
                Ok(())
            }
            DeploymentMethod::KeyGen | DeploymentMethod::Reshare => {
                let key: KeyResult = parse_result(&request.data.result)?;
                let deployed_at = request.confirmed_at.unwrap_or(ctx.now_nanos);
                let installed =
                    ctx.parties.install_key(&key.app_id, &key.seed, &key.dkg_id, &key.public_key, &key.commitments, request.req_id, deployed_at)?;
                if installed {
                    info!("group key installed app_id={} seed={} address={}", key.app_id, key.seed, key.public_key.address);
                }
                Ok(())
            }
        }
    }

    fn on_mem_write(&self, method: DeploymentMethod, request: &AppRequest) -> Result<Vec<MemWrite>, ThresholdError> {
        if method != DeploymentMethod::RandomSeed {
            return Ok(Vec::new());
        }
        let app_id =
            request.data.result.get("appId").and_then(Value::as_str).map(AppId::from).ok_or_else(|| invalid_param("appId", "missing from result"))?;
        let record = SeedRecord { req_id: request.req_id, seed: random_seed_of(request)? };
        Ok(vec![MemWrite {
            key: seed_record_key(&app_id),
            data: serde_json::to_value(record)?,
            ttl: Some(Duration::from_secs(RANDOM_SEED_TTL_SECS)),
        }])
    }
}
