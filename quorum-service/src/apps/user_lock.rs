//! Per-user lock that can be taken once per cooldown.
//!
//! The gateway claims a short-lived pending key in `on_arrive` so concurrent requests for the same
//! user fail fast; after confirmation every node records the lock for the cooldown and drops the
//! pending claim. A failed request releases its own claim at once.

use async_trait::async_trait;
use log::debug;
use quorum_core::application::{App, AppCallContext};
use quorum_core::domain::{AppMethod, AppRequest, ConfirmAudience, MemWrite, TypedValue};
use quorum_core::foundation::ThresholdError;
use serde_json::{json, Value};
use std::time::Duration;

pub const USER_LOCK_NAME: &str = "user_lock";

const DEFAULT_COOLDOWN_SECS: u64 = 60;
const PENDING_TTL: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserLockMethod {
    Lock,
}

impl AppMethod for UserLockMethod {
    const ALL: &'static [Self] = &[Self::Lock];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Lock => "lock",
        }
    }
}

pub fn locked_key(user: &str) -> String {
    format!("{}:locked:{}", USER_LOCK_NAME, user)
}

pub fn pending_key(user: &str) -> String {
    format!("{}:pending:{}", USER_LOCK_NAME, user)
}

fn user_of(request: &AppRequest) -> Result<&str, ThresholdError> {
    request
        .param_str("user")
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ThresholdError::ValidationError("param user: missing".to_string()))
}

fn cooldown_of(request: &AppRequest) -> Result<u64, ThresholdError> {
    let cooldown = match request.param("cooldown") {
        None | Some(Value::Null) => DEFAULT_COOLDOWN_SECS,
        Some(value) => value.as_u64().ok_or_else(|| ThresholdError::ValidationError("param cooldown: expected seconds".to_string()))?,
    };
    if cooldown == 0 {
        return Err(ThresholdError::ValidationError("param cooldown: must be > 0".to_string()));
    }
    Ok(cooldown)
}

pub struct UserLock;

#[async_trait]
impl App for UserLock {
    type Method = UserLockMethod;

    const NAME: &'static str = USER_LOCK_NAME;
    // Every node must see the lock, gateways outside the party included.
    const AUDIENCE: ConfirmAudience = ConfirmAudience::Network;

    async fn validate_request(&self, ctx: &AppCallContext<'_>, _method: UserLockMethod, request: &AppRequest) -> Result<(), ThresholdError> {
        let user = user_of(request)?;
        cooldown_of(request)?;
        if ctx.memory.get(&locked_key(user)).await?.is_some() {
            return Err(ThresholdError::app(USER_LOCK_NAME, format!("user {} is locked", user)));
        }
        Ok(())
    }

    async fn on_arrive(&self, ctx: &AppCallContext<'_>, _method: UserLockMethod, request: &AppRequest) -> Result<Option<Value>, ThresholdError> {
        let user = user_of(request)?;
        let claimed = ctx.memory.set_if_absent(&pending_key(user), Value::String(request.req_id.to_string()), Some(PENDING_TTL)).await?;
        if !claimed {
            return Err(ThresholdError::app(USER_LOCK_NAME, format!("user {} has a lock in flight", user)));
        }
        Ok(None)
    }

    async fn on_request(&self, _ctx: &AppCallContext<'_>, _method: UserLockMethod, request: &AppRequest) -> Result<Value, ThresholdError> {
        Ok(json!({ "user": user_of(request)?, "cooldown": cooldown_of(request)? }))
    }

    fn sign_params(&self, _method: UserLockMethod, _request: &AppRequest, result: &Value) -> Result<Vec<TypedValue>, ThresholdError> {
        let user = result.get("user").and_then(Value::as_str).ok_or_else(|| ThresholdError::app(USER_LOCK_NAME, "result has no user"))?;
        let cooldown =
            result.get("cooldown").and_then(Value::as_u64).ok_or_else(|| ThresholdError::app(USER_LOCK_NAME, "result has no cooldown"))?;
        Ok(vec![TypedValue::string(user), TypedValue::uint(cooldown)])
    }

    async fn on_confirm(&self, ctx: &AppCallContext<'_>, _method: UserLockMethod, request: &AppRequest) -> Result<(), ThresholdError> {
        ctx.memory.delete(&pending_key(user_of(request)?)).await
    }

    async fn on_failed(&self, ctx: &AppCallContext<'_>, _method: UserLockMethod, request: &AppRequest) -> Result<(), ThresholdError> {
        let user = user_of(request)?;
        if ctx.memory.delete_if(&pending_key(user), &Value::String(request.req_id.to_string())).await? {
            debug!("lock claim released user={} req_id={:#x}", user, request.req_id);
        }
        Ok(())
    }

    fn on_mem_write(&self, _method: UserLockMethod, request: &AppRequest) -> Result<Vec<MemWrite>, ThresholdError> {
        let result = &request.data.result;
        let user = result.get("user").and_then(Value::as_str).ok_or_else(|| ThresholdError::app(USER_LOCK_NAME, "result has no user"))?;
        let cooldown = result.get("cooldown").and_then(Value::as_u64).unwrap_or(DEFAULT_COOLDOWN_SECS);
        Ok(vec![MemWrite {
            key: locked_key(user),
            data: json!({ "reqId": request.req_id.to_string(), "until": request.confirmed_at }),
            ttl: Some(Duration::from_secs(cooldown)),
        }])
    }
}
