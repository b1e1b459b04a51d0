#![allow(dead_code)]

use crate::fixtures::TEST_APP_NAME;
use async_trait::async_trait;
use quorum_core::application::{App, AppCallContext};
use quorum_core::domain::{AppMethod, AppRequest, MemWrite, TypedValue};
use quorum_core::foundation::ThresholdError;
use serde_json::{json, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EchoMethod {
    Echo,
}

impl AppMethod for EchoMethod {
    const ALL: &'static [Self] = &[Self::Echo];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Echo => "echo",
        }
    }
}

/// Echoes `params.value`. The node named by `params.divergeOn` answers something else, standing in
/// for a faulty or malicious partner.
pub struct EchoApp;

pub fn memory_key(value: &str) -> String {
    format!("echo:last:{}", value)
}

#[async_trait]
impl App for EchoApp {
    type Method = EchoMethod;

    const NAME: &'static str = TEST_APP_NAME;

    async fn validate_request(&self, _ctx: &AppCallContext<'_>, _method: EchoMethod, request: &AppRequest) -> Result<(), ThresholdError> {
        match request.param_str("value") {
            Some(_) => Ok(()),
            None => Err(ThresholdError::ValidationError("param value: missing".to_string())),
        }
    }

    async fn on_request(&self, ctx: &AppCallContext<'_>, _method: EchoMethod, request: &AppRequest) -> Result<Value, ThresholdError> {
        let value = request.param_str("value").unwrap_or_default();
        if request.param_str("divergeOn") == Some(ctx.node_id.as_str()) {
            return Ok(json!({ "value": format!("{}-diverged", value) }));
        }
        Ok(json!({ "value": value }))
    }

    fn sign_params(&self, _method: EchoMethod, _request: &AppRequest, result: &Value) -> Result<Vec<TypedValue>, ThresholdError> {
        let value = result.get("value").and_then(Value::as_str).unwrap_or_default();
        Ok(vec![TypedValue::string(value)])
    }

    fn on_mem_write(&self, _method: EchoMethod, request: &AppRequest) -> Result<Vec<MemWrite>, ThresholdError> {
        let value = request.data.result.get("value").and_then(Value::as_str).unwrap_or_default();
        Ok(vec![MemWrite { key: memory_key(value), data: Value::String(value.to_string()), ttl: None }])
    }
}
