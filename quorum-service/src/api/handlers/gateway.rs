use super::super::state::ApiState;
use crate::service::worker::{METHOD_REQUEST, METHOD_STATUS};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{debug, warn};
use quorum_core::application::Submission;
use quorum_core::foundation::ThresholdError;
use quorum_core::infrastructure::rpc::{IpcRequest, IpcTimeoutPolicy};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct GatewayReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn success(result: Value) -> Response {
    Json(GatewayReply { success: true, result: Some(result), error: None }).into_response()
}

fn failure(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(GatewayReply { success: false, result: None, error: Some(error.into()) })).into_response()
}

/// The worker's own message when the failure came back over the bus.
fn error_text(err: ThresholdError) -> String {
    match err {
        ThresholdError::TransportError { details, .. } => details,
        other => other.to_string(),
    }
}

pub async fn handle_submit(State(state): State<Arc<ApiState>>, payload: Result<Json<Submission>, JsonRejection>) -> Response {
    let submission = match payload {
        Ok(Json(submission)) => submission,
        Err(rejection) => {
            debug!("gateway rejected body error={}", rejection.body_text());
            return failure(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };
    let app = submission.app.clone();
    let params = match serde_json::to_value(&submission) {
        Ok(params) => params,
        Err(err) => return failure(StatusCode::BAD_REQUEST, err.to_string()),
    };
    let call = IpcRequest { method: METHOD_REQUEST.to_string(), params };
    match state.bus.call(call, state.call_timeout, IpcTimeoutPolicy::Reject).await {
        Ok(result) => {
            state.metrics.inc_gateway_request(&app, "ok");
            success(result)
        }
        Err(err) => {
            state.metrics.inc_gateway_request(&app, "error");
            let text = error_text(err);
            warn!("gateway request failed node_id={} app={} error={}", state.node_id, app, text);
            failure(StatusCode::OK, text)
        }
    }
}

pub async fn handle_status(State(state): State<Arc<ApiState>>, Path(req_id): Path<String>) -> Response {
    let call = IpcRequest { method: METHOD_STATUS.to_string(), params: json!({ "reqId": req_id }) };
    match state.bus.call(call, state.call_timeout, IpcTimeoutPolicy::ResolveWith(Value::Null)).await {
        Ok(Value::Null) => failure(StatusCode::NOT_FOUND, format!("request {} not found", req_id)),
        Ok(request) => success(request),
        Err(err) => failure(StatusCode::BAD_REQUEST, error_text(err)),
    }
}
