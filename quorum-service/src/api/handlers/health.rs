use super::super::state::ApiState;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{debug, trace};
use std::sync::Arc;

pub async fn handle_health() -> impl IntoResponse {
    trace!("health check: ok");
    Json(serde_json::json!({
        "status": "healthy",
    }))
}

pub async fn handle_ready(State(state): State<Arc<ApiState>>) -> Response {
    let storage_ok = state.storage.health_check().is_ok();
    let pending_calls = state.bus.pending_calls();
    let status = if storage_ok { "ready" } else { "degraded" };
    if !storage_ok {
        debug!("ready check: degraded node_id={} storage_ok={}", state.node_id, storage_ok);
    }
    Json(serde_json::json!({
        "status": status,
        "node_id": state.node_id.as_str(),
        "storage_ok": storage_ok,
        "pending_calls": pending_calls,
    }))
    .into_response()
}

pub async fn handle_metrics(State(state): State<Arc<ApiState>>) -> Response {
    match state.metrics.encode() {
        Ok(body) => {
            let mut response = body.into_response();
            response.headers_mut().insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"));
            response
        }
        Err(err) => {
            debug!("metrics encode failed error={}", err);
            let mut response = format!("metrics_error: {}", err).into_response();
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}
