#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use quorum_core::infrastructure::rpc::IpcBus;
use quorum_service::api::{build_router, ApiState};
use quorum_service::service::{run_request_worker, Devnet, Metrics};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Router on the devnet gateway with a live request worker behind the IPC bus.
pub fn gateway_router(devnet: &Devnet, metrics: Arc<Metrics>) -> Router {
    let gateway = devnet.gateway();
    let (bus, rx) = IpcBus::new(64);
    tokio::spawn(run_request_worker(bus.clone(), rx, gateway.coordinator.clone()));
    build_router(Arc::new(ApiState {
        node_id: gateway.id.clone(),
        bus,
        metrics,
        storage: gateway.services.repository.storage().clone(),
        call_timeout: Duration::from_secs(10),
    }))
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    (status, String::from_utf8_lossy(&body).into_owned())
}

pub async fn post_json(router: &Router, path: &str, body: &Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    let (status, text) = send(router, request).await;
    (status, serde_json::from_str(&text).expect("json reply"))
}

pub async fn get_json(router: &Router, path: &str) -> (StatusCode, Value) {
    let request = Request::builder().method("GET").uri(path).body(Body::empty()).expect("request");
    let (status, text) = send(router, request).await;
    (status, serde_json::from_str(&text).expect("json reply"))
}
