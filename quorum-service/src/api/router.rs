use super::handlers::gateway::{handle_status, handle_submit};
use super::handlers::health::{handle_health, handle_metrics, handle_ready};
use super::middleware::logging::logging_middleware;
use super::state::ApiState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use log::{error, info};
use quorum_core::foundation::{ThresholdError, MAX_MESSAGE_SIZE_BYTES};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub async fn run_gateway(addr: SocketAddr, state: Arc<ApiState>) -> Result<(), ThresholdError> {
    info!("binding gateway addr={} node_id={}", addr, state.node_id);
    let app = build_router(state);
    let listener = TcpListener::bind(addr).await?;
    info!("gateway ready and accepting connections addr={}", addr);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await.map_err(|err| {
        error!("gateway terminated unexpectedly addr={} error={}", addr, err);
        ThresholdError::Message(err.to_string())
    })
}

pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/v1", post(handle_submit))
        .route("/v1/requests/:req_id", get(handle_status))
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .route("/metrics", get(handle_metrics))
        .layer(DefaultBodyLimit::max(MAX_MESSAGE_SIZE_BYTES))
        .layer(axum::middleware::from_fn(logging_middleware))
        .with_state(state)
}
