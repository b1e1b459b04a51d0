use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use log::{debug, trace, warn};
use std::net::SocketAddr;
use std::time::Instant;

fn content_length(headers: &axum::http::HeaderMap) -> u64 {
    headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0)
}

/// One line per gateway call; health checks log at trace, client and server errors at warn.
pub async fn logging_middleware(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let client_ip = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| addr.ip().to_string()).unwrap_or_default();
    let request_body_size = content_length(req.headers());
    let start = Instant::now();

    let response = next.run(req).await;

    let duration_ms = start.elapsed().as_millis();
    let status = response.status().as_u16();
    if matches!(path.as_str(), "/health" | "/ready" | "/metrics") {
        trace!("health check client_ip={} path={} status={} duration_ms={}", client_ip, path, status, duration_ms);
    } else if response.status().is_client_error() || response.status().is_server_error() {
        warn!(
            "gateway call rejected client_ip={} method={} path={} status={} duration_ms={} request_body_size={}",
            client_ip, method, path, status, duration_ms, request_body_size
        );
    } else {
        debug!(
            "gateway call client_ip={} method={} path={} status={} duration_ms={} request_body_size={} response_body_size={}",
            client_ip,
            method,
            path,
            status,
            duration_ms,
            request_body_size,
            content_length(response.headers())
        );
    }
    response
}
