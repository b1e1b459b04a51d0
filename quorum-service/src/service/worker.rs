//! Drains the IPC bus: every call runs on its own task against the node's coordinator.

use quorum_core::application::{RequestCoordinator, Submission};
use quorum_core::foundation::{RequestId, ThresholdError};
use quorum_core::infrastructure::rpc::{IpcBus, IpcEnvelope, IpcRequest, IpcResponse};
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const METHOD_REQUEST: &str = "request";
pub const METHOD_STATUS: &str = "status";
pub const BROADCAST_CONFIRMED: &str = "request-confirmed";

pub async fn run_request_worker(bus: Arc<IpcBus>, mut rx: mpsc::Receiver<IpcEnvelope>, coordinator: Arc<RequestCoordinator>) {
    info!("request worker started node_id={}", coordinator.services().node_id);
    while let Some(envelope) = rx.recv().await {
        let bus = bus.clone();
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            let IpcEnvelope { call_id, request } = envelope;
            debug!("ipc call received call_id={} method={}", call_id, request.method);
            let response = match dispatch(&bus, &coordinator, request).await {
                Ok(value) => IpcResponse::ok(value),
                Err(err) => IpcResponse::err(err.to_string()),
            };
            if let Err(err) = bus.respond(call_id, response) {
                warn!("ipc respond failed call_id={} error={}", call_id, err);
            }
        });
    }
    info!("request worker stopped: bus closed");
}

async fn dispatch(bus: &IpcBus, coordinator: &RequestCoordinator, request: IpcRequest) -> Result<Value, ThresholdError> {
    match request.method.as_str() {
        METHOD_REQUEST => {
            let submission: Submission = serde_json::from_value(request.params)
                .map_err(|err| ThresholdError::ValidationError(format!("malformed submission: {}", err)))?;
            let outcome = coordinator.submit(submission).await?;
            if outcome.is_confirmed() {
                let receivers = bus.publish(
                    BROADCAST_CONFIRMED,
                    json!({ "reqId": outcome.req_id.to_string(), "app": outcome.app, "method": outcome.method }),
                );
                debug!("confirmation broadcast req_id={:#x} receivers={}", outcome.req_id, receivers);
            }
            Ok(serde_json::to_value(outcome)?)
        }
        METHOD_STATUS => {
            let raw = request
                .params
                .get("reqId")
                .and_then(Value::as_str)
                .ok_or_else(|| ThresholdError::ValidationError("param reqId: missing".to_string()))?;
            let req_id = RequestId::from_str(raw)?;
            match coordinator.services().repository.storage().get_request(&req_id)? {
                Some(stored) => Ok(serde_json::to_value(stored)?),
                None => Ok(Value::Null),
            }
        }
        other => Err(ThresholdError::ValidationError(format!("unknown ipc method {}", other))),
    }
}
