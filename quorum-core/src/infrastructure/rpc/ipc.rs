//! In-process bus between front ends (gateway, scheduler) and the request worker.
//!
//! Calls are correlated by a call id; each call carries `{method, params}` and resolves to
//! `{response?, error?}`. Broadcasts carry `{type, data}` and expect no reply.

use crate::foundation::ThresholdError;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IpcResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    pub fn ok(response: Value) -> Self {
        Self { response: Some(response), error: None }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self { response: None, error: Some(error.into()) }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IpcBroadcast {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

/// A call as seen by the worker.
#[derive(Debug)]
pub struct IpcEnvelope {
    pub call_id: u64,
    pub request: IpcRequest,
}

#[derive(Clone, Debug, PartialEq)]
pub enum IpcTimeoutPolicy {
    Reject,
    /// Resolve with this value instead of failing.
    ResolveWith(Value),
}

pub struct IpcBus {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<IpcResponse>>>,
    worker_tx: mpsc::Sender<IpcEnvelope>,
    broadcast_tx: broadcast::Sender<IpcBroadcast>,
}

impl IpcBus {
    /// Creates the bus and the receiving end the worker drains.
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<IpcEnvelope>) {
        let (worker_tx, worker_rx) = mpsc::channel(capacity.max(1));
        let (broadcast_tx, _) = broadcast::channel(capacity.max(1));
        let bus = Arc::new(Self { next_id: AtomicU64::new(1), pending: Mutex::new(HashMap::new()), worker_tx, broadcast_tx });
        (bus, worker_rx)
    }

    fn lock_pending(&self) -> Result<MutexGuard<'_, HashMap<u64, oneshot::Sender<IpcResponse>>>, ThresholdError> {
        self.pending.lock().map_err(|_| ThresholdError::transport("ipc pending", "poisoned"))
    }

    /// Sends `request` to the worker and waits for its answer.
    pub async fn call(&self, request: IpcRequest, timeout: Duration, policy: IpcTimeoutPolicy) -> Result<Value, ThresholdError> {
        let call_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.lock_pending()?.insert(call_id, tx);
        let method = request.method.clone();
        if self.worker_tx.send(IpcEnvelope { call_id, request }).await.is_err() {
            self.lock_pending()?.remove(&call_id);
            return Err(ThresholdError::transport("ipc call", "worker is gone"));
        }
        let outcome = tokio::time::timeout(timeout, rx).await;
        match outcome {
            Ok(Ok(response)) => match (response.response, response.error) {
                (_, Some(error)) => Err(ThresholdError::transport("ipc call", error)),
                (Some(value), None) => Ok(value),
                (None, None) => Ok(Value::Null),
            },
            Ok(Err(_)) => Err(ThresholdError::transport("ipc call", "worker dropped the call")),
            Err(_) => {
                self.lock_pending()?.remove(&call_id);
                debug!("ipc call timed out call_id={} method={} timeout_ms={}", call_id, method, timeout.as_millis());
                match policy {
                    IpcTimeoutPolicy::Reject => Err(ThresholdError::PeerTimeout { peer: "ipc-worker".to_string(), timeout_ms: timeout.as_millis() as u64 }),
                    IpcTimeoutPolicy::ResolveWith(value) => Ok(value),
                }
            }
        }
    }

    /// Delivers the worker's answer; late answers for abandoned calls are dropped.
    pub fn respond(&self, call_id: u64, response: IpcResponse) -> Result<(), ThresholdError> {
        let Some(tx) = self.lock_pending()?.remove(&call_id) else {
            warn!("ipc response for unknown call call_id={}", call_id);
            return Ok(());
        };
        let _ = tx.send(response);
        Ok(())
    }

    pub fn publish(&self, kind: impl Into<String>, data: Value) -> usize {
        self.broadcast_tx.send(IpcBroadcast { kind: kind.into(), data }).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IpcBroadcast> {
        self.broadcast_tx.subscribe()
    }

    pub fn pending_calls(&self) -> usize {
        self.lock_pending().map(|pending| pending.len()).unwrap_or(0)
    }
}
