use crate::domain::context::AppContext;
use crate::domain::request::RequestStatus;
use crate::foundation::{NodeId, RequestId};
use log::{debug, info, trace, warn};
use std::sync::Arc;

/// Hooks into the request and key lifecycle. Every method defaults to a no-op.
pub trait LifecycleObserver: Send + Sync {
    fn on_request_arrived(&self, _req_id: &RequestId, _app: &str, _method: &str) {}
    fn on_status_changed(&self, _req_id: &RequestId, _from: RequestStatus, _to: RequestStatus) {}
    fn on_partial_accepted(&self, _req_id: &RequestId, _partner: &NodeId) {}
    fn on_partial_rejected(&self, _req_id: &RequestId, _partner: &NodeId, _reason: &str) {}
    fn on_confirmed(&self, _req_id: &RequestId, _signers: &[NodeId], _elapsed_ms: u64) {}
    fn on_failed(&self, _req_id: &RequestId, _status: RequestStatus, _reason: &str) {}
    fn on_context_saved(&self, _context: &AppContext) {}
}

pub struct NoopObserver;

impl LifecycleObserver for NoopObserver {}

pub struct CompositeObserver {
    observers: Vec<Arc<dyn LifecycleObserver>>,
}

impl CompositeObserver {
    pub fn new() -> Self {
        Self { observers: Vec::new() }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn LifecycleObserver>) {
        self.observers.push(observer);
    }
}

impl Default for CompositeObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleObserver for CompositeObserver {
    fn on_request_arrived(&self, req_id: &RequestId, app: &str, method: &str) {
        debug!("request arrived req_id={:#x} app={} method={}", req_id, app, method);
        for observer in &self.observers {
            observer.on_request_arrived(req_id, app, method);
        }
    }

    fn on_status_changed(&self, req_id: &RequestId, from: RequestStatus, to: RequestStatus) {
        trace!("on_status_changed dispatch observer_count={} req_id={:#x}", self.observers.len(), req_id);
        for observer in &self.observers {
            observer.on_status_changed(req_id, from, to);
        }
    }

    fn on_partial_accepted(&self, req_id: &RequestId, partner: &NodeId) {
        debug!("partial accepted req_id={:#x} partner={}", req_id, partner);
        for observer in &self.observers {
            observer.on_partial_accepted(req_id, partner);
        }
    }

    fn on_partial_rejected(&self, req_id: &RequestId, partner: &NodeId, reason: &str) {
        warn!("partial rejected req_id={:#x} partner={} reason={}", req_id, partner, reason);
        for observer in &self.observers {
            observer.on_partial_rejected(req_id, partner, reason);
        }
    }

    fn on_confirmed(&self, req_id: &RequestId, signers: &[NodeId], elapsed_ms: u64) {
        info!("request confirmed req_id={:#x} signers={} elapsed_ms={}", req_id, signers.len(), elapsed_ms);
        for observer in &self.observers {
            observer.on_confirmed(req_id, signers, elapsed_ms);
        }
    }

    fn on_failed(&self, req_id: &RequestId, status: RequestStatus, reason: &str) {
        warn!("request failed req_id={:#x} status={} reason={}", req_id, status, reason);
        for observer in &self.observers {
            observer.on_failed(req_id, status, reason);
        }
    }

    fn on_context_saved(&self, context: &AppContext) {
        for observer in &self.observers {
            observer.on_context_saved(context);
        }
    }
}
