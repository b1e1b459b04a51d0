use log::debug;
use prometheus::{Encoder, IntCounter, IntCounterVec, Registry, TextEncoder};
use quorum_core::application::LifecycleObserver;
use quorum_core::domain::{AppContext, RequestStatus};
use quorum_core::foundation::{NodeId, RequestId, ThresholdError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub uptime: Duration,
    pub requests_arrived: u64,
    pub requests_confirmed: u64,
    pub requests_failed: u64,
    pub requests_timed_out: u64,
    pub partials_accepted: u64,
    pub partials_rejected: u64,
    pub contexts_saved: u64,
    pub gateway_ok: u64,
    pub gateway_error: u64,
}

pub struct Metrics {
    registry: Registry,
    requests_total: IntCounterVec,
    partials_total: IntCounterVec,
    contexts_saved_total: IntCounter,
    gateway_requests_total: IntCounterVec,
    cron_runs_total: IntCounterVec,
    started_at: Instant,
    requests_arrived: AtomicU64,
    requests_confirmed: AtomicU64,
    requests_failed: AtomicU64,
    requests_timed_out: AtomicU64,
    partials_accepted: AtomicU64,
    partials_rejected: AtomicU64,
    contexts_saved: AtomicU64,
    gateway_ok: AtomicU64,
    gateway_error: AtomicU64,
}

fn metric_err(err: prometheus::Error) -> ThresholdError {
    ThresholdError::MetricsError { operation: "prometheus".to_string(), details: err.to_string() }
}

impl Metrics {
    pub fn new() -> Result<Self, ThresholdError> {
        debug!("initializing prometheus metrics");
        let registry = Registry::new();
        let requests_total =
            IntCounterVec::new(prometheus::Opts::new("quorum_requests_total", "Requests by lifecycle stage"), &["stage"]).map_err(metric_err)?;
        let partials_total =
            IntCounterVec::new(prometheus::Opts::new("quorum_partials_total", "Partner partials by verdict"), &["accepted"]).map_err(metric_err)?;
        let contexts_saved_total = IntCounter::new("quorum_contexts_saved_total", "Context records written").map_err(metric_err)?;
        let gateway_requests_total =
            IntCounterVec::new(prometheus::Opts::new("quorum_gateway_requests_total", "Gateway calls by app and status"), &["app", "status"])
                .map_err(metric_err)?;
        let cron_runs_total =
            IntCounterVec::new(prometheus::Opts::new("quorum_cron_runs_total", "Scheduled job runs by outcome"), &["job", "outcome"])
                .map_err(metric_err)?;

        registry.register(Box::new(requests_total.clone())).map_err(metric_err)?;
        registry.register(Box::new(partials_total.clone())).map_err(metric_err)?;
        registry.register(Box::new(contexts_saved_total.clone())).map_err(metric_err)?;
        registry.register(Box::new(gateway_requests_total.clone())).map_err(metric_err)?;
        registry.register(Box::new(cron_runs_total.clone())).map_err(metric_err)?;

        let out = Self {
            registry,
            requests_total,
            partials_total,
            contexts_saved_total,
            gateway_requests_total,
            cron_runs_total,
            started_at: Instant::now(),
            requests_arrived: AtomicU64::new(0),
            requests_confirmed: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            requests_timed_out: AtomicU64::new(0),
            partials_accepted: AtomicU64::new(0),
            partials_rejected: AtomicU64::new(0),
            contexts_saved: AtomicU64::new(0),
            gateway_ok: AtomicU64::new(0),
            gateway_error: AtomicU64::new(0),
        };
        debug!("prometheus metrics registered metric_count=5");
        Ok(out)
    }

    fn inc_request_stage(&self, stage: &str) {
        self.requests_total.with_label_values(&[stage]).inc();
        let counter = match stage {
            "arrived" => &self.requests_arrived,
            "confirmed" => &self.requests_confirmed,
            "failed" => &self.requests_failed,
            "timed_out" => &self.requests_timed_out,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_partial(&self, accepted: bool) {
        let label = if accepted { "true" } else { "false" };
        self.partials_total.with_label_values(&[label]).inc();
        if accepted {
            self.partials_accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.partials_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_gateway_request(&self, app: &str, status: &str) {
        self.gateway_requests_total.with_label_values(&[app, status]).inc();
        match status {
            "ok" => {
                self.gateway_ok.fetch_add(1, Ordering::Relaxed);
            }
            "error" => {
                self.gateway_error.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn inc_cron_run(&self, job: &str, outcome: &str) {
        self.cron_runs_total.with_label_values(&[job, outcome]).inc();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime: self.started_at.elapsed(),
            requests_arrived: self.requests_arrived.load(Ordering::Relaxed),
            requests_confirmed: self.requests_confirmed.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            requests_timed_out: self.requests_timed_out.load(Ordering::Relaxed),
            partials_accepted: self.partials_accepted.load(Ordering::Relaxed),
            partials_rejected: self.partials_rejected.load(Ordering::Relaxed),
            contexts_saved: self.contexts_saved.load(Ordering::Relaxed),
            gateway_ok: self.gateway_ok.load(Ordering::Relaxed),
            gateway_error: self.gateway_error.load(Ordering::Relaxed),
        }
    }

    pub fn encode(&self) -> Result<String, ThresholdError> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer).map_err(metric_err)?;
        String::from_utf8(buffer).map_err(|err| ThresholdError::Message(err.to_string()))
    }
}

impl LifecycleObserver for Metrics {
    fn on_request_arrived(&self, _req_id: &RequestId, _app: &str, _method: &str) {
        self.inc_request_stage("arrived");
    }

    fn on_partial_accepted(&self, _req_id: &RequestId, _partner: &NodeId) {
        self.inc_partial(true);
    }

    fn on_partial_rejected(&self, _req_id: &RequestId, _partner: &NodeId, _reason: &str) {
        self.inc_partial(false);
    }

    fn on_confirmed(&self, _req_id: &RequestId, _signers: &[NodeId], _elapsed_ms: u64) {
        self.inc_request_stage("confirmed");
    }

    fn on_failed(&self, _req_id: &RequestId, status: RequestStatus, _reason: &str) {
        match status {
            RequestStatus::TimedOut => self.inc_request_stage("timed_out"),
            _ => self.inc_request_stage("failed"),
        }
    }

    fn on_context_saved(&self, _context: &AppContext) {
        self.contexts_saved_total.inc();
        self.contexts_saved.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_hooks_feed_counters() {
        let metrics = Metrics::new().expect("metrics");
        let req_id = RequestId::new([1u8; 32]);
        metrics.on_request_arrived(&req_id, "simple_oracle", "echo");
        metrics.on_partial_accepted(&req_id, &NodeId::from("node-2"));
        metrics.on_partial_rejected(&req_id, &NodeId::from("node-3"), "hash mismatch");
        metrics.on_confirmed(&req_id, &[NodeId::from("node-1")], 12);
        metrics.on_failed(&RequestId::new([2u8; 32]), RequestStatus::TimedOut, "quorum");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_arrived, 1);
        assert_eq!(snapshot.requests_confirmed, 1);
        assert_eq!(snapshot.requests_timed_out, 1);
        assert_eq!(snapshot.requests_failed, 0);
        assert_eq!(snapshot.partials_accepted, 1);
        assert_eq!(snapshot.partials_rejected, 1);

        let text = metrics.encode().expect("encode");
        assert!(text.contains("quorum_requests_total{stage=\"confirmed\"} 1"));
        assert!(text.contains("quorum_partials_total{accepted=\"false\"} 1"));
    }
}
