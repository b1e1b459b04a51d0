//! Periodic cleanup of request records, partial buckets, stale dealings and expired memory.

use log::{debug, info, warn};
use quorum_core::application::NodeServices;
use quorum_core::foundation::util::time::now_nanos;
use quorum_core::foundation::ThresholdError;
use quorum_core::infrastructure::shared_memory::InMemorySharedMemory;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GcReport {
    pub requests: usize,
    pub partials: usize,
    pub dealings: usize,
    pub memory: usize,
}

impl GcReport {
    pub fn total(&self) -> usize {
        self.requests + self.partials + self.dealings + self.memory
    }
}

pub struct GarbageCollector {
    services: Arc<NodeServices>,
    memory: Option<Arc<InMemorySharedMemory>>,
    request_ttl: Duration,
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

impl GarbageCollector {
    pub fn new(services: Arc<NodeServices>, request_ttl: Duration) -> Self {
        Self { services, memory: None, request_ttl }
    }

    /// Also sweeps expired entries of an in-process shared memory.
    pub fn with_memory(mut self, memory: Arc<InMemorySharedMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn sweep(&self, now: u64) -> Result<GcReport, ThresholdError> {
        let settings = &self.services.settings;
        let cutoff = now.saturating_sub(nanos(self.request_ttl));
        let report = GcReport {
            requests: self.services.repository.storage().delete_requests_before(cutoff)?,
            partials: self.services.partials.purge_older_than(nanos(settings.request_timeout).saturating_mul(2), now)?,
            dealings: self.services.parties.purge_stale(nanos(settings.tss.dkg_timeout()).saturating_mul(4), now)?,
            memory: match &self.memory {
                Some(memory) => memory.purge_expired()?,
                None => 0,
            },
        };
        if report.total() > 0 {
            info!(
                "gc sweep node_id={} requests={} partials={} dealings={} memory={}",
                self.services.node_id, report.requests, report.partials, report.dealings, report.memory
            );
        } else {
            debug!("gc sweep node_id={} nothing to collect", self.services.node_id);
        }
        Ok(report)
    }

    pub async fn run(self: Arc<Self>, every: Duration) {
        info!("gc loop started node_id={} interval_secs={} request_ttl_secs={}", self.services.node_id, every.as_secs(), self.request_ttl.as_secs());
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
        loop {
            interval.tick().await;
            if let Err(err) = self.sweep(now_nanos()) {
                warn!("gc sweep failed node_id={} error={}", self.services.node_id, err);
            }
        }
    }
}
