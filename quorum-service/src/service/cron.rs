//! Periodic jobs run by the elected leader of each leading period.

use crate::service::metrics::Metrics;
use async_trait::async_trait;
use log::{debug, info, warn};
use quorum_core::application::apps::deployment::PartySelection;
use quorum_core::application::{RequestCoordinator, Submission};
use quorum_core::domain::scheduler::{leader_of, LeaderSchedule};
use quorum_core::domain::{AppContext, ContextStatus};
use quorum_core::foundation::util::time::{nanos_to_secs, now_nanos};
use quorum_core::foundation::{AppId, NodeId, Seed, ThresholdError, DEPLOYMENT_APP_ID, DEPLOYMENT_APP_NAME};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[async_trait]
pub trait CronJob: Send + Sync {
    fn id(&self) -> &str;
    async fn run(&self) -> Result<(), ThresholdError>;
}

/// Outcome of one job evaluation at a tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobTick {
    Ran,
    Failed(String),
    /// Another deployer leads this period, or the period is in its gap.
    NotLeader,
    /// Already attempted in this period.
    Done,
}

pub struct LeaderScheduler {
    node_id: NodeId,
    deployers: Vec<NodeId>,
    schedule: LeaderSchedule,
    jobs: Vec<Arc<dyn CronJob>>,
    attempted: Mutex<HashMap<String, u64>>,
    metrics: Option<Arc<Metrics>>,
}

impl LeaderScheduler {
    pub fn new(node_id: NodeId, deployers: Vec<NodeId>, schedule: LeaderSchedule) -> Self {
        Self { node_id, deployers, schedule, jobs: Vec::new(), attempted: Mutex::new(HashMap::new()), metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn add_job(&mut self, job: Arc<dyn CronJob>) {
        self.jobs.push(job);
    }

    pub fn job_ids(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.id()).collect()
    }

    /// Runs every job this node leads at `now_secs`, at most once per leading period. A failed run
    /// is retried in the next period the node leads.
    pub async fn tick_at(&self, now_secs: u64) -> Vec<(String, JobTick)> {
        let period = self.schedule.period_index(now_secs);
        let mut outcomes = Vec::with_capacity(self.jobs.len());
        for job in &self.jobs {
            let id = job.id().to_string();
            let outcome = self.tick_job(job.as_ref(), &id, now_secs, period).await;
            outcomes.push((id, outcome));
        }
        outcomes
    }

    async fn tick_job(&self, job: &dyn CronJob, id: &str, now_secs: u64, period: u64) -> JobTick {
        if leader_of(id, &self.deployers, now_secs, &self.schedule).as_ref() != Some(&self.node_id) {
            return JobTick::NotLeader;
        }
        match self.attempted.lock() {
            Ok(mut attempted) => {
                if attempted.get(id) == Some(&period) {
                    return JobTick::Done;
                }
                attempted.insert(id.to_string(), period);
            }
            Err(_) => return JobTick::Failed("scheduler state poisoned".to_string()),
        }
        debug!("cron job starting job={} node_id={} period={}", id, self.node_id, period);
        match job.run().await {
            Ok(()) => {
                info!("cron job finished job={} period={}", id, period);
                self.record(id, "ok");
                JobTick::Ran
            }
            Err(err) => {
                warn!("cron job failed job={} period={} error={}", id, period, err);
                self.record(id, "error");
                JobTick::Failed(err.to_string())
            }
        }
    }

    fn record(&self, job: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_cron_run(job, outcome);
        }
    }

    pub async fn run(self: Arc<Self>, tick: Duration) {
        info!("leader scheduler started node_id={} jobs={:?} tick_secs={}", self.node_id, self.job_ids(), tick.as_secs());
        let mut interval = tokio::time::interval(tick.max(Duration::from_secs(1)));
        loop {
            interval.tick().await;
            self.tick_at(nanos_to_secs(now_nanos())).await;
        }
    }
}

pub const RESHARE_JOB_ID: &str = "tss-reshare";

/// Rotates every app whose latest context is PENDING or EXPIRED onto a fresh party holding the
/// same group key, and finishes rotations whose reshare never completed.
pub struct ReshareJob {
    coordinator: Arc<RequestCoordinator>,
}

impl ReshareJob {
    pub fn new(coordinator: Arc<RequestCoordinator>) -> Self {
        Self { coordinator }
    }

    async fn rotate(&self, latest: &AppContext) -> Result<Seed, ThresholdError> {
        let seed_request = self
            .coordinator
            .submit(Submission::new(DEPLOYMENT_APP_NAME, "random-seed", json!({ "appId": latest.app_id.as_str(), "purpose": RESHARE_JOB_ID })))
            .await?;
        let params = json!({ "appId": latest.app_id.as_str(), "seedReqId": seed_request.req_id.to_string() });
        let rotated = self.coordinator.submit(Submission::new(DEPLOYMENT_APP_NAME, "tss-rotate", params)).await?;
        let selection: PartySelection = serde_json::from_value(rotated.data.result)?;
        info!("context rotated app_id={} previous={} seed={} partners={:?}", selection.app_id, latest.seed, selection.seed, selection.partners);
        Ok(selection.seed)
    }

    async fn reshare(&self, app_id: &AppId, seed: &Seed) -> Result<(), ThresholdError> {
        let params = json!({ "appId": app_id.as_str(), "seed": seed.as_str() });
        self.coordinator.submit(Submission::new(DEPLOYMENT_APP_NAME, "tss-reshare", params)).await?;
        info!("context reshared app_id={} seed={}", app_id, seed);
        Ok(())
    }

    async fn refresh(&self, latest: &AppContext, now: u64) -> Result<bool, ThresholdError> {
        match latest.status_at(now) {
            ContextStatus::Pending | ContextStatus::Expired => {
                let seed = self.rotate(latest).await?;
                self.reshare(&latest.app_id, &seed).await?;
                Ok(true)
            }
            ContextStatus::TssGroupSelected if latest.previous_seed.is_some() => {
                self.reshare(&latest.app_id, &latest.seed).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl CronJob for ReshareJob {
    fn id(&self) -> &str {
        RESHARE_JOB_ID
    }

    async fn run(&self) -> Result<(), ThresholdError> {
        let repository = &self.coordinator.services().repository;
        let app_ids: BTreeSet<String> = repository
            .list_all_contexts()?
            .into_iter()
            .map(|context| context.app_id.to_string())
            .filter(|app_id| app_id != DEPLOYMENT_APP_ID)
            .collect();
        let now = now_nanos();
        let mut failed = Vec::new();
        for app_id in app_ids {
            let app_id = AppId::from(app_id);
            let Some(latest) = repository.list_contexts(&app_id)?.pop() else {
                continue;
            };
            match self.refresh(&latest, now).await {
                Ok(true) => {}
                Ok(false) => debug!("reshare not needed app_id={} seed={} status={}", app_id, latest.seed, latest.status_at(now)),
                Err(err) => {
                    warn!("reshare failed app_id={} seed={} error={}", app_id, latest.seed, err);
                    failed.push(app_id.to_string());
                }
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(ThresholdError::Message(format!("reshare failed for apps {:?}", failed)))
        }
    }
}
