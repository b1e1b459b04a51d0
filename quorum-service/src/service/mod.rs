pub mod cron;
pub mod devnet;
pub mod gc;
pub mod metrics;
pub mod worker;

pub use cron::{CronJob, JobTick, LeaderScheduler, ReshareJob};
pub use devnet::{Devnet, DevnetNode, DevnetOptions};
pub use gc::{GarbageCollector, GcReport};
pub use metrics::Metrics;
pub use worker::run_request_worker;
