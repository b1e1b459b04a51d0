#[path = "quorum-node/cli.rs"]
mod cli;
#[path = "quorum-node/setup.rs"]
mod setup;

use crate::cli::Cli;
use log::{info, warn};
use quorum_core::infrastructure::rpc::IpcBus;
use quorum_service::api::{run_gateway, ApiState};
use quorum_service::apps::{SIMPLE_ORACLE_NAME, USER_LOCK_NAME};
use quorum_service::service::{run_request_worker, Devnet, DevnetOptions, GarbageCollector, LeaderScheduler, Metrics, ReshareJob};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const STATUS_REPORT_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse_args();
    args.apply_to_env();
    let app_config = setup::load_app_config(args.profile.as_deref())?;
    setup::init_logging(&args, &app_config)?;
    info!("quorum-node starting profile={}", args.profile.as_deref().unwrap_or("-"));
    if !setup::validate_startup_config(&app_config) {
        return Ok(());
    }
    setup::log_startup_banner(&app_config);

    let metrics = Arc::new(Metrics::new()?);
    let options = DevnetOptions::from_config(&app_config, Path::new(&app_config.node.data_dir));
    let devnet = Devnet::start(options, metrics.clone()).await?;

    let tss = &app_config.tss;
    for app in [SIMPLE_ORACLE_NAME, USER_LOCK_NAME] {
        match devnet.deploy_app(app, tss.default_threshold, tss.default_party_size).await {
            Ok(context) => info!("demo app ready app={} app_id={} seed={}", app, context.app_id, context.seed),
            Err(err) => warn!("demo app deploy failed app={} error={}", app, err),
        }
    }

    let runtime = &app_config.runtime;
    let gateway = devnet.gateway();
    let (bus, rx) = IpcBus::new(runtime.ipc_capacity);
    tokio::spawn(run_request_worker(bus.clone(), rx, gateway.coordinator.clone()));

    for node in &devnet.nodes {
        let gc = GarbageCollector::new(node.services.clone(), Duration::from_secs(runtime.request_ttl_secs)).with_memory(node.memory.clone());
        tokio::spawn(Arc::new(gc).run(Duration::from_secs(runtime.gc_interval_secs)));
    }

    if app_config.scheduler.enabled {
        for node in devnet.nodes.iter().filter(|node| devnet.deployers.contains(&node.id)) {
            let mut scheduler =
                LeaderScheduler::new(node.id.clone(), devnet.deployers.clone(), app_config.scheduler.schedule()).with_metrics(metrics.clone());
            scheduler.add_job(Arc::new(ReshareJob::new(node.coordinator.clone())));
            tokio::spawn(Arc::new(scheduler).run(Duration::from_secs(app_config.scheduler.tick_secs)));
        }
    }
    spawn_status_reporter(metrics.clone());

    if app_config.rpc.enabled {
        let addr: SocketAddr = app_config.rpc.addr.parse()?;
        let state = Arc::new(ApiState {
            node_id: gateway.id.clone(),
            bus,
            metrics,
            storage: gateway.services.repository.storage().clone(),
            call_timeout: runtime.request_timeout() * 2,
        });
        tokio::select! {
            result = run_gateway(addr, state) => result?,
            _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
        }
    } else {
        tokio::signal::ctrl_c().await?;
        info!("shutdown requested");
    }
    Ok(())
}

fn spawn_status_reporter(metrics: Arc<Metrics>) {
    tokio::spawn(async move {
        info!("status reporter started interval_seconds={}", STATUS_REPORT_INTERVAL.as_secs());
        let mut interval = tokio::time::interval(STATUS_REPORT_INTERVAL);
        loop {
            interval.tick().await;
            let snapshot = metrics.snapshot();
            info!(
                "periodic status report uptime_minutes={} requests_arrived={} requests_confirmed={} requests_failed={} requests_timed_out={} partials_accepted={} partials_rejected={} contexts_saved={} gateway_ok={} gateway_error={}",
                snapshot.uptime.as_secs() / 60,
                snapshot.requests_arrived,
                snapshot.requests_confirmed,
                snapshot.requests_failed,
                snapshot.requests_timed_out,
                snapshot.partials_accepted,
                snapshot.partials_rejected,
                snapshot.contexts_saved,
                snapshot.gateway_ok,
                snapshot.gateway_error
            );
        }
    });
}
