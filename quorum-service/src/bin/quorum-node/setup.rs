use crate::cli::Cli;
use log::{info, warn};
use quorum_core::foundation::ThresholdError;
use quorum_core::infrastructure::config::{self, AppConfig};
use quorum_core::infrastructure::logging::init_logger;
use std::sync::Arc;

const DEFAULT_LOG_FILTERS: &str = "info";

pub fn load_app_config(profile: Option<&str>) -> Result<Arc<AppConfig>, ThresholdError> {
    let data_dir = config::resolve_data_dir()?;
    let config_path = config::resolve_config_path(&data_dir);
    let profile = profile.map(str::trim).filter(|p| !p.is_empty());
    Ok(Arc::new(config::load_app_config_from_path(&config_path, &data_dir, profile)?))
}

/// Command line wins over `node.log_dir` / `node.log_filters`.
pub fn init_logging(args: &Cli, app_config: &AppConfig) -> Result<(), ThresholdError> {
    let filters = args.log_level.as_deref().or(app_config.node.log_filters.as_deref()).unwrap_or(DEFAULT_LOG_FILTERS);
    let log_dir = match &args.log_dir {
        Some(dir) => Some(dir.to_string_lossy().to_string()),
        None => app_config.node.log_dir.clone(),
    };
    init_logger(log_dir.as_deref(), filters)
}

pub fn validate_startup_config(app_config: &AppConfig) -> bool {
    if !app_config.devnet.enabled {
        warn!("devnet.enabled=false but no peer transport is available in this build; refusing to start");
        return false;
    }
    if !app_config.rpc.enabled && !app_config.scheduler.enabled {
        warn!("rpc and scheduler are both disabled; the node would do nothing");
        return false;
    }
    true
}

pub fn log_startup_banner(app_config: &AppConfig) {
    info!(
        "quorum-node config data_dir={} storage={:?} devnet_nodes={} deployers={} genesis_t={} rpc_enabled={} rpc_addr={} scheduler_enabled={}",
        app_config.node.data_dir,
        app_config.storage.backend,
        app_config.devnet.nodes,
        app_config.devnet.deployers,
        app_config.devnet.genesis_threshold,
        app_config.rpc.enabled,
        app_config.rpc.addr,
        app_config.scheduler.enabled
    );
    info!(
        "quorum-node runtime request_timeout_ms={} partner_call_timeout_ms={} nonce_batch_size={} request_ttl_secs={} leading_period_secs={} leading_gap_secs={}",
        app_config.runtime.request_timeout_ms,
        app_config.runtime.partner_call_timeout_ms,
        app_config.runtime.nonce_batch_size,
        app_config.runtime.request_ttl_secs,
        app_config.scheduler.leading_period_secs,
        app_config.scheduler.leading_gap_secs
    );
}
