//! Configuration loader using Figment for layered config management.
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. TOML config file
//! 3. Profile overrides from `[profiles.<name>]`
//! 4. Environment variables (QUORUM_* prefix)

use crate::foundation::ThresholdError;
use crate::infrastructure::config::types::AppConfig;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::value::Dict;
use figment::{Figment, Profile};
use log::{debug, info};
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "quorum-config.toml";

/// Environment variable prefix for config overrides.
///
/// Example: `QUORUM_RUNTIME__REQUEST_TIMEOUT_MS` -> `runtime.request_timeout_ms`
const ENV_PREFIX: &str = "QUORUM_";

pub fn load_config_from_file(path: &Path, data_dir: &Path) -> Result<AppConfig, ThresholdError> {
    info!("loading configuration path={} data_dir={}", path.display(), data_dir.display());
    let figment = figment_base(path).merge(Env::prefixed(ENV_PREFIX).split("__"));
    let mut config: AppConfig = figment.extract()?;
    postprocess(&mut config, data_dir);
    debug!("configuration loaded node_id={} rpc_addr={} rpc_enabled={}", config.node.id, config.rpc.addr, config.rpc.enabled);
    Ok(config)
}

/// Load configuration from a file, applying `[profiles.<profile>]` on top of it.
pub fn load_config_from_file_with_profile(path: &Path, data_dir: &Path, profile: &str) -> Result<AppConfig, ThresholdError> {
    info!("loading configuration with profile path={} data_dir={} profile={}", path.display(), data_dir.display(), profile);

    // Extract once to access `profiles.<name>` overrides from the file.
    let base: AppConfig = figment_base(path).extract()?;
    let overrides = profile_overrides(&base, profile)?;

    let figment = figment_base(path).merge(Serialized::from(overrides, Profile::Default)).merge(Env::prefixed(ENV_PREFIX).split("__"));
    let mut config: AppConfig =
        figment.extract().map_err(|e| ThresholdError::ConfigError(format!("config extraction failed for profile '{profile}': {e}")))?;
    postprocess(&mut config, data_dir);
    debug!("configuration loaded with profile profile={} node_id={}", profile, config.node.id);
    Ok(config)
}

fn figment_base(path: &Path) -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));
    if path.exists() {
        figment = figment.merge(Toml::file(path));
    } else {
        debug!("configuration file missing; using defaults and env only path={}", path.display());
    }
    figment
}

fn profile_overrides(config: &AppConfig, profile: &str) -> Result<Dict, ThresholdError> {
    let profiles = config.profiles.as_ref().ok_or_else(|| ThresholdError::ConfigError("no profiles section in config".to_string()))?;
    profiles.get(profile).cloned().ok_or_else(|| ThresholdError::ConfigError(format!("profile '{profile}' not found in config")))
}

fn postprocess(config: &mut AppConfig, data_dir: &Path) {
    if config.node.data_dir.trim().is_empty() {
        config.node.data_dir = data_dir.to_string_lossy().to_string();
    }
    config.node.id = config.node.id.trim().to_string();
    config.network.deployers.iter_mut().for_each(|id| *id = id.trim().to_string());
}
