//! Node configuration: compiled defaults, a TOML file, an optional profile and `QUORUM_*` env
//! overrides, validated before use.

mod loader;
mod types;
pub mod validation;

pub use loader::{load_config_from_file, load_config_from_file_with_profile, CONFIG_FILE_NAME};
pub use types::*;

use crate::foundation::ThresholdError;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "QUORUM_CONFIG_PATH";
pub const DATA_DIR_ENV: &str = "QUORUM_DATA_DIR";

const DEFAULT_DATA_DIR: &str = ".quorum";

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var(var).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty()).map(PathBuf::from)
}

/// Loads the file at `path` (defaults when missing), applies `profile`, and validates.
pub fn load_app_config_from_path(path: &Path, data_dir: &Path, profile: Option<&str>) -> Result<AppConfig, ThresholdError> {
    let config = match profile {
        Some(profile) => load_config_from_file_with_profile(path, data_dir, profile)?,
        None => load_config_from_file(path, data_dir)?,
    };
    if let Err(errors) = config.validate() {
        return Err(ThresholdError::ConfigError(format!("invalid configuration: {}", errors.join("; "))));
    }
    Ok(config)
}

/// `QUORUM_CONFIG_PATH`, else `<data_dir>/quorum-config.toml`.
pub fn resolve_config_path(data_dir: &Path) -> PathBuf {
    env_path(CONFIG_PATH_ENV).unwrap_or_else(|| data_dir.join(CONFIG_FILE_NAME))
}

/// `QUORUM_DATA_DIR`, else `./.quorum`.
pub fn resolve_data_dir() -> Result<PathBuf, ThresholdError> {
    if let Some(dir) = env_path(DATA_DIR_ENV) {
        return Ok(dir);
    }
    Ok(std::env::current_dir()?.join(DEFAULT_DATA_DIR))
}
