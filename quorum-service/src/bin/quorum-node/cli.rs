use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "quorum-node")]
#[command(about = "Threshold-signature oracle node (in-process devnet)", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override data directory
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Apply `[profiles.<name>]` overrides from the config file
    #[arg(short, long, env = "QUORUM_PROFILE")]
    pub profile: Option<String>,

    /// Log filters, e.g. `info` or `quorum_core=debug,root=warn`; defaults to `node.log_filters`, then `info`
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Also write rolling log files to this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn apply_to_env(&self) {
        if let Some(config_path) = &self.config {
            std::env::set_var(quorum_core::infrastructure::config::CONFIG_PATH_ENV, config_path);
        }

        if let Some(data_dir) = &self.data_dir {
            std::env::set_var(quorum_core::infrastructure::config::DATA_DIR_ENV, data_dir);
        }
    }
}
