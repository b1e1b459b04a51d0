use crate::domain::scheduler::LeaderSchedule;
use crate::foundation::{
    NodeId, DEFAULT_CONTEXT_TTL_SECS, DEFAULT_DKG_TIMEOUT_MS, DEFAULT_LEADING_GAP_SECS, DEFAULT_LEADING_PERIOD_SECS,
    DEFAULT_NONCE_BATCH_SIZE, DEFAULT_NONCE_LOCK_TTL_MS, DEFAULT_NONCE_LOCK_WAIT_MS, DEFAULT_PARTNER_CALL_TIMEOUT_MS,
    DEFAULT_PENDING_PERIOD_SECS, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_REQUEST_TTL_SECS, ROTATION_COEFFICIENT,
};
use figment::value::{Dict, Map};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identity and local paths of this node.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub id: String,
    /// 32-byte ed25519 seed, hex. Devnet nodes derive one from their id when empty.
    #[serde(default)]
    pub identity_seed_hex: String,
    #[serde(default)]
    pub data_dir: String,
    #[serde(default)]
    pub log_dir: Option<String>,
    #[serde(default)]
    pub log_filters: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PeerConfig {
    pub id: String,
    /// ed25519 verifying key, hex.
    pub pubkey_hex: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
    /// Nodes holding the deployment app's genesis key; they also lead cron jobs.
    #[serde(default)]
    pub deployers: Vec<String>,
}

impl NetworkConfig {
    pub fn deployer_ids(&self) -> Vec<NodeId> {
        self.deployers.iter().map(|id| NodeId::from(id.trim())).collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub request_timeout_ms: u64,
    pub partner_call_timeout_ms: u64,
    pub request_ttl_secs: u64,
    pub nonce_batch_size: u32,
    pub nonce_lock_ttl_ms: u64,
    pub nonce_lock_wait_ms: u64,
    pub gc_interval_secs: u64,
    pub ipc_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            partner_call_timeout_ms: DEFAULT_PARTNER_CALL_TIMEOUT_MS,
            request_ttl_secs: DEFAULT_REQUEST_TTL_SECS,
            nonce_batch_size: DEFAULT_NONCE_BATCH_SIZE,
            nonce_lock_ttl_ms: DEFAULT_NONCE_LOCK_TTL_MS,
            nonce_lock_wait_ms: DEFAULT_NONCE_LOCK_WAIT_MS,
            gc_interval_secs: 60,
            ipc_capacity: 1024,
        }
    }
}

impl RuntimeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn partner_call_timeout(&self) -> Duration {
        Duration::from_millis(self.partner_call_timeout_ms)
    }

    pub fn nonce_lock_ttl(&self) -> Duration {
        Duration::from_millis(self.nonce_lock_ttl_ms)
    }

    pub fn nonce_lock_wait(&self) -> Duration {
        Duration::from_millis(self.nonce_lock_wait_ms)
    }
}

/// Defaults applied by the deployment app when a request leaves them out.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TssConfig {
    pub default_threshold: u16,
    pub default_party_size: u16,
    pub rotation_coefficient: f64,
    pub context_ttl_secs: u64,
    pub pending_period_secs: u64,
    pub dkg_timeout_ms: u64,
}

impl Default for TssConfig {
    fn default() -> Self {
        Self {
            default_threshold: 2,
            default_party_size: 3,
            rotation_coefficient: ROTATION_COEFFICIENT,
            context_ttl_secs: DEFAULT_CONTEXT_TTL_SECS,
            pending_period_secs: DEFAULT_PENDING_PERIOD_SECS,
            dkg_timeout_ms: DEFAULT_DKG_TIMEOUT_MS,
        }
    }
}

impl TssConfig {
    pub fn dkg_timeout(&self) -> Duration {
        Duration::from_millis(self.dkg_timeout_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub leading_period_secs: u64,
    pub leading_gap_secs: u64,
    pub tick_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            leading_period_secs: DEFAULT_LEADING_PERIOD_SECS,
            leading_gap_secs: DEFAULT_LEADING_GAP_SECS,
            tick_secs: 10,
        }
    }
}

impl SchedulerConfig {
    pub fn schedule(&self) -> LeaderSchedule {
        LeaderSchedule { period_secs: self.leading_period_secs, gap_secs: self.leading_gap_secs }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcConfig {
    pub enabled: bool,
    pub addr: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self { enabled: true, addr: "127.0.0.1:8090".to_string() }
    }
}

/// In-process network used when no real P2P transport is wired.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DevnetConfig {
    pub enabled: bool,
    pub nodes: u16,
    pub deployers: u16,
    pub genesis_threshold: u16,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self { enabled: true, nodes: 5, deployers: 3, genesis_threshold: 2 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Rocksdb,
    Memory,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Devnet-only escape hatch: wipe RocksDB if the schema version mismatches.
    #[serde(default)]
    pub allow_schema_wipe: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub tss: TssConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub devnet: DevnetConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default, skip_serializing)]
    pub profiles: Option<Map<String, Dict>>,
}
