//! System-wide constants for quorum nodes.

/// Nanoseconds per second (10^9).
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Fraction of the threshold that is carried over from the previous party on rotation.
///
/// A rotation keeps `ceil(t * ROTATION_COEFFICIENT)` old members (clamped to the new party size).
pub const ROTATION_COEFFICIENT: f64 = 1.5;

/// App name and fixed id of the built-in deployment app.
pub const DEPLOYMENT_APP_NAME: &str = "deployment";
pub const DEPLOYMENT_APP_ID: &str = "1";

/// How long a confirmed random seed stays usable by `deploy` or `tss-rotate`.
pub const RANDOM_SEED_TTL_SECS: u64 = 10 * 60;

/// Seed of the deployers' genesis context.
pub const GENESIS_SEED: &str = "genesis";

/// Default per-request deadline (covers fan-out and quorum collection).
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;

/// Default per-partner call timeout.
pub const DEFAULT_PARTNER_CALL_TIMEOUT_MS: u64 = 10_000;

/// Default timeout of a single dealing round (deal, finalize).
pub const DEFAULT_DKG_TIMEOUT_MS: u64 = 20_000;

/// Default lifetime of persisted requests before GC.
pub const DEFAULT_REQUEST_TTL_SECS: u64 = 24 * 60 * 60;

/// Default number of nonces produced by one pre-generation round.
pub const DEFAULT_NONCE_BATCH_SIZE: u32 = 100;

/// Upper bound on nonces per batch.
pub const MAX_NONCE_BATCH_SIZE: u32 = 10_000;

/// Default TTL of the nonce index lock.
pub const DEFAULT_NONCE_LOCK_TTL_MS: u64 = 5_000;

/// Default time to wait for the nonce index lock.
pub const DEFAULT_NONCE_LOCK_WAIT_MS: u64 = 10_000;

/// Default key lifetime (seconds) before a context turns PENDING.
pub const DEFAULT_CONTEXT_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Default PENDING window (seconds) before a context turns EXPIRED.
pub const DEFAULT_PENDING_PERIOD_SECS: u64 = 24 * 60 * 60;

/// Default leading period and leading gap of the leader scheduler.
pub const DEFAULT_LEADING_PERIOD_SECS: u64 = 5 * 60;
pub const DEFAULT_LEADING_GAP_SECS: u64 = 30;

/// Largest party a context may select.
pub const MAX_PARTY_SIZE: u16 = 100;

/// Minimum threshold.
pub const MIN_THRESHOLD: u16 = 1;

/// Maximum encoded request size accepted over the transport (4 MB).
pub const MAX_MESSAGE_SIZE_BYTES: usize = 4 * 1024 * 1024;

/// Bound on waiting for a storage-level mutex.
pub const STORAGE_LOCK_TIMEOUT_SECS: u64 = 5;
