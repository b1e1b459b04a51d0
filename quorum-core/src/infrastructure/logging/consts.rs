pub const LOG_FILE_NAME: &str = "quorum.log";
/// Receives warn and error records only.
pub const ERR_LOG_FILE_NAME: &str = "quorum_err.log";

/// `timestamp [LEVEL] message [module] [thread]`, level highlighted on terminals.
pub const CONSOLE_PATTERN_ANSI: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{h({l:5})}] {m} [{M}] [{I}]{n}";
pub const LINE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l:5}] {m} [{M}] [{I}]{n}";

pub const ROLL_SIZE_BYTES: u64 = 50 * 1024 * 1024;
pub const ROLL_KEEP: u32 = 5;

/// Crates logged at the requested level; any other crate stays silent unless named in the filters.
pub const OWN_CRATES: &[&str] = &["quorum_core", "quorum_service"];
