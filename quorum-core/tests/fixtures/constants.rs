#![allow(dead_code)]

pub const TEST_REQUEST_TIMEOUT_MS: u64 = 5_000;
pub const TEST_PARTNER_CALL_TIMEOUT_MS: u64 = 3_000;
pub const TEST_DKG_TIMEOUT_MS: u64 = 5_000;
pub const TEST_NONCE_BATCH_SIZE: u32 = 16;
pub const TEST_APP_NAME: &str = "echo";
pub const TEST_NODE_COUNT: usize = 5;
pub const TEST_DEPLOYER_COUNT: usize = 3;
pub const TEST_GENESIS_THRESHOLD: u16 = 2;
