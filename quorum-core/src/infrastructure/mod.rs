pub mod config;
pub mod keys;
pub mod logging;
pub mod rpc;
pub mod shared_memory;
pub mod storage;
pub mod transport;
