//! Structured async calls with explicit timeout policies.

pub mod gather;
pub mod ipc;

pub use gather::{gather, Gathered, TimeoutPolicy};
pub use ipc::{IpcBroadcast, IpcBus, IpcEnvelope, IpcRequest, IpcResponse, IpcTimeoutPolicy};
