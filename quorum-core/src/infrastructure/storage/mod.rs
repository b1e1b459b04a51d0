pub mod context_repo;
pub mod memory;
pub mod nonce;
pub mod partials;
pub mod rocks;
pub mod traits;

pub use context_repo::{ContextRepository, ContextWriter};
pub use memory::MemoryStorage;
pub use nonce::NonceStore;
pub use partials::{PartialResult, PartialResultStore};
pub use rocks::RocksStorage;
pub use traits::Storage;
