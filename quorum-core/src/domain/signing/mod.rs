pub mod dealing;
pub mod nonce;
pub mod tss;

pub use dealing::{DealerCommitments, Dealing, DealingKind, DealingPlan};
pub use nonce::{NonceBatch, NonceRef, NonceSecret};
pub use tss::{GroupPublicKey, SchnorrSignature};
