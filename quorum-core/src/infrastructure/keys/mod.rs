pub mod identity;
pub mod sealing;

pub use identity::{Ed25519Signer, SignatureSigner, SignatureVerifier, StaticEd25519Verifier};
pub use sealing::ShareSealer;
