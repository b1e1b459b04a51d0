//! Node identity: an ed25519 key used to sign transport envelopes.

use crate::foundation::util::encoding::parse_hex_32bytes;
use crate::foundation::{Hash32, NodeId, ThresholdError};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use std::collections::HashMap;
use zeroize::Zeroizing;

pub trait SignatureSigner: Send + Sync {
    fn sender_node_id(&self) -> &NodeId;
    fn sign(&self, payload_hash: &Hash32) -> Vec<u8>;
}

pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, sender: &NodeId, payload_hash: &Hash32, signature: &[u8]) -> bool;
}

#[derive(Clone)]
pub struct Ed25519Signer {
    pub node_id: NodeId,
    key: SigningKey,
    seed: Zeroizing<[u8; 32]>,
}

impl Ed25519Signer {
    pub fn from_seed(node_id: NodeId, seed: [u8; 32]) -> Self {
        Self { node_id, key: SigningKey::from_bytes(&seed), seed: Zeroizing::new(seed) }
    }

    /// Deterministic identity for devnets and tests: `blake3("quorum:devnet:identity:" || node_id)`.
    pub fn devnet(node_id: NodeId) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"quorum:devnet:identity:");
        hasher.update(node_id.as_bytes());
        let seed = *hasher.finalize().as_bytes();
        Self::from_seed(node_id, seed)
    }

    pub fn sign_payload(&self, payload_hash: &Hash32) -> Vec<u8> {
        self.key.sign(payload_hash).to_bytes().to_vec()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key().to_bytes())
    }

    /// Raw identity seed; storage keys are derived from it.
    pub fn seed(&self) -> &[u8; 32] {
        &self.seed
    }
}

impl SignatureSigner for Ed25519Signer {
    fn sender_node_id(&self) -> &NodeId {
        &self.node_id
    }

    fn sign(&self, payload_hash: &Hash32) -> Vec<u8> {
        self.sign_payload(payload_hash)
    }
}

pub struct StaticEd25519Verifier {
    keys: HashMap<NodeId, VerifyingKey>,
}

impl StaticEd25519Verifier {
    pub fn new(keys: HashMap<NodeId, VerifyingKey>) -> Self {
        Self { keys }
    }

    /// Builds a verifier from `(node_id, hex public key)` pairs.
    pub fn from_hex_keys<'a>(entries: impl IntoIterator<Item = (&'a NodeId, &'a str)>) -> Result<Self, ThresholdError> {
        let mut keys = HashMap::new();
        for (node_id, pubkey_hex) in entries {
            let bytes = parse_hex_32bytes(pubkey_hex)?;
            let key = VerifyingKey::from_bytes(&bytes)
                .map_err(|err| ThresholdError::ConfigError(format!("invalid ed25519 public key for {}: {}", node_id, err)))?;
            keys.insert(node_id.clone(), key);
        }
        Ok(Self { keys })
    }

    pub fn knows(&self, node_id: &NodeId) -> bool {
        self.keys.contains_key(node_id)
    }
}

impl SignatureVerifier for StaticEd25519Verifier {
    fn verify(&self, sender: &NodeId, payload_hash: &Hash32, signature: &[u8]) -> bool {
        let key = match self.keys.get(sender) {
            Some(key) => key,
            None => return false,
        };
        let signature = match Signature::from_slice(signature) {
            Ok(signature) => signature,
            Err(_) => return false,
        };
        key.verify_strict(payload_hash, &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_verifies_only_for_registered_sender() {
        let signer = Ed25519Signer::devnet(NodeId::from("node-1"));
        let other = Ed25519Signer::devnet(NodeId::from("node-2"));
        let verifier =
            StaticEd25519Verifier::new(HashMap::from([(signer.node_id.clone(), signer.verifying_key()), (other.node_id.clone(), other.verifying_key())]));
        let payload = [9u8; 32];
        let sig = signer.sign(&payload);
        assert!(verifier.verify(&signer.node_id, &payload, &sig));
        assert!(!verifier.verify(&other.node_id, &payload, &sig));
        assert!(!verifier.verify(&NodeId::from("node-3"), &payload, &sig));
    }

    #[test]
    fn test_from_hex_keys_roundtrip() {
        let signer = Ed25519Signer::devnet(NodeId::from("node-1"));
        let pubkey = signer.public_key_hex();
        let verifier = StaticEd25519Verifier::from_hex_keys([(&signer.node_id, pubkey.as_str())]).expect("keys");
        assert!(verifier.knows(&signer.node_id));
    }
}
