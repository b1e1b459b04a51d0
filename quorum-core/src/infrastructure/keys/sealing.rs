//! At-rest protection of key shares (XChaCha20-Poly1305).

use crate::domain::context::{KeyShare, SealedKeyShare};
use crate::foundation::ThresholdError;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305};
use rand::RngCore;
use zeroize::Zeroizing;

const SEALING_KEY_CONTEXT: &str = "quorum-node 2024 key share sealing v1";
const NONCE_LEN: usize = 24;

pub struct ShareSealer {
    key: Zeroizing<[u8; 32]>,
}

impl ShareSealer {
    /// Derives the sealing key from the node identity seed.
    pub fn from_identity_seed(seed: &[u8; 32]) -> Self {
        Self { key: Zeroizing::new(blake3::derive_key(SEALING_KEY_CONTEXT, seed)) }
    }

    pub fn seal(&self, share: &KeyShare) -> Result<SealedKeyShare, ThresholdError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        let aad = Self::aad(share.app_id.as_str(), share.seed.as_str(), share.index);
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&self.key[..]));
        let ciphertext = cipher
            .encrypt(&nonce.into(), Payload { msg: share.secret_bytes().as_slice(), aad: aad.as_slice() })
            .map_err(|e| ThresholdError::crypto("seal key share", e.to_string()))?;
        Ok(SealedKeyShare {
            app_id: share.app_id.clone(),
            seed: share.seed.clone(),
            index: share.index,
            public_key: share.public_key.clone(),
            nonce: nonce.to_vec(),
            ciphertext,
        })
    }

    pub fn open(&self, sealed: &SealedKeyShare) -> Result<KeyShare, ThresholdError> {
        let nonce: [u8; NONCE_LEN] = sealed
            .nonce
            .as_slice()
            .try_into()
            .map_err(|_| ThresholdError::SecretDecryptFailed { details: format!("nonce length {}", sealed.nonce.len()) })?;
        let aad = Self::aad(sealed.app_id.as_str(), sealed.seed.as_str(), sealed.index);
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&self.key[..]));
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(&nonce.into(), Payload { msg: sealed.ciphertext.as_slice(), aad: aad.as_slice() })
                .map_err(|e| ThresholdError::SecretDecryptFailed { details: format!("key share {}/{}: {}", sealed.app_id, sealed.seed, e) })?,
        );
        let bytes: [u8; 32] = plaintext
            .as_slice()
            .try_into()
            .map_err(|_| ThresholdError::SecretDecryptFailed { details: format!("share length {}", plaintext.len()) })?;
        Ok(KeyShare::from_bytes(sealed.app_id.clone(), sealed.seed.clone(), sealed.index, sealed.public_key.clone(), Zeroizing::new(bytes)))
    }

    fn aad(app_id: &str, seed: &str, index: u32) -> Vec<u8> {
        let mut aad = Vec::with_capacity(app_id.len() + seed.len() + 6);
        aad.extend_from_slice(app_id.as_bytes());
        aad.push(b':');
        aad.extend_from_slice(seed.as_bytes());
        aad.push(b':');
        aad.extend_from_slice(&index.to_be_bytes());
        aad
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signing::tss::GroupPublicKey;
    use crate::foundation::{AppId, Seed};
    use k256::{ProjectivePoint, Scalar};

    fn share() -> KeyShare {
        KeyShare::new(AppId::from("7"), Seed::from("s"), 2, GroupPublicKey::from_point(&ProjectivePoint::GENERATOR), &Scalar::from(42u64))
    }

    #[test]
    fn test_seal_open_preserves_share() {
        let sealer = ShareSealer::from_identity_seed(&[1u8; 32]);
        let sealed = sealer.seal(&share()).expect("seal");
        assert_ne!(sealed.ciphertext.as_slice(), share().secret_bytes().as_slice());
        let opened = sealer.open(&sealed).expect("open");
        assert_eq!(opened.scalar().expect("scalar"), Scalar::from(42u64));
        assert_eq!(opened.index, 2);
    }

    #[test]
    fn test_open_with_other_identity_fails() {
        let sealed = ShareSealer::from_identity_seed(&[1u8; 32]).seal(&share()).expect("seal");
        let err = ShareSealer::from_identity_seed(&[2u8; 32]).open(&sealed).expect_err("wrong key");
        assert!(matches!(err, ThresholdError::SecretDecryptFailed { .. }));
    }

    #[test]
    fn test_tampered_metadata_fails() {
        let sealer = ShareSealer::from_identity_seed(&[1u8; 32]);
        let mut sealed = sealer.seal(&share()).expect("seal");
        sealed.index = 3;
        assert!(sealer.open(&sealed).is_err());
    }
}
