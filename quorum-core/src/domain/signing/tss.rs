//! Threshold Schnorr over secp256k1.
//!
//! Key and nonce shares are Shamir shares of degree `t - 1` evaluated at the 1-based position of a
//! partner in its context. A partial signature is `s_j = k_j + c * x_j`; any `t` partials combine
//! with Lagrange weights into `s = k + c * x`, verified as `s * G == R + c * Y`.

use crate::foundation::{Hash32, ThresholdError};
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::elliptic_curve::{Field, PrimeField};
use k256::{AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar, U256};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

pub const COMPRESSED_POINT_LEN: usize = 33;
pub const SCALAR_LEN: usize = 32;

/// Polynomial with coefficients in the scalar field; `coefficients[0]` is the shared secret.
#[derive(Clone)]
pub struct Polynomial {
    coefficients: Vec<Scalar>,
}

impl Polynomial {
    /// Random polynomial with `threshold` coefficients.
    pub fn random(rng: &mut (impl RngCore + CryptoRng), threshold: usize) -> Self {
        let coefficients = (0..threshold.max(1)).map(|_| Scalar::random(&mut *rng)).collect();
        Self { coefficients }
    }

    /// Random polynomial with a fixed constant term.
    pub fn with_constant(constant: Scalar, rng: &mut (impl RngCore + CryptoRng), threshold: usize) -> Self {
        let mut coefficients = Vec::with_capacity(threshold.max(1));
        coefficients.push(constant);
        for _ in 1..threshold.max(1) {
            coefficients.push(Scalar::random(&mut *rng));
        }
        Self { coefficients }
    }

    pub fn constant(&self) -> &Scalar {
        &self.coefficients[0]
    }

    pub fn threshold(&self) -> usize {
        self.coefficients.len()
    }

    pub fn evaluate(&self, x: &Scalar) -> Scalar {
        let mut out = Scalar::ZERO;
        for coefficient in self.coefficients.iter().rev() {
            out = out * x + coefficient;
        }
        out
    }

    pub fn commit(&self) -> Vec<ProjectivePoint> {
        self.coefficients.iter().map(|c| ProjectivePoint::GENERATOR * c).collect()
    }
}

impl Drop for Polynomial {
    fn drop(&mut self) {
        for coefficient in self.coefficients.iter_mut() {
            *coefficient = Scalar::ZERO;
        }
    }
}

pub fn index_scalar(index: u32) -> Scalar {
    Scalar::from(u64::from(index))
}

/// Evaluates a Feldman commitment vector at `index`.
pub fn evaluate_commitments(commitments: &[ProjectivePoint], index: u32) -> ProjectivePoint {
    let x = index_scalar(index);
    let mut out = ProjectivePoint::IDENTITY;
    for commitment in commitments.iter().rev() {
        out = out * x + commitment;
    }
    out
}

pub fn verify_share(share: &Scalar, index: u32, commitments: &[ProjectivePoint]) -> bool {
    if commitments.is_empty() || index == 0 {
        return false;
    }
    ProjectivePoint::GENERATOR * share == evaluate_commitments(commitments, index)
}

/// Lagrange coefficient at zero for `index` over `participants`.
pub fn lagrange_coefficient(index: u32, participants: &[u32]) -> Result<Scalar, ThresholdError> {
    if index == 0 || !participants.contains(&index) {
        return Err(ThresholdError::crypto("lagrange", format!("index {index} not among participants")));
    }
    let xi = index_scalar(index);
    let mut numerator = Scalar::ONE;
    let mut denominator = Scalar::ONE;
    for &other in participants {
        if other == index {
            continue;
        }
        if other == 0 {
            return Err(ThresholdError::crypto("lagrange", "participant index 0"));
        }
        let xj = index_scalar(other);
        numerator *= xj;
        denominator *= xj - xi;
    }
    let inverse = Option::<Scalar>::from(denominator.invert())
        .ok_or_else(|| ThresholdError::crypto("lagrange", "duplicate participant index"))?;
    Ok(numerator * inverse)
}

/// Splits `secret` into `n` shares (indices `1..=n`), any `t` of which reconstruct it.
pub fn share(secret: Scalar, t: usize, n: usize, rng: &mut (impl RngCore + CryptoRng)) -> Result<(Vec<Scalar>, Vec<ProjectivePoint>), ThresholdError> {
    if t == 0 || t > n {
        return Err(ThresholdError::crypto("share", format!("invalid threshold t={t} n={n}")));
    }
    let polynomial = Polynomial::with_constant(secret, rng, t);
    let shares = (1..=n as u32).map(|i| polynomial.evaluate(&index_scalar(i))).collect();
    Ok((shares, polynomial.commit()))
}

pub fn reconstruct(shares: &[(u32, Scalar)]) -> Result<Scalar, ThresholdError> {
    weighted_sum(shares)
}

/// Schnorr challenge `keccak256(R || Y || m) mod n` with compressed points.
pub fn challenge(nonce: &ProjectivePoint, public_key: &ProjectivePoint, message: &Hash32) -> Scalar {
    let mut hasher = Keccak256::new();
    hasher.update(encode_point(nonce));
    hasher.update(encode_point(public_key));
    hasher.update(message);
    let digest = hasher.finalize();
    <Scalar as Reduce<U256>>::reduce_bytes(FieldBytes::from_slice(&digest))
}

pub fn sign_partial(nonce_share: &Scalar, key_share: &Scalar, challenge: &Scalar) -> Scalar {
    *nonce_share + *challenge * key_share
}

/// Checks `s_j * G == R_j + c * Y_j` for a single partner.
pub fn verify_partial(partial: &Scalar, nonce_share_commitment: &ProjectivePoint, public_share: &ProjectivePoint, challenge: &Scalar) -> bool {
    ProjectivePoint::GENERATOR * partial == *nonce_share_commitment + *public_share * challenge
}

/// Combines `t` partials keyed by partner index into the group response.
pub fn aggregate(partials: &[(u32, Scalar)]) -> Result<Scalar, ThresholdError> {
    weighted_sum(partials)
}

fn weighted_sum(values: &[(u32, Scalar)]) -> Result<Scalar, ThresholdError> {
    if values.is_empty() {
        return Err(ThresholdError::crypto("aggregate", "no shares"));
    }
    let indices: Vec<u32> = values.iter().map(|(index, _)| *index).collect();
    let mut out = Scalar::ZERO;
    for (index, value) in values {
        out += lagrange_coefficient(*index, &indices)? * value;
    }
    Ok(out)
}

/// Group Schnorr signature `(R, s)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchnorrSignature {
    pub nonce: ProjectivePoint,
    pub s: Scalar,
}

impl SchnorrSignature {
    pub fn verify(&self, public_key: &ProjectivePoint, message: &Hash32) -> bool {
        let c = challenge(&self.nonce, public_key, message);
        ProjectivePoint::GENERATOR * self.s == self.nonce + *public_key * c
    }

    /// 65 bytes: compressed `R` followed by `s`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = encode_point(&self.nonce);
        out.extend_from_slice(&encode_scalar(&self.s));
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ThresholdError> {
        if bytes.len() != COMPRESSED_POINT_LEN + SCALAR_LEN {
            return Err(ThresholdError::crypto("decode_signature", format!("expected 65 bytes, got {}", bytes.len())));
        }
        Ok(Self { nonce: decode_point(&bytes[..COMPRESSED_POINT_LEN])?, s: decode_scalar(&bytes[COMPRESSED_POINT_LEN..])? })
    }
}

pub fn encode_point(point: &ProjectivePoint) -> Vec<u8> {
    point.to_affine().to_encoded_point(true).as_bytes().to_vec()
}

pub fn decode_point(bytes: &[u8]) -> Result<ProjectivePoint, ThresholdError> {
    let encoded = EncodedPoint::from_bytes(bytes).map_err(|err| ThresholdError::crypto("decode_point", err.to_string()))?;
    let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .ok_or_else(|| ThresholdError::crypto("decode_point", "point not on curve"))?;
    Ok(ProjectivePoint::from(affine))
}

pub fn encode_scalar(scalar: &Scalar) -> [u8; SCALAR_LEN] {
    let mut out = [0u8; SCALAR_LEN];
    out.copy_from_slice(scalar.to_bytes().as_slice());
    out
}

pub fn decode_scalar(bytes: &[u8]) -> Result<Scalar, ThresholdError> {
    if bytes.len() != SCALAR_LEN {
        return Err(ThresholdError::crypto("decode_scalar", format!("expected 32 bytes, got {}", bytes.len())));
    }
    Option::<Scalar>::from(Scalar::from_repr(*FieldBytes::from_slice(bytes)))
        .ok_or_else(|| ThresholdError::crypto("decode_scalar", "value exceeds group order"))
}

pub fn point_hex(point: &ProjectivePoint) -> String {
    hex::encode(encode_point(point))
}

pub fn point_from_hex(value: &str) -> Result<ProjectivePoint, ThresholdError> {
    decode_point(&crate::foundation::util::encoding::decode_hex(value)?)
}

pub fn scalar_hex(scalar: &Scalar) -> String {
    hex::encode(encode_scalar(scalar))
}

pub fn scalar_from_hex(value: &str) -> Result<Scalar, ThresholdError> {
    decode_scalar(&crate::foundation::util::encoding::decode_hex(value)?)
}

pub fn commitments_from_hex(values: &[String]) -> Result<Vec<ProjectivePoint>, ThresholdError> {
    values.iter().map(|value| point_from_hex(value)).collect()
}

pub fn commitments_to_hex(points: &[ProjectivePoint]) -> Vec<String> {
    points.iter().map(point_hex).collect()
}

/// Public view of a group key as stored on a context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPublicKey {
    /// Ethereum-style address of the key (`0x` + 20 bytes).
    pub address: String,
    /// Compressed SEC1 encoding, hex.
    pub encoded: String,
    /// X coordinate, hex.
    pub x: String,
    pub y_parity: u8,
}

impl GroupPublicKey {
    pub fn from_point(point: &ProjectivePoint) -> Self {
        let compressed = encode_point(point);
        let y_parity = u8::from(compressed[0] == 0x03);
        Self { address: eth_address(point), encoded: hex::encode(&compressed), x: hex::encode(&compressed[1..]), y_parity }
    }

    pub fn point(&self) -> Result<ProjectivePoint, ThresholdError> {
        point_from_hex(&self.encoded)
    }
}

pub fn eth_address(point: &ProjectivePoint) -> String {
    let uncompressed = point.to_affine().to_encoded_point(false);
    let digest = Keccak256::digest(&uncompressed.as_bytes()[1..]);
    format!("0x{}", hex::encode(&digest[12..]))
}
