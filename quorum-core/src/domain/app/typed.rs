//! Typed sign parameters and their framed encoding.
//!
//! A request is signed over `keccak256(frame(app_id) || frame(req_id) || frame(params)...)`. Each
//! frame is a one-byte type tag followed by the value; `string` and `bytes` carry a 4-byte big-endian
//! length first, so neighbouring values can never shift bytes between each other. Fixed-size types
//! use their `abi.encodePacked` form. Params are an ordered list; maps are not accepted.

use crate::foundation::util::encoding::decode_hex;
use crate::foundation::{AppId, Hash32, RequestId, ThresholdError};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum TypedValue {
    /// Decimal or `0x` hex.
    Uint256(String),
    Address(String),
    String(String),
    Bool(bool),
    Bytes32(String),
    Bytes(String),
}

impl TypedValue {
    pub fn uint(value: u64) -> Self {
        TypedValue::Uint256(value.to_string())
    }

    pub fn string(value: impl Into<String>) -> Self {
        TypedValue::String(value.into())
    }

    fn tag(&self) -> u8 {
        match self {
            TypedValue::Uint256(_) => 0x01,
            TypedValue::Address(_) => 0x02,
            TypedValue::String(_) => 0x03,
            TypedValue::Bool(_) => 0x04,
            TypedValue::Bytes32(_) => 0x05,
            TypedValue::Bytes(_) => 0x06,
        }
    }

    pub fn encode_framed(&self, out: &mut Vec<u8>) -> Result<(), ThresholdError> {
        out.push(self.tag());
        match self {
            TypedValue::Uint256(value) => out.extend_from_slice(&parse_uint256(value)?),
            TypedValue::Address(value) => out.extend_from_slice(&fixed_hex::<20>(value, "address")?),
            TypedValue::String(value) => push_dynamic(out, value.as_bytes())?,
            TypedValue::Bool(value) => out.push(u8::from(*value)),
            TypedValue::Bytes32(value) => out.extend_from_slice(&fixed_hex::<32>(value, "bytes32")?),
            TypedValue::Bytes(value) => push_dynamic(out, &decode_hex(value)?)?,
        }
        Ok(())
    }
}

fn push_dynamic(out: &mut Vec<u8>, bytes: &[u8]) -> Result<(), ThresholdError> {
    let len = u32::try_from(bytes.len()).map_err(|_| ThresholdError::EncodingError(format!("dynamic value of {} bytes", bytes.len())))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

fn fixed_hex<const N: usize>(value: &str, kind: &str) -> Result<[u8; N], ThresholdError> {
    let bytes = decode_hex(value)?;
    bytes.as_slice().try_into().map_err(|_| ThresholdError::EncodingError(format!("{kind} expects {N} bytes, got {}", bytes.len())))
}

/// Parses a decimal or `0x`-prefixed hex string into a big-endian 256-bit word.
pub fn parse_uint256(value: &str) -> Result<[u8; 32], ThresholdError> {
    let value = value.trim();
    if let Some(hex_digits) = value.strip_prefix("0x") {
        if hex_digits.is_empty() || hex_digits.len() > 64 {
            return Err(ThresholdError::EncodingError(format!("uint256 hex out of range: {value}")));
        }
        let padded = format!("{:0>64}", hex_digits);
        let bytes = hex::decode(padded)?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        return Ok(out);
    }
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ThresholdError::EncodingError(format!("invalid uint256: {value}")));
    }
    let mut out = [0u8; 32];
    for digit in value.bytes().map(|b| u32::from(b - b'0')) {
        let mut carry = digit;
        for byte in out.iter_mut().rev() {
            let next = u32::from(*byte) * 10 + carry;
            *byte = (next & 0xff) as u8;
            carry = next >> 8;
        }
        if carry != 0 {
            return Err(ThresholdError::EncodingError(format!("uint256 overflow: {value}")));
        }
    }
    Ok(out)
}

/// Digest every partner must reproduce byte-for-byte before signing.
pub fn sign_hash(app_id: &AppId, req_id: &RequestId, params: &[TypedValue]) -> Result<Hash32, ThresholdError> {
    let mut framed = Vec::new();
    TypedValue::String(app_id.to_string()).encode_framed(&mut framed)?;
    TypedValue::Bytes32(req_id.to_string()).encode_framed(&mut framed)?;
    for param in params {
        param.encode_framed(&mut framed)?;
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(&framed));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uint256_decimal_and_hex_agree() {
        assert_eq!(parse_uint256("255").expect("dec"), parse_uint256("0xff").expect("hex"));
        let max = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        assert_eq!(parse_uint256(max).expect("max"), [0xff; 32]);
        assert!(parse_uint256("115792089237316195423570985008687907853269984665640564039457584007913129639936").is_err());
        assert!(parse_uint256("12a").is_err());
    }

    #[test]
    fn test_typed_value_wire_shape() {
        let value = TypedValue::uint(42);
        assert_eq!(serde_json::to_value(&value).expect("json"), serde_json::json!({"type": "uint256", "value": "42"}));
    }

    #[test]
    fn test_framed_encoding_layout() {
        let mut out = Vec::new();
        TypedValue::Bool(true).encode_framed(&mut out).expect("bool");
        TypedValue::Address("0x7e5f4552091a69125d5dfcb7b8c2659029395bdf".into()).encode_framed(&mut out).expect("address");
        TypedValue::string("ab").encode_framed(&mut out).expect("string");
        assert_eq!(out.len(), (1 + 1) + (1 + 20) + (1 + 4 + 2));
        assert_eq!(&out[..2], &[0x04, 1]);
        assert_eq!(out[2], 0x02);
        assert_eq!(&out[23..], &[0x03, 0, 0, 0, 2, b'a', b'b']);
    }

    #[test]
    fn test_sign_hash_separates_adjacent_dynamic_values() {
        let app = AppId::from("7");
        let req = RequestId::new([4u8; 32]);
        let split_late = sign_hash(&app, &req, &[TypedValue::string("ab"), TypedValue::string("c")]).expect("hash");
        let split_early = sign_hash(&app, &req, &[TypedValue::string("a"), TypedValue::string("bc")]).expect("hash");
        assert_ne!(split_late, split_early);

        let as_bytes = sign_hash(&app, &req, &[TypedValue::Bytes("0x6162".into())]).expect("hash");
        let as_string = sign_hash(&app, &req, &[TypedValue::string("ab")]).expect("hash");
        assert_ne!(as_bytes, as_string);
    }

    #[test]
    fn test_sign_hash_is_order_sensitive() {
        let app = AppId::from("7");
        let req = RequestId::new([4u8; 32]);
        let a = sign_hash(&app, &req, &[TypedValue::uint(1), TypedValue::uint(2)]).expect("hash");
        let b = sign_hash(&app, &req, &[TypedValue::uint(2), TypedValue::uint(1)]).expect("hash");
        let again = sign_hash(&app, &req, &[TypedValue::uint(1), TypedValue::uint(2)]).expect("hash");
        assert_ne!(a, b);
        assert_eq!(a, again);
    }
}
