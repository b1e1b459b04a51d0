use super::messages::{MessageEnvelope, WireMessage};
use crate::foundation::{Hash32, NodeId, ThresholdError, MAX_MESSAGE_SIZE_BYTES};
use crate::serde_err;

const WIRE_PROTOCOL_VERSION_V1: u16 = 1;

pub fn encode_envelope(envelope: &MessageEnvelope) -> Result<Vec<u8>, ThresholdError> {
    let mut out = Vec::new();
    out.extend_from_slice(&WIRE_PROTOCOL_VERSION_V1.to_le_bytes());
    let bytes = serde_json::to_vec(envelope).map_err(|err| serde_err!("json", err))?;
    out.extend_from_slice(&bytes);
    if out.len() > MAX_MESSAGE_SIZE_BYTES {
        return Err(ThresholdError::MessageTooLarge { size: out.len(), max: MAX_MESSAGE_SIZE_BYTES });
    }
    Ok(out)
}

pub fn decode_envelope(bytes: &[u8]) -> Result<MessageEnvelope, ThresholdError> {
    if bytes.len() > MAX_MESSAGE_SIZE_BYTES {
        return Err(ThresholdError::MessageTooLarge { size: bytes.len(), max: MAX_MESSAGE_SIZE_BYTES });
    }
    if bytes.len() < 2 {
        return Err(ThresholdError::transport("decode_envelope", "message too short"));
    }
    let version = u16::from_le_bytes([bytes[0], bytes[1]]);
    if version != WIRE_PROTOCOL_VERSION_V1 {
        return Err(ThresholdError::transport(
            "decode_envelope",
            format!("wire protocol version mismatch: expected {WIRE_PROTOCOL_VERSION_V1}, got {version}"),
        ));
    }
    serde_json::from_slice(&bytes[2..]).map_err(|err| serde_err!("json", err))
}

/// Hash signed by the sender: header fields and payload.
pub fn payload_hash(sender: &NodeId, recipient: &NodeId, seq_no: u64, timestamp_nanos: u64, payload: &WireMessage) -> Result<Hash32, ThresholdError> {
    let body = serde_json::to_vec(payload).map_err(|err| serde_err!("json", err))?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"quorum:envelope:v1:");
    hasher.update(sender.as_bytes());
    hasher.update(&[0]);
    hasher.update(recipient.as_bytes());
    hasher.update(&[0]);
    hasher.update(&seq_no.to_be_bytes());
    hasher.update(&timestamp_nanos.to_be_bytes());
    hasher.update(&body);
    Ok(*hasher.finalize().as_bytes())
}
