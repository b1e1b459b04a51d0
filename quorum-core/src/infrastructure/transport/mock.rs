//! In-process network: every node registers a handler; calls travel as signed, encoded envelopes.

use super::encoding::{decode_envelope, encode_envelope, payload_hash};
use super::messages::{MessageEnvelope, NodeCall, NodeReply, RemoteError, WireMessage};
use super::traits::{CallHandler, PeerTransport};
use crate::foundation::util::time::now_nanos;
use crate::foundation::{NodeId, ThresholdError};
use crate::infrastructure::keys::{Ed25519Signer, SignatureSigner, SignatureVerifier};
use async_trait::async_trait;
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use subtle::ConstantTimeEq;

/// How a node reacts to incoming calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PeerBehaviour {
    #[default]
    Normal,
    /// Answers after the given delay.
    Delay(Duration),
    /// Refuses connections.
    Offline,
    /// Accepts calls and never answers.
    Drop,
}

struct Endpoint {
    handler: Arc<dyn CallHandler>,
    signer: Arc<Ed25519Signer>,
    verifier: Arc<dyn SignatureVerifier>,
    behaviour: PeerBehaviour,
}

#[derive(Default)]
pub struct MockNetwork {
    endpoints: RwLock<HashMap<NodeId, Endpoint>>,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(
        &self,
        signer: Arc<Ed25519Signer>,
        handler: Arc<dyn CallHandler>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Result<(), ThresholdError> {
        let mut endpoints = self.endpoints.write().map_err(|_| ThresholdError::transport("mock register", "poisoned"))?;
        debug!("mock network register node_id={}", signer.node_id);
        endpoints.insert(signer.node_id.clone(), Endpoint { handler, signer, verifier, behaviour: PeerBehaviour::Normal });
        Ok(())
    }

    pub fn set_behaviour(&self, node: &NodeId, behaviour: PeerBehaviour) -> Result<(), ThresholdError> {
        let mut endpoints = self.endpoints.write().map_err(|_| ThresholdError::transport("mock set_behaviour", "poisoned"))?;
        match endpoints.get_mut(node) {
            Some(endpoint) => {
                endpoint.behaviour = behaviour;
                Ok(())
            }
            None => Err(ThresholdError::transport("mock set_behaviour", format!("unknown node {}", node))),
        }
    }

    fn endpoint(&self, node: &NodeId) -> Result<(Arc<dyn CallHandler>, Arc<Ed25519Signer>, Arc<dyn SignatureVerifier>, PeerBehaviour), ThresholdError> {
        let endpoints = self.endpoints.read().map_err(|_| ThresholdError::transport("mock endpoint", "poisoned"))?;
        let endpoint = endpoints.get(node).ok_or_else(|| ThresholdError::transport("mock deliver", format!("unknown peer {}", node)))?;
        Ok((endpoint.handler.clone(), endpoint.signer.clone(), endpoint.verifier.clone(), endpoint.behaviour))
    }

    /// Receiving side: decode, authenticate, dispatch, and seal the answer.
    async fn deliver(&self, recipient: &NodeId, bytes: Vec<u8>) -> Result<Vec<u8>, ThresholdError> {
        let (handler, signer, verifier, behaviour) = self.endpoint(recipient)?;
        match behaviour {
            PeerBehaviour::Normal => {}
            PeerBehaviour::Delay(delay) => tokio::time::sleep(delay).await,
            PeerBehaviour::Offline => return Err(ThresholdError::transport("mock deliver", format!("peer {} unreachable", recipient))),
            PeerBehaviour::Drop => std::future::pending::<()>().await,
        }
        let envelope = decode_envelope(&bytes)?;
        verify_envelope(&envelope, recipient, verifier.as_ref())?;
        let WireMessage::Call(call) = envelope.payload else {
            return Err(ThresholdError::transport("mock deliver", "expected a call"));
        };
        trace!("mock call received from={} to={} call={}", envelope.sender, recipient, call.name());
        let payload = match handler.handle(&envelope.sender, call).await {
            Ok(reply) => WireMessage::Reply(reply),
            Err(err) => {
                debug!("mock call rejected from={} to={} error={}", envelope.sender, recipient, err);
                WireMessage::Error(RemoteError { code: err.code(), message: err.to_string() })
            }
        };
        encode_envelope(&seal(&signer, &envelope.sender, envelope.seq_no, payload)?)
    }
}

fn seal(signer: &Ed25519Signer, recipient: &NodeId, seq_no: u64, payload: WireMessage) -> Result<MessageEnvelope, ThresholdError> {
    let timestamp_nanos = now_nanos();
    let sender = signer.sender_node_id().clone();
    let hash = payload_hash(&sender, recipient, seq_no, timestamp_nanos, &payload)?;
    let signature = signer.sign(&hash);
    Ok(MessageEnvelope { sender, recipient: recipient.clone(), seq_no, timestamp_nanos, payload, payload_hash: hash, signature })
}

fn verify_envelope(envelope: &MessageEnvelope, expected_recipient: &NodeId, verifier: &dyn SignatureVerifier) -> Result<(), ThresholdError> {
    if &envelope.recipient != expected_recipient {
        return Err(ThresholdError::InvalidPeerIdentity);
    }
    let hash = payload_hash(&envelope.sender, &envelope.recipient, envelope.seq_no, envelope.timestamp_nanos, &envelope.payload)?;
    if !bool::from(hash.as_slice().ct_eq(envelope.payload_hash.as_slice())) {
        return Err(ThresholdError::transport("verify_envelope", "payload hash mismatch"));
    }
    if !verifier.verify(&envelope.sender, &hash, &envelope.signature) {
        warn!("envelope signature rejected sender={}", envelope.sender);
        return Err(ThresholdError::SignatureVerificationFailed);
    }
    Ok(())
}

/// One node's view of a `MockNetwork`.
pub struct MockTransport {
    network: Arc<MockNetwork>,
    signer: Arc<Ed25519Signer>,
    verifier: Arc<dyn SignatureVerifier>,
    seq: AtomicU64,
}

impl MockTransport {
    pub fn new(network: Arc<MockNetwork>, signer: Arc<Ed25519Signer>, verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self { network, signer, verifier, seq: AtomicU64::new(1) }
    }

    pub fn network(&self) -> &Arc<MockNetwork> {
        &self.network
    }

    async fn exchange(&self, peer: &NodeId, call: NodeCall) -> Result<NodeReply, ThresholdError> {
        let seq_no = self.seq.fetch_add(1, Ordering::Relaxed);
        let request = encode_envelope(&seal(&self.signer, peer, seq_no, WireMessage::Call(call))?)?;
        let response = decode_envelope(&self.network.deliver(peer, request).await?)?;
        verify_envelope(&response, &self.signer.node_id, self.verifier.as_ref())?;
        if &response.sender != peer || response.seq_no != seq_no {
            return Err(ThresholdError::InvalidPeerIdentity);
        }
        match response.payload {
            WireMessage::Reply(reply) => Ok(reply),
            WireMessage::Error(err) => Err(ThresholdError::PeerRejected { peer: peer.to_string(), details: err.message }),
            WireMessage::Call(_) => Err(ThresholdError::transport("mock exchange", "peer answered with a call")),
        }
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    fn local_id(&self) -> &NodeId {
        &self.signer.node_id
    }

    async fn call(&self, peer: &NodeId, call: NodeCall, timeout: Duration) -> Result<NodeReply, ThresholdError> {
        let name = call.name();
        match tokio::time::timeout(timeout, self.exchange(peer, call)).await {
            Ok(result) => result,
            Err(_) => {
                debug!("peer call timed out peer={} call={} timeout_ms={}", peer, name, timeout.as_millis());
                Err(ThresholdError::PeerTimeout { peer: peer.to_string(), timeout_ms: timeout.as_millis() as u64 })
            }
        }
    }
}
