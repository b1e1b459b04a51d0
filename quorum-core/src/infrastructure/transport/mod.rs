//! Node-to-node request/response transport.
//!
//! Peer discovery and the real wire are external; this module defines the call surface the core
//! needs, the authenticated envelope, and an in-process `MockNetwork` used by tests and the devnet.

pub mod encoding;
pub mod messages;
pub mod mock;
pub mod traits;

pub use messages::{DealerShares, FinalizeReceipt, MessageEnvelope, NodeCall, NodeReply, ShareStatus, RemoteError, SignResponse, WireMessage};
pub use mock::{MockNetwork, MockTransport, PeerBehaviour};
pub use traits::{CallHandler, PeerTransport};
