use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    ValidationError,
    UnknownApp,
    UnknownMethod,
    ApplicationError,
    QuorumTimeout,
    SignatureMismatch,
    NonceReuse,
    NonceUnavailable,
    RepositoryGuard,
    ContextNotFound,
    InvalidContextStatus,
    PartySelection,
    CryptoError,
    StorageError,
    SerializationError,
    TransportError,
    PeerRejected,
    PeerTimeout,
    LockTimeout,
    StorageLockTimeout,
    SchemaMismatch,
    KeyNotFound,
    ConfigError,
    InvalidStateTransition,
    EncodingError,
    SignatureVerificationFailed,
    InvalidPeerIdentity,
    MessageTooLarge,
    SecretDecryptFailed,
    MetricsError,
    Message,
}

/// Why a single partner did not contribute an accepted partial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerFailure {
    pub partner: String,
    pub reason: String,
}

impl PartnerFailure {
    pub fn new(partner: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { partner: partner.into(), reason: reason.into() }
    }
}

impl fmt::Display for PartnerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.partner, self.reason)
    }
}

fn render_failures(failures: &[PartnerFailure]) -> String {
    if failures.is_empty() {
        return "none".to_string();
    }
    failures.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; ")
}

#[derive(Debug, Error)]
pub enum ThresholdError {
    // === Request errors ===
    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("unknown app: {0}")]
    UnknownApp(String),

    #[error("unknown method: app={app} method={method}")]
    UnknownMethod { app: String, method: String },

    #[error("application error in {app}: {details}")]
    ApplicationError { app: String, details: String },

    #[error("quorum not reached: required {required}, accepted {received}, failures: {}", render_failures(.failures))]
    QuorumTimeout { required: usize, received: usize, failures: Vec<PartnerFailure> },

    #[error("partial from {partner} rejected: {details}")]
    SignatureMismatch { partner: String, details: String },

    #[error("nonce already used: seed={seed} owner={owner} index={index}")]
    NonceReuse { seed: String, owner: String, index: u32 },

    #[error("no nonce available: seed={seed} owner={owner}")]
    NonceUnavailable { seed: String, owner: String },

    // === Key lifecycle errors ===
    #[error("repository write rejected: {0}")]
    RepositoryGuard(String),

    #[error("context not found: app_id={app_id} seed={}", .seed.as_deref().unwrap_or("latest"))]
    ContextNotFound { app_id: String, seed: Option<String> },

    #[error("context {app_id}/{seed} is {status}, expected {expected}")]
    InvalidContextStatus { app_id: String, seed: String, status: String, expected: String },

    #[error("party selection failed: {0}")]
    PartySelection(String),

    #[error("crypto error during {operation}: {details}")]
    CryptoError { operation: String, details: String },

    // === Infrastructure errors ===
    #[error("storage error during {operation}: {details}")]
    StorageError { operation: String, details: String },

    #[error("{format} serialization error: {details}")]
    SerializationError { format: String, details: String },

    #[error("transport error during {operation}: {details}")]
    TransportError { operation: String, details: String },

    #[error("peer {peer} rejected call: {details}")]
    PeerRejected { peer: String, details: String },

    #[error("peer {peer} did not answer within {timeout_ms}ms")]
    PeerTimeout { peer: String, timeout_ms: u64 },

    #[error("lock {key} not acquired within {waited_ms}ms")]
    LockTimeout { key: String, waited_ms: u64 },

    #[error("storage lock timeout: {operation} (waited {timeout_secs}s)")]
    StorageLockTimeout { operation: String, timeout_secs: u64 },

    #[error("schema mismatch: stored={stored} current={current}")]
    SchemaMismatch { stored: u32, current: u32 },

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("envelope signature verification failed")]
    SignatureVerificationFailed,

    #[error("invalid peer identity")]
    InvalidPeerIdentity,

    #[error("message too large: {size} exceeds max {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("secret decryption failed: {details}")]
    SecretDecryptFailed { details: String },

    #[error("metrics error during {operation}: {details}")]
    MetricsError { operation: String, details: String },

    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, ThresholdError>;

impl ThresholdError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ThresholdError::ValidationError(_) => ErrorCode::ValidationError,
            ThresholdError::UnknownApp(_) => ErrorCode::UnknownApp,
            ThresholdError::UnknownMethod { .. } => ErrorCode::UnknownMethod,
            ThresholdError::ApplicationError { .. } => ErrorCode::ApplicationError,
            ThresholdError::QuorumTimeout { .. } => ErrorCode::QuorumTimeout,
            ThresholdError::SignatureMismatch { .. } => ErrorCode::SignatureMismatch,
            ThresholdError::NonceReuse { .. } => ErrorCode::NonceReuse,
            ThresholdError::NonceUnavailable { .. } => ErrorCode::NonceUnavailable,
            ThresholdError::RepositoryGuard(_) => ErrorCode::RepositoryGuard,
            ThresholdError::ContextNotFound { .. } => ErrorCode::ContextNotFound,
            ThresholdError::InvalidContextStatus { .. } => ErrorCode::InvalidContextStatus,
            ThresholdError::PartySelection(_) => ErrorCode::PartySelection,
            ThresholdError::CryptoError { .. } => ErrorCode::CryptoError,
            ThresholdError::StorageError { .. } => ErrorCode::StorageError,
            ThresholdError::SerializationError { .. } => ErrorCode::SerializationError,
            ThresholdError::TransportError { .. } => ErrorCode::TransportError,
            ThresholdError::PeerRejected { .. } => ErrorCode::PeerRejected,
            ThresholdError::PeerTimeout { .. } => ErrorCode::PeerTimeout,
            ThresholdError::LockTimeout { .. } => ErrorCode::LockTimeout,
            ThresholdError::StorageLockTimeout { .. } => ErrorCode::StorageLockTimeout,
            ThresholdError::SchemaMismatch { .. } => ErrorCode::SchemaMismatch,
            ThresholdError::KeyNotFound(_) => ErrorCode::KeyNotFound,
            ThresholdError::ConfigError(_) => ErrorCode::ConfigError,
            ThresholdError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            ThresholdError::EncodingError(_) => ErrorCode::EncodingError,
            ThresholdError::SignatureVerificationFailed => ErrorCode::SignatureVerificationFailed,
            ThresholdError::InvalidPeerIdentity => ErrorCode::InvalidPeerIdentity,
            ThresholdError::MessageTooLarge { .. } => ErrorCode::MessageTooLarge,
            ThresholdError::SecretDecryptFailed { .. } => ErrorCode::SecretDecryptFailed,
            ThresholdError::MetricsError { .. } => ErrorCode::MetricsError,
            ThresholdError::Message(_) => ErrorCode::Message,
        }
    }

    /// Errors that must abort the current operation instead of being tolerated per partner.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ThresholdError::NonceReuse { .. } | ThresholdError::RepositoryGuard(_))
    }

    pub fn app(app: impl Into<String>, details: impl Into<String>) -> Self {
        ThresholdError::ApplicationError { app: app.into(), details: details.into() }
    }

    pub fn crypto(operation: impl Into<String>, details: impl Into<String>) -> Self {
        ThresholdError::CryptoError { operation: operation.into(), details: details.into() }
    }

    pub fn transport(operation: impl Into<String>, details: impl Into<String>) -> Self {
        ThresholdError::TransportError { operation: operation.into(), details: details.into() }
    }

    pub fn context_not_found(app_id: impl Into<String>, seed: Option<&str>) -> Self {
        ThresholdError::ContextNotFound { app_id: app_id.into(), seed: seed.map(str::to_string) }
    }
}

impl From<hex::FromHexError> for ThresholdError {
    fn from(err: hex::FromHexError) -> Self {
        ThresholdError::EncodingError(format!("hex decode error: {}", err))
    }
}

impl From<figment::Error> for ThresholdError {
    fn from(err: figment::Error) -> Self {
        ThresholdError::ConfigError(format!("config extraction failed: {}", err))
    }
}

impl From<rocksdb::Error> for ThresholdError {
    fn from(err: rocksdb::Error) -> Self {
        ThresholdError::StorageError { operation: "rocksdb".to_string(), details: err.to_string() }
    }
}

impl From<bincode::Error> for ThresholdError {
    fn from(err: bincode::Error) -> Self {
        ThresholdError::SerializationError { format: "bincode".to_string(), details: err.to_string() }
    }
}

#[macro_export]
macro_rules! storage_err {
    ($op:expr, $err:expr) => {
        $crate::foundation::ThresholdError::StorageError { operation: $op.into(), details: $err.to_string() }
    };
}

#[macro_export]
macro_rules! serde_err {
    ($fmt:expr, $err:expr) => {
        $crate::foundation::ThresholdError::SerializationError { format: $fmt.into(), details: $err.to_string() }
    };
}

impl From<io::Error> for ThresholdError {
    fn from(err: io::Error) -> Self {
        ThresholdError::StorageError { operation: "io".to_string(), details: err.to_string() }
    }
}

impl From<serde_json::Error> for ThresholdError {
    fn from(err: serde_json::Error) -> Self {
        ThresholdError::SerializationError { format: "json".to_string(), details: err.to_string() }
    }
}
