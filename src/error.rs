//! Error types for the gossip ledger

use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Main error type for ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// A block or chain was rejected by the validator
    #[error("Rejected: {0}")]
    Rejected(#[from] Rejection),

    /// A locally constructed block failed validation. Never retryable.
    #[error("Internal inconsistency: {0}")]
    InternalInconsistency(String),

    /// The shared chain broke one of its at-rest invariants
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a candidate block or chain was not accepted.
///
/// These are expected outcomes of gossip, not failures of the node: the
/// candidate is dropped and the node keeps serving.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("invalid block structure")]
    StructureInvalid,

    #[error("invalid index: expected {expected}, got {actual}")]
    IndexMismatch { expected: u64, actual: u64 },

    #[error("previous hash does not match predecessor")]
    LinkageMismatch,

    #[error("invalid hash: computed {computed}, stored {stored}")]
    DigestMismatch { computed: String, stored: String },

    #[error("first block is not the genesis block")]
    GenesisMismatch,

    #[error("candidate chain is empty")]
    EmptyCandidateChain,

    #[error("candidate chain of length {candidate} is not longer than current length {current}")]
    NotLonger { candidate: usize, current: usize },
}

/// Network-specific error types
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Failed to bind a listener
    #[error("Failed to bind to {addr}: {source}")]
    BindFailed {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to open a link to a peer
    #[error("Failed to connect to {addr}: {reason}")]
    ConnectionFailed { addr: String, reason: String },

    /// Peer address could not be understood
    #[error("Invalid peer address {addr}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    /// The link was removed from the registry
    #[error("Link to peer {peer} is closed")]
    LinkClosed { peer: String },
}

/// Serialization error types
#[derive(Error, Debug)]
pub enum SerializationError {
    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wire payload that does not decode into a protocol message
    #[error("Malformed message: {reason}")]
    MalformedMessage { reason: String },
}

impl LedgerError {
    /// Create an internal inconsistency error
    pub fn internal<T: Into<String>>(msg: T) -> Self {
        LedgerError::InternalInconsistency(msg.into())
    }

    /// Create an invariant violation error
    pub fn invariant<T: Into<String>>(msg: T) -> Self {
        LedgerError::InvariantViolation(msg.into())
    }

    /// Create a configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        LedgerError::Config(msg.into())
    }
}

impl SerializationError {
    /// Create a malformed message error
    pub fn malformed<T: Into<String>>(reason: T) -> Self {
        SerializationError::MalformedMessage {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(SerializationError::Json(err))
    }
}
