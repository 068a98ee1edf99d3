//! Error Taxonomy
//!
//! Every failure the ring can report, locally or over the wire. Each variant
//! carries a stable wire code so that a failure produced on one node can be
//! relayed through any number of hops and decoded back into the same variant
//! by the requesting node.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingError {
    /// Node id or key outside `[0, MAX_KEY]`.
    #[error("{0}")]
    InvalidId(String),

    #[error("{0}")]
    DuplicateId(String),

    /// Attempt to remove the bootstrap node.
    #[error("{0}")]
    ProtectedId(String),

    /// Unknown member id or unmapped key.
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    KeyExists(String),

    #[error("{0}")]
    MalformedRequest(String),

    /// A transfer acknowledgement or terminator never arrived.
    #[error("{0}")]
    TransferIncomplete(String),

    /// Connect or read failure towards a neighbor or the coordinator.
    #[error("{0}")]
    PeerUnreachable(String),

    #[error("{0}")]
    NotJoined(String),

    #[error("{0}")]
    AlreadyJoined(String),
}

impl RingError {
    pub fn code(&self) -> &'static str {
        match self {
            RingError::InvalidId(_) => "INVALID_ID",
            RingError::DuplicateId(_) => "DUPLICATE_ID",
            RingError::ProtectedId(_) => "PROTECTED_ID",
            RingError::NotFound(_) => "NOT_FOUND",
            RingError::KeyExists(_) => "KEY_EXISTS",
            RingError::MalformedRequest(_) => "MALFORMED_REQUEST",
            RingError::TransferIncomplete(_) => "TRANSFER_INCOMPLETE",
            RingError::PeerUnreachable(_) => "PEER_UNREACHABLE",
            RingError::NotJoined(_) => "NOT_JOINED",
            RingError::AlreadyJoined(_) => "ALREADY_JOINED",
        }
    }

    /// Rebuilds an error from its wire code and message.
    pub fn from_code(code: &str, message: impl Into<String>) -> Option<Self> {
        let message = message.into();
        let err = match code {
            "INVALID_ID" => RingError::InvalidId(message),
            "DUPLICATE_ID" => RingError::DuplicateId(message),
            "PROTECTED_ID" => RingError::ProtectedId(message),
            "NOT_FOUND" => RingError::NotFound(message),
            "KEY_EXISTS" => RingError::KeyExists(message),
            "MALFORMED_REQUEST" => RingError::MalformedRequest(message),
            "TRANSFER_INCOMPLETE" => RingError::TransferIncomplete(message),
            "PEER_UNREACHABLE" => RingError::PeerUnreachable(message),
            "NOT_JOINED" => RingError::NotJoined(message),
            "ALREADY_JOINED" => RingError::AlreadyJoined(message),
            _ => return None,
        };
        Some(err)
    }

    pub fn message(&self) -> &str {
        match self {
            RingError::InvalidId(m)
            | RingError::DuplicateId(m)
            | RingError::ProtectedId(m)
            | RingError::NotFound(m)
            | RingError::KeyExists(m)
            | RingError::MalformedRequest(m)
            | RingError::TransferIncomplete(m)
            | RingError::PeerUnreachable(m)
            | RingError::NotJoined(m)
            | RingError::AlreadyJoined(m) => m,
        }
    }
}

pub type RingResult<T> = Result<T, RingError>;
