//! Error types for Osprey

use thiserror::Error;

/// Unified error type for all Osprey transport operations.
///
/// Every variant is fatal to the connection that produced it; the transport
/// never retries internally.
#[derive(Debug, Error)]
pub enum OspreyError {
    /// No algorithm in a required category is supported by both sides.
    #[error("Negotiation error: no common {category} algorithm (client: {client:?}, server: {server:?})")]
    Negotiation {
        /// Category that failed (e.g. "encryption client to server")
        category: &'static str,
        /// Client's preference list
        client: Vec<String>,
        /// Server's preference list
        server: Vec<String>,
    },

    /// Unexpected message, malformed key exchange field, or host key
    /// signature verification failure.
    #[error("Key exchange error: {0}")]
    KeyExchange(String),

    /// MAC mismatch (or an unverifiable length field) on an authenticated packet.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Underlying I/O failure.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Request for an unregistered algorithm, or an unusable configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed input outside the integrity path.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The peer sent SSH_MSG_DISCONNECT.
    #[error("Disconnected by peer (reason {reason}): {description}")]
    Disconnected {
        /// RFC 4253 Section 11.1 reason code
        reason: u32,
        /// Human readable description sent by the peer
        description: String,
    },

    /// The session already failed or was disconnected.
    #[error("Session is closed")]
    Closed,
}

/// Fieldless view of [`OspreyError`] for matching on the failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`OspreyError::Negotiation`]
    Negotiation,
    /// See [`OspreyError::KeyExchange`]
    KeyExchange,
    /// See [`OspreyError::Integrity`]
    Integrity,
    /// See [`OspreyError::Transport`]
    Transport,
    /// See [`OspreyError::Configuration`]
    Configuration,
    /// See [`OspreyError::Protocol`]
    Protocol,
    /// See [`OspreyError::Disconnected`]
    Disconnected,
    /// See [`OspreyError::Closed`]
    Closed,
}

impl OspreyError {
    /// Returns the taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OspreyError::Negotiation { .. } => ErrorKind::Negotiation,
            OspreyError::KeyExchange(_) => ErrorKind::KeyExchange,
            OspreyError::Integrity(_) => ErrorKind::Integrity,
            OspreyError::Transport(_) => ErrorKind::Transport,
            OspreyError::Configuration(_) => ErrorKind::Configuration,
            OspreyError::Protocol(_) => ErrorKind::Protocol,
            OspreyError::Disconnected { .. } => ErrorKind::Disconnected,
            OspreyError::Closed => ErrorKind::Closed,
        }
    }

    /// Returns the SSH_MSG_DISCONNECT reason code (RFC 4253 Section 11.1)
    /// to report to the peer when this error aborts a session.
    pub fn disconnect_reason(&self) -> u32 {
        match self {
            OspreyError::Negotiation { .. } | OspreyError::KeyExchange(_) => 3,
            OspreyError::Integrity(_) => 5,
            OspreyError::Protocol(_) => 2,
            OspreyError::Transport(_)
            | OspreyError::Configuration(_)
            | OspreyError::Disconnected { .. }
            | OspreyError::Closed => 11,
        }
    }

    /// Returns `true` if the error is fatal to the connection.
    ///
    /// Always `true` at this layer; kept as a method so callers do not
    /// hard-code that assumption.
    pub fn is_fatal(&self) -> bool {
        true
    }
}

/// Result type for Osprey operations
pub type OspreyResult<T> = Result<T, OspreyError>;
