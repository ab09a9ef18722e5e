//! Error types for PeerChat
//!
//! Transport and session failures, chat facade errors, identity (key file) errors
//! and peer address parsing errors.

use std::path::PathBuf;

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

/// Errors raised by a transport or by a single peer session
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Peer closed the connection")]
    Eof,
    #[error("Transport shutdown")]
    Shutdown,
    #[error("Network I/O error: {0}")]
    NetworkIo(#[from] std::io::Error),
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
    #[error("Transport already started")]
    AlreadyStarted,
    #[error("Message code {code} outside protocol range 0..{length}")]
    UnknownCode { code: u64, length: u64 },
    #[error("Frame exceeds limit of {limit} bytes")]
    FrameTooLarge { limit: usize },
    #[error("Malformed payload: {reason}")]
    Decode { reason: String },
    #[error("Encoding failed: {reason}")]
    Encode { reason: String },
    #[error("Handshake failed with {peer}: {reason}")]
    HandshakeFailed { peer: String, reason: String },
    #[error("Protocol mismatch: expected {expected}, got {actual}")]
    ProtocolMismatch { expected: String, actual: String },
    #[error("Transport timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
    #[error("Invalid transport configuration: {reason}")]
    InvalidConfiguration { reason: String },
    #[error("Session task failed: {reason}")]
    TaskFailed { reason: String },
}

impl TransportError {
    /// Whether the error is a graceful end of stream rather than a failure
    pub fn is_eof(&self) -> bool {
        match self {
            TransportError::Eof => true,
            TransportError::NetworkIo(err) => err.kind() == std::io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }

    pub fn decode(reason: impl ToString) -> Self {
        TransportError::Decode {
            reason: reason.to_string(),
        }
    }

    pub fn encode(reason: impl ToString) -> Self {
        TransportError::Encode {
            reason: reason.to_string(),
        }
    }

    pub fn handshake(peer: impl ToString, reason: impl ToString) -> Self {
        TransportError::HandshakeFailed {
            peer: peer.to_string(),
            reason: reason.to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Chat Errors
// ----------------------------------------------------------------------------

/// Errors surfaced by the chat facade
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Failed to start transport: {0}")]
    TransportStart(#[source] TransportError),
    #[error("Invalid channel configuration: {reason}")]
    InvalidConfiguration { reason: String },
    #[error("Send cancelled")]
    Cancelled,
    #[error("Chat is no longer accepting messages")]
    Closed,
}

// ----------------------------------------------------------------------------
// Identity Errors
// ----------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Key file {path} I/O error: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid key: {reason}")]
    InvalidKey { reason: String },
    #[error("Signature verification failed")]
    SignatureVerificationFailed,
}

// ----------------------------------------------------------------------------
// Peer Address Errors
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeerAddrError {
    #[error("Peer address {input:?} is not of the form <public key>@<host>:<port>")]
    InvalidFormat { input: String },
    #[error("Invalid peer public key: {reason}")]
    InvalidKey { reason: String },
    #[error("Peer address {input:?} has no host")]
    MissingHost { input: String },
    #[error("Invalid port {port:?}")]
    InvalidPort { port: String },
}
