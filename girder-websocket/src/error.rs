//! Error types for WebSocket operations.
//!
//! A frame that has not fully arrived yet ([`FrameError::Incomplete`]) is
//! never reported as a frame that breaks the protocol
//! ([`FrameError::Malformed`]). Upgrade validation failures have their own
//! type, [`HandshakeError`].

use crate::connection::ConnectionId;
use crate::frame::CloseCode;
use thiserror::Error;

/// Outcome of decoding a frame that did not produce one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// More bytes are required before the frame can be decoded.
    #[error("incomplete frame: {needed} more bytes required")]
    Incomplete {
        /// Minimum number of additional bytes needed to make progress
        needed: usize,
    },

    /// The bytes violate RFC 6455.
    #[error("malformed frame: {0}")]
    Malformed(String),
}

impl FrameError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        FrameError::Malformed(reason.into())
    }

    /// Check if this error only means "read more bytes".
    pub fn is_incomplete(&self) -> bool {
        matches!(self, FrameError::Incomplete { .. })
    }
}

/// Validation failure of an HTTP upgrade request.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeError {
    /// No `Upgrade` header
    #[error("missing Upgrade header")]
    MissingUpgrade,

    /// `Upgrade` present but not `websocket`
    #[error("Upgrade header must be 'websocket'")]
    InvalidUpgrade,

    /// `Connection` header absent or without the `Upgrade` token
    #[error("Connection header must contain 'Upgrade'")]
    MissingConnectionUpgrade,

    /// `Sec-WebSocket-Version` absent or not 13
    #[error("Sec-WebSocket-Version must be 13")]
    UnsupportedVersion,

    /// `Sec-WebSocket-Key` absent or empty
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,
}

impl HandshakeError {
    /// Name of the header that failed validation.
    pub fn header(&self) -> &'static str {
        match self {
            HandshakeError::MissingUpgrade | HandshakeError::InvalidUpgrade => "Upgrade",
            HandshakeError::MissingConnectionUpgrade => "Connection",
            HandshakeError::UnsupportedVersion => "Sec-WebSocket-Version",
            HandshakeError::MissingKey => "Sec-WebSocket-Key",
        }
    }
}

/// WebSocket error type.
#[derive(Error, Debug)]
pub enum WebSocketError {
    /// Frame decoding error
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Upgrade validation error
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Hub is at capacity
    #[error("too many connections (limit {limit})")]
    TooManyConnections {
        /// Configured connection limit
        limit: usize,
    },

    /// Connection not registered with the hub
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// Connection is no longer open
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    /// Reassembled message exceeds the configured limit
    #[error("message of {size} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge {
        /// Size reached so far
        size: usize,
        /// Configured limit
        limit: usize,
    },

    /// Text message payload is not UTF-8
    #[error("text message is not valid UTF-8")]
    InvalidUtf8,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WebSocketError {
    /// Close code to send to the peer when this error ends a session.
    pub fn close_code(&self) -> CloseCode {
        match self {
            WebSocketError::Frame(_) => CloseCode::ProtocolError,
            WebSocketError::MessageTooLarge { .. } => CloseCode::MessageTooBig,
            WebSocketError::InvalidUtf8 => CloseCode::InvalidPayload,
            WebSocketError::TooManyConnections { .. } => CloseCode::PolicyViolation,
            _ => CloseCode::InternalError,
        }
    }
}

/// Result type for WebSocket operations.
pub type WebSocketResult<T> = Result<T, WebSocketError>;
