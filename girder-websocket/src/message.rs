//! WebSocket message types.

use crate::frame::{CloseCode, Frame, OpCode, close_payload};
use serde::{Deserialize, Serialize};

/// Message type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Text message
    Text,
    /// Binary message
    Binary,
    /// Ping message
    Ping,
    /// Pong message
    Pong,
    /// Close message
    Close,
}

/// A complete WebSocket message, after reassembly of any fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// UTF-8 text
    Text(String),
    /// Binary data
    Binary(Vec<u8>),
    /// Ping with its application data
    Ping(Vec<u8>),
    /// Pong with its application data
    Pong(Vec<u8>),
    /// Close with an optional status code and reason
    Close(Option<(CloseCode, String)>),
}

impl Message {
    /// Create a new text message.
    pub fn text<S: Into<String>>(text: S) -> Self {
        Message::Text(text.into())
    }

    /// Create a new binary message.
    pub fn binary<B: Into<Vec<u8>>>(data: B) -> Self {
        Message::Binary(data.into())
    }

    /// Create a close message carrying a status.
    pub fn close(code: CloseCode, reason: impl Into<String>) -> Self {
        Message::Close(Some((code, reason.into())))
    }

    /// Create a JSON text message from a serializable value.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(value)?;
        Ok(Self::text(json))
    }

    /// Parse the message payload as JSON.
    pub fn parse_json<'a, T: Deserialize<'a>>(&'a self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(self.as_bytes())
    }

    /// Get the payload as a string, for text messages only.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Get the message payload as bytes. Close messages yield their reason.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(data) | Message::Ping(data) | Message::Pong(data) => data,
            Message::Close(Some((_, reason))) => reason.as_bytes(),
            Message::Close(None) => &[],
        }
    }

    /// Kind of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Text(_) => MessageType::Text,
            Message::Binary(_) => MessageType::Binary,
            Message::Ping(_) => MessageType::Ping,
            Message::Pong(_) => MessageType::Pong,
            Message::Close(_) => MessageType::Close,
        }
    }

    /// Check if this is a close message.
    pub fn is_close(&self) -> bool {
        matches!(self, Message::Close(_))
    }

    /// Single unmasked frame carrying this message, as a server sends it.
    pub fn into_frame(self) -> Frame {
        match self {
            Message::Text(text) => Frame::new(OpCode::Text, text.into_bytes()),
            Message::Binary(data) => Frame::new(OpCode::Binary, data),
            Message::Ping(data) => Frame::new(OpCode::Ping, data),
            Message::Pong(data) => Frame::new(OpCode::Pong, data),
            Message::Close(Some((code, reason))) => {
                Frame::new(OpCode::Close, close_payload(code, &reason))
            }
            Message::Close(None) => Frame::new(OpCode::Close, Vec::new()),
        }
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Message::Binary(data)
    }
}
