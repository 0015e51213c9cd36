//! WebSocket connection management.

use crate::error::{WebSocketError, WebSocketResult};
use crate::frame::{CloseCode, Frame};
use crate::message::Message;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Write;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Unique identifier for a connection. Assigned by the hub, never reused.
pub type ConnectionId = u64;

/// Connection state. States only ever move forward in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionState {
    /// Handshake done, not yet registered
    Connecting,
    /// Registered with a hub
    Open,
    /// Close frame sent or received
    Closing,
    /// Unregistered
    Closed,
}

/// Write half of the socket, shared by the session and any broadcaster.
pub type BoxedWriter = Box<dyn Write + Send>;

/// A WebSocket connection.
pub struct Connection {
    /// Unique connection identifier
    pub id: ConnectionId,
    /// Remote address
    pub remote_addr: Option<SocketAddr>,
    connected_at: Instant,
    state: RwLock<ConnectionState>,
    pub(crate) rooms: Mutex<HashSet<String>>,
    metadata: RwLock<HashMap<String, String>>,
    last_ping: Mutex<Option<Instant>>,
    last_pong: Mutex<Option<Instant>>,
    close_reason: Mutex<Option<(CloseCode, String)>>,
    writer: Mutex<BoxedWriter>,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, writer: BoxedWriter, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            id,
            remote_addr,
            connected_at: Instant::now(),
            state: RwLock::new(ConnectionState::Connecting),
            rooms: Mutex::new(HashSet::new()),
            metadata: RwLock::new(HashMap::new()),
            last_ping: Mutex::new(None),
            last_pong: Mutex::new(None),
            close_reason: Mutex::new(None),
            writer: Mutex::new(writer),
        }
    }

    /// Get the connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Check if the connection is open.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Move to `next` if it is ahead of the current state.
    ///
    /// Returns `false` and leaves the state untouched otherwise.
    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut state = self.state.write();
        if next > *state {
            tracing::trace!(connection_id = self.id, from = ?*state, to = ?next, "State change");
            *state = next;
            true
        } else {
            false
        }
    }

    /// Send a message to this connection.
    pub fn send(&self, message: Message) -> WebSocketResult<()> {
        if !self.is_open() {
            return Err(WebSocketError::ConnectionClosed(self.id));
        }
        self.send_frame(&message.into_frame())
    }

    /// Send a text message.
    pub fn send_text<S: Into<String>>(&self, text: S) -> WebSocketResult<()> {
        self.send(Message::text(text))
    }

    /// Send a binary message.
    pub fn send_binary<B: Into<Vec<u8>>>(&self, data: B) -> WebSocketResult<()> {
        self.send(Message::binary(data))
    }

    /// Send a JSON message.
    pub fn send_json<T: serde::Serialize>(&self, value: &T) -> WebSocketResult<()> {
        let message = Message::json(value)?;
        self.send(message)
    }

    pub(crate) fn send_frame(&self, frame: &Frame) -> WebSocketResult<()> {
        self.send_raw(&frame.encode())
    }

    /// Write already-encoded frame bytes. Concurrent writers are serialized.
    pub fn send_raw(&self, bytes: &[u8]) -> WebSocketResult<()> {
        let mut writer = self.writer.lock();
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Start the closing handshake.
    ///
    /// Sends a close frame only on the first call while open.
    pub fn close(&self, code: CloseCode, reason: &str) -> WebSocketResult<()> {
        if !self.transition(ConnectionState::Closing) {
            return Ok(());
        }
        self.set_close_reason(code, reason);
        self.send_frame(&Frame::close(code, reason))
    }

    pub(crate) fn set_close_reason(&self, code: CloseCode, reason: &str) {
        let mut slot = self.close_reason.lock();
        if slot.is_none() {
            *slot = Some((code, reason.to_string()));
        }
    }

    /// Close status sent or received, if any.
    pub fn close_reason(&self) -> Option<(CloseCode, String)> {
        self.close_reason.lock().clone()
    }

    /// Rooms this connection has joined.
    pub fn rooms(&self) -> Vec<String> {
        self.rooms.lock().iter().cloned().collect()
    }

    /// Attach a metadata value.
    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.write().insert(key.into(), value.into());
    }

    /// Read a metadata value.
    pub fn metadata(&self, key: &str) -> Option<String> {
        self.metadata.read().get(key).cloned()
    }

    /// Remove a metadata value.
    pub fn remove_metadata(&self, key: &str) -> Option<String> {
        self.metadata.write().remove(key)
    }

    pub(crate) fn record_ping(&self) {
        *self.last_ping.lock() = Some(Instant::now());
    }

    pub(crate) fn record_pong(&self) {
        *self.last_pong.lock() = Some(Instant::now());
    }

    /// When the last ping was sent.
    pub fn last_ping(&self) -> Option<Instant> {
        *self.last_ping.lock()
    }

    /// When the last pong was received.
    pub fn last_pong(&self) -> Option<Instant> {
        *self.last_pong.lock()
    }

    /// Time since the last pong, or since connect if none arrived.
    pub fn idle_for(&self) -> Duration {
        self.last_pong().unwrap_or(self.connected_at).elapsed()
    }

    /// When the connection was accepted.
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("state", &self.state())
            .field("rooms", &*self.rooms.lock())
            .finish_non_exhaustive()
    }
}
