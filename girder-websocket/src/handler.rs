//! WebSocket handler trait for implementing custom message handling.

use crate::connection::Connection;
use crate::error::WebSocketError;
use crate::frame::CloseCode;
use crate::hub::Hub;
use crate::message::Message;
use std::sync::Arc;

/// Trait for handling WebSocket events.
///
/// Every method defaults to a no-op. Callbacks run on the worker thread that
/// owns the connection's session, so a slow callback only stalls that socket.
/// The hub lock is never held while a callback runs, so callbacks may freely
/// call back into the hub.
pub trait WebSocketHandler: Send + Sync + 'static {
    /// Called once the connection is registered and open.
    fn on_open(&self, hub: &Hub, conn: &Arc<Connection>) {
        let _ = (hub, conn);
    }

    /// Called for every complete text or binary message.
    fn on_message(&self, hub: &Hub, conn: &Arc<Connection>, message: Message) {
        let _ = (hub, conn, message);
    }

    /// Called when a protocol or I/O error ends the session.
    fn on_error(&self, hub: &Hub, conn: &Arc<Connection>, error: &WebSocketError) {
        let _ = (hub, conn, error);
    }

    /// Called after the connection has been unregistered.
    fn on_close(&self, hub: &Hub, conn: &Arc<Connection>, reason: Option<&(CloseCode, String)>) {
        let _ = (hub, conn, reason);
    }

    /// Called when a ping arrives. The pong reply has already been sent.
    fn on_ping(&self, hub: &Hub, conn: &Arc<Connection>, payload: &[u8]) {
        let _ = (hub, conn, payload);
    }

    /// Called when a pong arrives.
    fn on_pong(&self, hub: &Hub, conn: &Arc<Connection>, payload: &[u8]) {
        let _ = (hub, conn, payload);
    }
}

/// A no-op handler that logs events.
#[derive(Debug, Default, Clone)]
pub struct LoggingHandler;

impl WebSocketHandler for LoggingHandler {
    fn on_open(&self, _hub: &Hub, conn: &Arc<Connection>) {
        tracing::info!(connection_id = conn.id, remote_addr = ?conn.remote_addr, "Client connected");
    }

    fn on_message(&self, _hub: &Hub, conn: &Arc<Connection>, message: Message) {
        tracing::debug!(
            connection_id = conn.id,
            message_type = ?message.message_type(),
            payload_len = message.as_bytes().len(),
            "Received message"
        );
    }

    fn on_error(&self, _hub: &Hub, conn: &Arc<Connection>, error: &WebSocketError) {
        tracing::error!(connection_id = conn.id, error = %error, "WebSocket error");
    }

    fn on_close(&self, _hub: &Hub, conn: &Arc<Connection>, reason: Option<&(CloseCode, String)>) {
        tracing::info!(
            connection_id = conn.id,
            code = reason.map(|(code, _)| code.as_u16()),
            "Client disconnected"
        );
    }
}
