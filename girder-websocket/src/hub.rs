//! Connection registry with room-based broadcasting.
//!
//! All maps live behind one [`parking_lot::Mutex`]. Fan-out snapshots its
//! targets under the lock and writes after releasing it, so a slow socket
//! never blocks registration or room changes. Per-connection write failures
//! are logged and skipped.

use crate::config::WebSocketConfig;
use crate::connection::{BoxedWriter, Connection, ConnectionId, ConnectionState};
use crate::error::{WebSocketError, WebSocketResult};
use crate::frame::{CloseCode, Frame};
use crate::handler::WebSocketHandler;
use crate::message::Message;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Default)]
struct HubInner {
    connections: HashMap<ConnectionId, Arc<Connection>>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

/// Shared registry of open connections and the rooms they joined.
pub struct Hub {
    inner: Mutex<HubInner>,
    next_id: AtomicU64,
    config: WebSocketConfig,
    handler: Arc<dyn WebSocketHandler>,
}

impl Hub {
    /// Create a hub dispatching events to `handler`.
    pub fn new<H: WebSocketHandler>(config: WebSocketConfig, handler: H) -> Self {
        Self::with_handler(config, Arc::new(handler))
    }

    /// Create a hub from a shared handler.
    pub fn with_handler(config: WebSocketConfig, handler: Arc<dyn WebSocketHandler>) -> Self {
        Self {
            inner: Mutex::new(HubInner::default()),
            next_id: AtomicU64::new(1),
            config,
            handler,
        }
    }

    /// Hub configuration.
    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    /// Event handler.
    pub fn handler(&self) -> &Arc<dyn WebSocketHandler> {
        &self.handler
    }

    /// Register a new connection writing to `writer`.
    ///
    /// Fails with [`WebSocketError::TooManyConnections`] when the hub is full,
    /// in which case nothing is registered.
    pub fn register(
        &self,
        writer: BoxedWriter,
        remote_addr: Option<SocketAddr>,
    ) -> WebSocketResult<Arc<Connection>> {
        let conn = {
            let mut inner = self.inner.lock();
            let limit = self.config.max_connections;
            if inner.connections.len() >= limit {
                tracing::warn!(limit, "WebSocket connection rejected: hub full");
                return Err(WebSocketError::TooManyConnections { limit });
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let conn = Arc::new(Connection::new(id, writer, remote_addr));
            conn.transition(ConnectionState::Open);
            inner.connections.insert(id, Arc::clone(&conn));
            conn
        };

        tracing::debug!(connection_id = conn.id, remote_addr = ?remote_addr, "Connection registered");
        self.handler.on_open(self, &conn);
        Ok(conn)
    }

    /// Remove a connection from its rooms and the registry, then mark it closed.
    ///
    /// Returns `None` if the connection was already gone.
    pub fn unregister(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let conn = {
            let mut inner = self.inner.lock();
            let conn = inner.connections.get(&id).cloned()?;
            let joined: Vec<String> = conn.rooms.lock().drain().collect();
            for room in joined {
                if let Some(members) = inner.rooms.get_mut(&room) {
                    members.remove(&id);
                    if members.is_empty() {
                        inner.rooms.remove(&room);
                    }
                }
            }
            inner.connections.remove(&id);
            conn
        };

        conn.transition(ConnectionState::Closing);
        conn.transition(ConnectionState::Closed);
        tracing::debug!(connection_id = id, "Connection unregistered");
        let reason = conn.close_reason();
        self.handler.on_close(self, &conn, reason.as_ref());
        Some(conn)
    }

    /// Look up a connection.
    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.inner.lock().connections.get(&id).cloned()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// Ids of every registered connection.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.inner.lock().connections.keys().copied().collect()
    }

    /// Add a connection to a room. Returns `false` if it was already a member.
    pub fn join_room(&self, id: ConnectionId, room: &str) -> WebSocketResult<bool> {
        let mut inner = self.inner.lock();
        let conn = inner
            .connections
            .get(&id)
            .cloned()
            .ok_or(WebSocketError::ConnectionNotFound(id))?;
        let added = inner.rooms.entry(room.to_string()).or_default().insert(id);
        conn.rooms.lock().insert(room.to_string());
        if added {
            tracing::debug!(connection_id = id, room, "Joined room");
        }
        Ok(added)
    }

    /// Remove a connection from a room. Leaving a room twice is harmless.
    pub fn leave_room(&self, id: ConnectionId, room: &str) -> bool {
        let mut inner = self.inner.lock();
        let removed = match inner.rooms.get_mut(room) {
            Some(members) => {
                let removed = members.remove(&id);
                if members.is_empty() {
                    inner.rooms.remove(room);
                }
                removed
            }
            None => false,
        };
        if let Some(conn) = inner.connections.get(&id) {
            conn.rooms.lock().remove(room);
        }
        removed
    }

    /// Whether a connection is a member of a room.
    pub fn in_room(&self, id: ConnectionId, room: &str) -> bool {
        self.inner
            .lock()
            .rooms
            .get(room)
            .is_some_and(|members| members.contains(&id))
    }

    /// Number of members in a room. Unknown rooms have none.
    pub fn room_size(&self, room: &str) -> usize {
        self.inner.lock().rooms.get(room).map_or(0, HashSet::len)
    }

    /// Rooms a connection belongs to.
    pub fn rooms_of(&self, id: ConnectionId) -> Vec<String> {
        self.inner
            .lock()
            .connections
            .get(&id)
            .map(|conn| conn.rooms())
            .unwrap_or_default()
    }

    /// Names of every non-empty room.
    pub fn room_names(&self) -> Vec<String> {
        self.inner.lock().rooms.keys().cloned().collect()
    }

    /// Send a message to one connection.
    pub fn send(&self, id: ConnectionId, message: Message) -> WebSocketResult<()> {
        let conn = self.get(id).ok_or(WebSocketError::ConnectionNotFound(id))?;
        conn.send(message)
    }

    /// Send to every connection. Returns how many writes succeeded.
    pub fn broadcast(&self, message: Message) -> usize {
        let targets = self.snapshot(|_| true);
        deliver(&targets, &message.into_frame())
    }

    /// Send to every member of `room`.
    pub fn broadcast_to_room(&self, room: &str, message: Message) -> usize {
        let targets: Vec<Arc<Connection>> = {
            let inner = self.inner.lock();
            match inner.rooms.get(room) {
                Some(members) => members
                    .iter()
                    .filter_map(|id| inner.connections.get(id).cloned())
                    .collect(),
                None => Vec::new(),
            }
        };
        deliver(&targets, &message.into_frame())
    }

    /// Send to every connection except `exclude`.
    pub fn broadcast_except(&self, exclude: ConnectionId, message: Message) -> usize {
        let targets = self.snapshot(|id| id != exclude);
        deliver(&targets, &message.into_frame())
    }

    fn snapshot(&self, keep: impl Fn(ConnectionId) -> bool) -> Vec<Arc<Connection>> {
        self.inner
            .lock()
            .connections
            .iter()
            .filter(|(id, _)| keep(**id))
            .map(|(_, conn)| Arc::clone(conn))
            .collect()
    }

    /// Ping one connection.
    pub fn ping(&self, id: ConnectionId) -> WebSocketResult<()> {
        let conn = self.get(id).ok_or(WebSocketError::ConnectionNotFound(id))?;
        conn.send(Message::Ping(Vec::new()))?;
        conn.record_ping();
        Ok(())
    }

    /// Ping every connection. Returns how many pings were written.
    pub fn ping_all(&self) -> usize {
        let targets = self.snapshot(|_| true);
        let bytes = Frame::ping(Vec::new()).encode();
        let mut sent = 0;
        for conn in &targets {
            if conn.is_open() && conn.send_raw(&bytes).is_ok() {
                conn.record_ping();
                sent += 1;
            }
        }
        sent
    }

    /// Note a pong from `id`. Returns `false` for unknown connections.
    pub fn record_pong(&self, id: ConnectionId) -> bool {
        match self.get(id) {
            Some(conn) => {
                conn.record_pong();
                true
            }
            None => false,
        }
    }

    /// Connections that have not answered within `timeout`.
    pub fn stale_connections(&self, timeout: Duration) -> Vec<ConnectionId> {
        self.inner
            .lock()
            .connections
            .values()
            .filter(|conn| conn.idle_for() > timeout)
            .map(|conn| conn.id)
            .collect()
    }

    /// Close and unregister every stale connection. Returns how many were evicted.
    pub fn evict_stale(&self, timeout: Duration) -> usize {
        let stale = self.stale_connections(timeout);
        let mut evicted = 0;
        for id in stale {
            if let Some(conn) = self.get(id) {
                if let Err(e) = conn.close(CloseCode::GoingAway, "pong timeout") {
                    tracing::debug!(connection_id = id, error = %e, "Close frame not delivered");
                }
            }
            if self.unregister(id).is_some() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            tracing::info!(evicted, "Evicted stale WebSocket connections");
        }
        evicted
    }

    /// Send a close frame to every connection.
    pub fn close_all(&self, code: CloseCode, reason: &str) {
        for conn in self.snapshot(|_| true) {
            if let Err(e) = conn.close(code, reason) {
                tracing::debug!(connection_id = conn.id, error = %e, "Close frame not delivered");
            }
        }
    }
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Hub")
            .field("connections", &inner.connections.len())
            .field("rooms", &inner.rooms.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn deliver(targets: &[Arc<Connection>], frame: &Frame) -> usize {
    let bytes = frame.encode();
    let mut delivered = 0;
    let mut failed = 0;
    for conn in targets {
        if !conn.is_open() {
            continue;
        }
        match conn.send_raw(&bytes) {
            Ok(()) => delivered += 1,
            Err(e) => {
                failed += 1;
                tracing::warn!(connection_id = conn.id, error = %e, "Broadcast write failed");
            }
        }
    }
    if failed > 0 {
        tracing::debug!(delivered, failed, "Broadcast finished with failures");
    }
    delivered
}
