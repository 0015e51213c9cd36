//! # Girder WebSocket
//!
//! RFC 6455 WebSocket engine for the Girder server, built on blocking sockets.
//!
//! ## Features
//!
//! - Frame codec with incremental decoding across reads
//! - Upgrade handshake validation and accept-key computation
//! - Connection state machine with per-socket write serialization
//! - Hub with room-based broadcasting and liveness tracking
//! - Session loop with fragment reassembly and ping/pong handling
//!
//! ## Example
//!
//! ```rust,no_run
//! use girder_websocket::{Connection, Hub, Message, WebSocketConfig, WebSocketHandler};
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! impl WebSocketHandler for Echo {
//!     fn on_message(&self, hub: &Hub, conn: &Arc<Connection>, message: Message) {
//!         hub.broadcast_except(conn.id, message);
//!     }
//! }
//!
//! let hub = Hub::new(WebSocketConfig::default(), Echo);
//! assert_eq!(hub.connection_count(), 0);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod config;
mod connection;
mod error;
pub mod frame;
pub mod handshake;
mod handler;
mod hub;
mod message;
mod session;

pub use config::{WebSocketConfig, WebSocketConfigBuilder};
pub use connection::{BoxedWriter, Connection, ConnectionId, ConnectionState};
pub use error::{FrameError, HandshakeError, WebSocketError, WebSocketResult};
pub use frame::{CloseCode, Frame, FrameDecoder, OpCode};
pub use handler::{LoggingHandler, WebSocketHandler};
pub use handshake::{accept_key, is_upgrade_request, switching_protocols_response, validate_handshake};
pub use hub::Hub;
pub use message::{Message, MessageType};
pub use session::{MessageAssembler, run_session};
