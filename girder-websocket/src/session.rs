//! Blocking read loop for one upgraded socket.

use crate::connection::{Connection, ConnectionState};
use crate::error::{FrameError, WebSocketError, WebSocketResult};
use crate::frame::{CloseCode, Frame, FrameDecoder, OpCode, parse_close_payload};
use crate::hub::Hub;
use crate::message::Message;
use std::io::{ErrorKind, Read};
use std::sync::Arc;

const READ_CHUNK: usize = 8 * 1024;

enum Flow {
    Continue,
    Stop,
}

/// Reassembles fragmented data frames into messages.
#[derive(Debug)]
pub struct MessageAssembler {
    opcode: Option<OpCode>,
    buf: Vec<u8>,
    max_message_size: usize,
}

impl MessageAssembler {
    /// Create an assembler enforcing `max_message_size` on the whole message.
    pub fn new(max_message_size: usize) -> Self {
        Self {
            opcode: None,
            buf: Vec::new(),
            max_message_size,
        }
    }

    /// Feed a data frame. Returns the message once its final fragment arrives.
    pub fn push(&mut self, frame: Frame) -> WebSocketResult<Option<Message>> {
        match (frame.opcode, self.opcode) {
            (OpCode::Continuation, None) => {
                return Err(FrameError::malformed("continuation frame without a message").into());
            }
            (OpCode::Text | OpCode::Binary, Some(_)) => {
                return Err(FrameError::malformed("new message before previous one finished").into());
            }
            (OpCode::Text | OpCode::Binary, None) => self.opcode = Some(frame.opcode),
            (OpCode::Continuation, Some(_)) => {}
            (other, _) => {
                return Err(FrameError::malformed(format!("{:?} is not a data frame", other)).into());
            }
        }

        let size = self.buf.len() + frame.payload.len();
        if size > self.max_message_size {
            return Err(WebSocketError::MessageTooLarge {
                size,
                limit: self.max_message_size,
            });
        }
        self.buf.extend_from_slice(&frame.payload);

        if !frame.fin {
            return Ok(None);
        }

        let data = std::mem::take(&mut self.buf);
        match self.opcode.take() {
            Some(OpCode::Text) => String::from_utf8(data)
                .map(|text| Some(Message::Text(text)))
                .map_err(|_| WebSocketError::InvalidUtf8),
            _ => Ok(Some(Message::Binary(data))),
        }
    }

    /// Whether a fragmented message is in progress.
    pub fn in_progress(&self) -> bool {
        self.opcode.is_some()
    }
}

/// Drive one registered connection until it closes.
///
/// Frames are read from `reader`; replies go through the connection's writer.
/// The connection is always unregistered from `hub` before this returns.
pub fn run_session<R: Read>(hub: &Hub, conn: &Arc<Connection>, reader: R) -> WebSocketResult<()> {
    tracing::debug!(connection_id = conn.id, "WebSocket session started");
    let result = read_loop(hub, conn, reader);

    if let Err(ref e) = result {
        tracing::debug!(connection_id = conn.id, error = %e, "WebSocket session failed");
        if !matches!(e, WebSocketError::Io(_)) {
            let reason = e.to_string();
            if let Err(close_err) = conn.close(e.close_code(), &reason) {
                tracing::debug!(connection_id = conn.id, error = %close_err, "Close frame not delivered");
            }
        }
        hub.handler().on_error(hub, conn, e);
    }

    hub.unregister(conn.id);
    tracing::debug!(connection_id = conn.id, "WebSocket session ended");
    result
}

fn read_loop<R: Read>(hub: &Hub, conn: &Arc<Connection>, mut reader: R) -> WebSocketResult<()> {
    let config = hub.config();
    let mut decoder = FrameDecoder::new(config.max_frame_size);
    let mut assembler = MessageAssembler::new(config.max_message_size);
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        while let Some(frame) = decoder.next_frame()? {
            if let Flow::Stop = handle_frame(hub, conn, &mut assembler, frame)? {
                return Ok(());
            }
        }

        match reader.read(&mut chunk) {
            Ok(0) => {
                conn.set_close_reason(CloseCode::Abnormal, "connection dropped");
                return Ok(());
            }
            Ok(n) => decoder.extend(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

fn handle_frame(
    hub: &Hub,
    conn: &Arc<Connection>,
    assembler: &mut MessageAssembler,
    frame: Frame,
) -> WebSocketResult<Flow> {
    if hub.config().require_masked && !frame.is_masked() {
        return Err(FrameError::malformed("client frame is not masked").into());
    }
    if frame.rsv1 || frame.rsv2 || frame.rsv3 {
        return Err(FrameError::malformed("reserved bits set without a negotiated extension").into());
    }

    let handler = hub.handler();
    match frame.opcode {
        OpCode::Ping => {
            if conn.is_open() {
                conn.send_frame(&Frame::pong(frame.payload.clone()))?;
            }
            handler.on_ping(hub, conn, &frame.payload);
        }
        OpCode::Pong => {
            hub.record_pong(conn.id);
            handler.on_pong(hub, conn, &frame.payload);
        }
        OpCode::Close => {
            let status = parse_close_payload(&frame.payload)?;
            match &status {
                Some((code, reason)) => conn.set_close_reason(*code, reason),
                None => conn.set_close_reason(CloseCode::NoStatus, ""),
            }
            // Answer only if we did not start the closing handshake ourselves.
            if conn.transition(ConnectionState::Closing) {
                let echo = match status {
                    Some((code, _)) => Frame::close(code, ""),
                    None => Frame::new(OpCode::Close, Vec::new()),
                };
                conn.send_frame(&echo)?;
            }
            return Ok(Flow::Stop);
        }
        OpCode::Text | OpCode::Binary | OpCode::Continuation => {
            if let Some(message) = assembler.push(frame)? {
                handler.on_message(hub, conn, message);
            }
        }
    }
    Ok(Flow::Continue)
}
