//! Connection handling: one accepted socket becomes exactly one response or
//! one WebSocket session.
//!
//! Keep-alive is not supported. Every response carries `Connection: close`
//! and the socket is dropped once it is written.

use crate::application::Application;
use crate::config::ServerConfig;
use crate::error::Error;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::logging::{ACCESS_TARGET, debug, error, info, warn};
use crate::parser::{Parsed, parse_request};
use girder_websocket::{
    CloseCode, Frame, Hub, is_upgrade_request, run_session, switching_protocols_response,
    validate_handshake,
};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Instant;

const READ_CHUNK: usize = 4096;

/// Sent when the request cannot be parsed at all.
pub const BAD_REQUEST_RESPONSE: &[u8] = b"HTTP/1.1 400 Bad Request\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
Content-Length: 11\r\n\
Connection: close\r\n\
\r\n\
Bad Request";

/// Sent when a response cannot be serialized.
pub const INTERNAL_ERROR_RESPONSE: &[u8] = b"HTTP/1.1 500 Internal Server Error\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
Content-Length: 21\r\n\
Connection: close\r\n\
\r\n\
Internal Server Error";

/// What reading the socket produced
#[derive(Debug)]
pub enum ReadOutcome {
    /// Peer closed before sending anything
    Closed,
    Request(Box<HttpRequest>),
    /// Unparseable request, answered with the fixed 400
    Malformed(Error),
    /// Parseable but refused, answered with the error's JSON response
    Rejected(Error),
}

/// Read one request from `reader`, never buffering more than
/// `max_header_size + max_body_size` bytes.
pub fn read_request<R: Read>(reader: &mut R, config: &ServerConfig) -> io::Result<ReadOutcome> {
    let limit = config.max_request_size();
    let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK.min(limit));
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if n == 0 {
            if buf.is_empty() {
                return Ok(ReadOutcome::Closed);
            }
            return Ok(ReadOutcome::Malformed(Error::MalformedRequest(
                "connection closed mid-request".into(),
            )));
        }
        buf.extend_from_slice(&chunk[..n]);

        match parse_request(&buf, config.max_header_size, config.max_body_size) {
            Ok(Parsed::Complete(request)) => return Ok(ReadOutcome::Request(Box::new(request))),
            Ok(Parsed::Incomplete { .. }) => {}
            Err(err @ Error::MalformedRequest(_)) => return Ok(ReadOutcome::Malformed(err)),
            Err(err) => return Ok(ReadOutcome::Rejected(err)),
        }

        if buf.len() >= limit {
            return Ok(ReadOutcome::Rejected(Error::PayloadTooLarge {
                size: buf.len(),
                limit,
            }));
        }
    }
}

/// Handles accepted sockets for one application.
#[derive(Clone)]
pub struct ConnectionHandler {
    app: Arc<Application>,
    config: Arc<ServerConfig>,
}

impl ConnectionHandler {
    pub fn new(app: Arc<Application>, config: Arc<ServerConfig>) -> Self {
        Self { app, config }
    }

    pub fn app(&self) -> &Arc<Application> {
        &self.app
    }

    /// Serve `stream` to completion. I/O failures are logged, never propagated.
    pub fn handle(&self, mut stream: TcpStream, peer: SocketAddr) {
        let started = Instant::now();

        if let Err(e) = stream
            .set_read_timeout(self.config.read_timeout())
            .and_then(|_| stream.set_write_timeout(self.config.write_timeout()))
        {
            warn!(peer = %peer, error = %e, "Failed to apply socket timeouts");
        }

        let outcome = match read_request(&mut stream, &self.config) {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(peer = %peer, error = %e, "Read failed; dropping connection");
                return;
            }
        };

        let mut request = match outcome {
            ReadOutcome::Closed => {
                debug!(peer = %peer, "Connection closed before a request arrived");
                return;
            }
            ReadOutcome::Malformed(err) => {
                debug!(peer = %peer, error = %err, "Malformed request");
                let written = write_raw(&mut stream, peer, BAD_REQUEST_RESPONSE);
                self.access_log(None, peer, 400, written, started);
                return;
            }
            ReadOutcome::Rejected(err) => {
                debug!(peer = %peer, error = %err, "Request rejected");
                let response = err.to_response();
                let written = self.write_response(&mut stream, peer, &response, true);
                self.access_log(None, peer, response.status, written, started);
                return;
            }
            ReadOutcome::Request(request) => request,
        };
        request.remote_addr = Some(peer);

        if let Some(hub) = self.app.websocket_hub(&request.path) {
            if is_upgrade_request(|name| request.header(name)) {
                self.upgrade(stream, peer, &request, Arc::clone(hub), started);
                return;
            }
        }

        let response = self.app.respond(&request);
        let include_body = request.method != HttpMethod::HEAD;
        let written = self.write_response(&mut stream, peer, &response, include_body);
        self.access_log(Some(request.as_ref()), peer, response.status, written, started);
    }

    fn upgrade(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
        request: &HttpRequest,
        hub: Arc<Hub>,
        started: Instant,
    ) {
        let accept = match validate_handshake(|name| request.header(name)) {
            Ok(accept) => accept,
            Err(err) => {
                debug!(peer = %peer, header = err.header(), "WebSocket handshake rejected");
                let response = Error::Handshake(err).to_response();
                let written = self.write_response(&mut stream, peer, &response, true);
                self.access_log(Some(request), peer, response.status, written, started);
                return;
            }
        };

        let handshake = switching_protocols_response(&accept);
        if let Err(e) = stream.write_all(&handshake).and_then(|_| stream.flush()) {
            warn!(peer = %peer, error = %e, "Failed to write handshake response");
            return;
        }
        self.app.stats().record_upgrade();
        self.access_log(Some(request), peer, 101, handshake.len(), started);

        // Sessions idle between messages; only the hub's owner decides liveness
        if let Err(e) = stream.set_read_timeout(None) {
            warn!(peer = %peer, error = %e, "Failed to clear read timeout");
        }

        let writer = match stream.try_clone() {
            Ok(writer) => writer,
            Err(e) => {
                error!(peer = %peer, error = %e, "Failed to clone socket for WebSocket writer");
                return;
            }
        };

        let conn = match hub.register(Box::new(writer), Some(peer)) {
            Ok(conn) => conn,
            Err(err) => {
                warn!(peer = %peer, error = %err, "WebSocket connection refused");
                let close = Frame::close(CloseCode::PolicyViolation, "server at capacity");
                if let Err(e) = stream.write_all(&close.encode()) {
                    debug!(peer = %peer, error = %e, "Close frame not delivered");
                }
                return;
            }
        };

        info!(connection_id = conn.id, peer = %peer, path = %request.path, "WebSocket session opened");
        match run_session(&hub, &conn, &stream) {
            Ok(()) => debug!(connection_id = conn.id, "WebSocket session closed"),
            Err(err) => debug!(connection_id = conn.id, error = %err, "WebSocket session ended with error"),
        }
        let _ = stream.shutdown(Shutdown::Both);
    }

    /// Write `response`, falling back to the fixed 500 when it cannot be
    /// serialized. Returns the bytes written.
    fn write_response(
        &self,
        stream: &mut TcpStream,
        peer: SocketAddr,
        response: &HttpResponse,
        include_body: bool,
    ) -> usize {
        match response.to_bytes_with(include_body) {
            Ok(bytes) => write_raw(stream, peer, &bytes),
            Err(err) => {
                error!(peer = %peer, status = response.status, error = %err, "Failed to format response");
                write_raw(stream, peer, INTERNAL_ERROR_RESPONSE)
            }
        }
    }

    /// One access line per answered connection. `request` is `None` when
    /// the request was refused before it parsed; method and path log as `-`.
    fn access_log(
        &self,
        request: Option<&HttpRequest>,
        peer: SocketAddr,
        status: u16,
        bytes: usize,
        started: Instant,
    ) {
        if !self.config.access_log {
            return;
        }
        info!(
            target: ACCESS_TARGET,
            method = request.map_or("-", |r| r.method.as_str()),
            path = request.map_or("-", |r| r.path.as_str()),
            status,
            bytes,
            duration_us = started.elapsed().as_micros() as u64,
            peer = %peer,
            "request"
        );
    }
}

fn write_raw(stream: &mut TcpStream, peer: SocketAddr, bytes: &[u8]) -> usize {
    match stream.write_all(bytes).and_then(|_| stream.flush()) {
        Ok(()) => {
            let _ = stream.shutdown(Shutdown::Write);
            bytes.len()
        }
        Err(e) => {
            warn!(peer = %peer, error = %e, "Failed to write response");
            0
        }
    }
}
