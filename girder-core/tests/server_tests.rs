//! End-to-end behaviour over real loopback sockets.

use girder_core::websocket::{
    CloseCode, Connection, Frame, FrameDecoder, Hub, Message, OpCode, WebSocketConfig,
    WebSocketHandler,
};
use girder_core::{
    Application, HttpResponse, RecoveryMiddleware, RequestIdMiddleware, Result, Router, Server,
    ServerConfig,
};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WS_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
const WS_ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

struct Echo;

impl WebSocketHandler for Echo {
    fn on_message(&self, _hub: &Hub, conn: &Arc<Connection>, message: Message) {
        let _ = conn.send(message);
    }
}

fn test_config() -> ServerConfig {
    ServerConfig {
        port: 0,
        workers: Some(2),
        read_timeout_ms: 5_000,
        write_timeout_ms: 5_000,
        ..ServerConfig::default()
    }
}

fn router() -> Router {
    let mut router = Router::new();
    router
        .get("/hello/{name}", |ctx| -> Result<HttpResponse> {
            let name: String = ctx.param_as("name")?;
            Ok(HttpResponse::ok().with_text(format!("hello {}", name)))
        })
        .unwrap();
    router
        .post("/echo", |ctx| HttpResponse::ok().with_body(ctx.body().to_vec()))
        .unwrap();
    router
        .get("/panic", |_ctx| -> HttpResponse { panic!("handler exploded") })
        .unwrap();
    router
}

fn server(app: Application, config: ServerConfig) -> Server {
    Server::bind(app, config).unwrap()
}

/// Send `raw` from a client thread while the server accepts one connection;
/// returns everything the server wrote.
fn exchange(server: &Server, raw: Vec<u8>) -> String {
    let addr = server.local_addr();
    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream.write_all(&raw).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        String::from_utf8_lossy(&out).into_owned()
    });
    server.accept_one().unwrap();
    client.join().unwrap()
}

fn body(response: &str) -> &str {
    response.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or("")
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn test_get_route() {
    let server = server(Application::new(router()), test_config());
    let response = exchange(&server, b"GET /hello/girder HTTP/1.1\r\nHost: x\r\n\r\n".to_vec());

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Length: 12\r\n"));
    assert!(response.contains("Connection: close\r\n"));
    assert_eq!(body(&response), "hello girder");
}

#[test]
fn test_post_body_round_trip() {
    let server = server(Application::new(router()), test_config());
    let response = exchange(
        &server,
        b"POST /echo HTTP/1.1\r\nContent-Length: 9\r\n\r\npayload!!".to_vec(),
    );
    assert_eq!(body(&response), "payload!!");
}

#[test]
fn test_unknown_route_is_json_404() {
    let server = server(Application::new(router()), test_config());
    let response = exchange(&server, b"GET /missing HTTP/1.1\r\n\r\n".to_vec());

    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(response.contains("Content-Type: application/json\r\n"));
    let json: serde_json::Value = serde_json::from_str(body(&response)).unwrap();
    assert_eq!(json["detail"], "No route for GET /missing");
    assert_eq!(json["status"], 404);
}

#[test]
fn test_malformed_request_gets_fixed_400() {
    let server = server(Application::new(router()), test_config());
    let response = exchange(&server, b"THIS IS NOT HTTP\r\n\r\n".to_vec());

    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert_eq!(body(&response), "Bad Request");
}

#[test]
fn test_oversized_body_is_413() {
    let config = ServerConfig {
        max_body_size: 16,
        ..test_config()
    };
    let server = server(Application::new(router()), config);
    let response = exchange(
        &server,
        b"POST /echo HTTP/1.1\r\nContent-Length: 1000\r\n\r\n".to_vec(),
    );
    assert!(response.starts_with("HTTP/1.1 413 "));
}

#[test]
fn test_head_has_no_body() {
    let server = server(Application::new(router()), test_config());
    let response = exchange(&server, b"HEAD /hello/x HTTP/1.1\r\n\r\n".to_vec());

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Length: 7\r\n"));
    assert_eq!(body(&response), "");
}

#[test]
fn test_panic_becomes_500_with_recovery() {
    let mut app = Application::new(router());
    app.use_middleware(RecoveryMiddleware)
        .use_middleware(RequestIdMiddleware);
    let server = server(app, test_config());
    let response = exchange(&server, b"GET /panic HTTP/1.1\r\n\r\n".to_vec());

    assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    assert!(response.contains("X-Request-Id: "));
    let json: serde_json::Value = serde_json::from_str(body(&response)).unwrap();
    assert_eq!(json["status"], 500);
}

#[test]
fn test_health_reserved_route() {
    let server = server(Application::new(router()), test_config());
    let response = exchange(&server, b"GET /health HTTP/1.1\r\n\r\n".to_vec());

    let json: serde_json::Value = serde_json::from_str(body(&response)).unwrap();
    assert_eq!(json["status"], "UP");
    assert_eq!(json["components"][0]["name"], "server");
}

#[test]
fn test_active_connections_return_to_zero() {
    let server = server(Application::new(router()), test_config());
    for target in ["/hello/a", "/missing", "/panic"] {
        let raw = format!("GET {} HTTP/1.1\r\n\r\n", target).into_bytes();
        exchange(&server, raw);
    }
    assert!(wait_for(|| server.active_connections() == 0));
    assert!(wait_for(|| server.app().stats().requests() == 2));
}

#[test]
fn test_single_threaded_mode() {
    let config = ServerConfig {
        workers: Some(0),
        ..test_config()
    };
    let server = server(Application::new(router()), config);
    assert_eq!(server.worker_count(), 0);

    let response = exchange(&server, b"GET /hello/inline HTTP/1.1\r\n\r\n".to_vec());
    assert_eq!(body(&response), "hello inline");
    assert_eq!(server.active_connections(), 0);
}

// ========== WebSocket ==========

fn handshake(path: &str) -> Vec<u8> {
    format!(
        "GET {} HTTP/1.1\r\n\
         Host: localhost\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n",
        path, WS_KEY
    )
    .into_bytes()
}

struct WsClient {
    stream: TcpStream,
    decoder: FrameDecoder,
}

impl WsClient {
    /// Connect, upgrade, and return the client plus the handshake response head.
    fn connect(addr: SocketAddr) -> io::Result<(Self, String)> {
        let mut stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        stream.write_all(&handshake("/ws"))?;

        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let head_end = loop {
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "closed during handshake"));
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let mut decoder = FrameDecoder::new(usize::MAX);
        decoder.extend(&buf[head_end..]);
        let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
        Ok((Self { stream, decoder }, head))
    }

    fn send(&mut self, frame: Frame) {
        self.stream
            .write_all(&frame.with_mask([0x12, 0x34, 0x56, 0x78]).encode())
            .unwrap();
    }

    fn next_frame(&mut self) -> Frame {
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(frame) = self.decoder.next_frame().unwrap() {
                return frame;
            }
            let n = self.stream.read(&mut chunk).unwrap();
            assert!(n > 0, "server closed before sending a frame");
            self.decoder.extend(&chunk[..n]);
        }
    }
}

#[test]
fn test_websocket_echo_session() {
    let hub = Arc::new(Hub::new(WebSocketConfig::default(), Echo));
    let mut app = Application::new(router());
    app.websocket("/ws", Arc::clone(&hub)).unwrap();
    let server = server(app, test_config());
    let addr = server.local_addr();

    let client = thread::spawn(move || {
        let (mut client, head) = WsClient::connect(addr).unwrap();
        assert!(head.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(head.contains(&format!("Sec-WebSocket-Accept: {}\r\n", WS_ACCEPT)));

        client.send(Frame::text("hello hub"));
        let echo = client.next_frame();
        assert_eq!(echo.opcode, OpCode::Text);
        assert_eq!(echo.payload, b"hello hub");
        assert!(!echo.is_masked());

        client.send(Frame::close(CloseCode::Normal, "bye"));
        let close = client.next_frame();
        assert_eq!(close.opcode, OpCode::Close);
    });

    server.accept_one().unwrap();
    client.join().unwrap();

    assert!(wait_for(|| hub.connection_count() == 0));
    assert!(wait_for(|| server.active_connections() == 0));
    assert_eq!(server.app().stats().websocket_upgrades(), 1);
}

#[test]
fn test_websocket_bad_handshake_names_header() {
    let hub = Arc::new(Hub::new(WebSocketConfig::default(), Echo));
    let mut app = Application::new(router());
    app.websocket("/ws", hub).unwrap();
    let server = server(app, test_config());

    let raw = b"GET /ws HTTP/1.1\r\nUpgrade: websocket\r\nSec-WebSocket-Version: 13\r\n\r\n".to_vec();
    let response = exchange(&server, raw);

    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    let json: serde_json::Value = serde_json::from_str(body(&response)).unwrap();
    assert!(json["detail"].as_str().unwrap().contains("Connection"));
}

#[test]
fn test_websocket_full_hub_closes_with_policy_violation() {
    let config = WebSocketConfig::builder().max_connections(1).build();
    let hub = Arc::new(Hub::new(config, Echo));
    hub.register(Box::new(io::sink()), None).unwrap();

    let mut app = Application::new(router());
    app.websocket("/ws", Arc::clone(&hub)).unwrap();
    let server = server(app, test_config());
    let addr = server.local_addr();

    let client = thread::spawn(move || {
        let (mut client, head) = WsClient::connect(addr).unwrap();
        assert!(head.starts_with("HTTP/1.1 101 "));
        let close = client.next_frame();
        assert_eq!(close.opcode, OpCode::Close);
        let code = u16::from_be_bytes([close.payload[0], close.payload[1]]);
        assert_eq!(code, CloseCode::PolicyViolation.as_u16());
    });

    server.accept_one().unwrap();
    client.join().unwrap();
    assert_eq!(hub.connection_count(), 1);
}

#[test]
fn test_plain_get_on_websocket_path_is_routed() {
    let hub = Arc::new(Hub::new(WebSocketConfig::default(), Echo));
    let mut app = Application::new(router());
    app.websocket("/ws", hub).unwrap();
    let server = server(app, test_config());

    let response = exchange(&server, b"GET /ws HTTP/1.1\r\n\r\n".to_vec());
    assert!(response.starts_with("HTTP/1.1 404 "));
}
