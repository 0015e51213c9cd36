//! Hub registry, room and session behaviour against in-memory sockets.

use girder_websocket::{
    CloseCode, Connection, ConnectionState, Frame, FrameDecoder, Hub, Message, OpCode,
    WebSocketConfig, WebSocketError, WebSocketHandler, run_session,
};
use parking_lot::Mutex;
use std::io::{self, Cursor, Write};
use std::sync::Arc;

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn frames(&self) -> Vec<Frame> {
        let mut decoder = FrameDecoder::new(usize::MAX);
        decoder.extend(&self.0.lock());
        let mut frames = Vec::new();
        while let Some(frame) = decoder.next_frame().unwrap() {
            frames.push(frame);
        }
        frames
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct BrokenPipe;

impl Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl WebSocketHandler for Recorder {
    fn on_open(&self, _hub: &Hub, conn: &Arc<Connection>) {
        self.events.lock().push(format!("open {}", conn.id));
    }

    fn on_message(&self, _hub: &Hub, _conn: &Arc<Connection>, message: Message) {
        self.events.lock().push(format!("message {:?}", message));
    }

    fn on_error(&self, _hub: &Hub, _conn: &Arc<Connection>, error: &WebSocketError) {
        self.events.lock().push(format!("error {}", error.close_code()));
    }

    fn on_close(&self, _hub: &Hub, _conn: &Arc<Connection>, reason: Option<&(CloseCode, String)>) {
        let code = reason.map(|(code, _)| code.as_u16()).unwrap_or(0);
        self.events.lock().push(format!("close {}", code));
    }

    fn on_ping(&self, _hub: &Hub, _conn: &Arc<Connection>, payload: &[u8]) {
        self.events.lock().push(format!("ping {}", payload.len()));
    }
}

fn hub_with(limit: usize) -> (Arc<Hub>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let config = WebSocketConfig::builder().max_connections(limit).build();
    let hub = Arc::new(Hub::with_handler(config, recorder.clone()));
    (hub, recorder)
}

fn client(frames: &[Frame]) -> Cursor<Vec<u8>> {
    let mut bytes = Vec::new();
    for frame in frames {
        frame.clone().with_mask([1, 2, 3, 4]).encode_into(&mut bytes);
    }
    Cursor::new(bytes)
}

#[test]
fn test_room_join_and_leave() {
    let (hub, _) = hub_with(8);
    let a = hub.register(Box::new(io::sink()), None).unwrap();
    let b = hub.register(Box::new(io::sink()), None).unwrap();

    assert!(hub.join_room(a.id, "lobby").unwrap());
    assert!(!hub.join_room(a.id, "lobby").unwrap());
    hub.join_room(b.id, "lobby").unwrap();
    assert_eq!(hub.room_size("lobby"), 2);
    assert!(hub.in_room(a.id, "lobby"));
    assert_eq!(hub.rooms_of(a.id), vec!["lobby".to_string()]);

    assert!(hub.leave_room(a.id, "lobby"));
    assert!(!hub.leave_room(a.id, "lobby"));
    assert!(!hub.in_room(a.id, "lobby"));
    assert_eq!(hub.room_size("lobby"), 1);
    assert!(hub.rooms_of(a.id).is_empty());
}

#[test]
fn test_capacity_rejects_without_registering() {
    let (hub, recorder) = hub_with(2);
    hub.register(Box::new(io::sink()), None).unwrap();
    hub.register(Box::new(io::sink()), None).unwrap();

    let err = hub.register(Box::new(io::sink()), None).unwrap_err();
    assert!(matches!(err, WebSocketError::TooManyConnections { limit: 2 }));
    assert_eq!(hub.connection_count(), 2);
    assert_eq!(recorder.events.lock().len(), 2);
}

#[test]
fn test_broadcast_to_room_survives_failing_writer() {
    let (hub, _) = hub_with(8);
    let good = SharedBuf::default();
    let a = hub.register(Box::new(good.clone()), None).unwrap();
    let broken = hub.register(Box::new(BrokenPipe), None).unwrap();
    let outsider = SharedBuf::default();
    hub.register(Box::new(outsider.clone()), None).unwrap();

    hub.join_room(a.id, "news").unwrap();
    hub.join_room(broken.id, "news").unwrap();

    assert_eq!(hub.broadcast_to_room("news", Message::text("hello")), 1);
    assert_eq!(good.frames(), vec![Frame::text("hello")]);
    assert!(outsider.frames().is_empty());
    assert_eq!(hub.broadcast_to_room("nobody-here", Message::text("x")), 0);
}

#[test]
fn test_broadcast_reaches_everyone() {
    let (hub, _) = hub_with(8);
    let bufs: Vec<SharedBuf> = (0..3).map(|_| SharedBuf::default()).collect();
    for buf in &bufs {
        hub.register(Box::new(buf.clone()), None).unwrap();
    }
    assert_eq!(hub.broadcast(Message::binary(vec![1, 2])), 3);
    for buf in &bufs {
        assert_eq!(buf.frames(), vec![Frame::binary(vec![1, 2])]);
    }
}

#[test]
fn test_session_reassembles_and_answers() {
    let (hub, recorder) = hub_with(8);
    let out = SharedBuf::default();
    let conn = hub.register(Box::new(out.clone()), None).unwrap();

    let reader = client(&[
        Frame::text("Hel").with_fin(false),
        Frame::ping(b"hb".to_vec()),
        Frame::new(OpCode::Continuation, b"lo".to_vec()),
        Frame::close(CloseCode::Normal, "bye"),
    ]);
    run_session(&hub, &conn, reader).unwrap();

    assert_eq!(
        *recorder.events.lock(),
        vec![
            "open 1".to_string(),
            "ping 2".to_string(),
            format!("message {:?}", Message::Text("Hello".into())),
            "close 1000".to_string(),
        ]
    );
    assert_eq!(
        out.frames(),
        vec![Frame::pong(b"hb".to_vec()), Frame::close(CloseCode::Normal, "")]
    );
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert_eq!(hub.connection_count(), 0);
}

#[test]
fn test_session_closes_on_unmasked_frame() {
    let (hub, recorder) = hub_with(8);
    let out = SharedBuf::default();
    let conn = hub.register(Box::new(out.clone()), None).unwrap();

    let reader = Cursor::new(Frame::text("plain").encode());
    let err = run_session(&hub, &conn, reader).unwrap_err();
    assert!(matches!(err, WebSocketError::Frame(_)));

    let frames = out.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].opcode, OpCode::Close);
    assert_eq!(&frames[0].payload[..2], &1002u16.to_be_bytes());
    assert!(recorder.events.lock().contains(&"error 1002".to_string()));
    assert_eq!(hub.connection_count(), 0);
}

#[test]
fn test_session_closes_on_oversized_message() {
    let recorder = Arc::new(Recorder::default());
    let config = WebSocketConfig::builder().max_message_size(4).build();
    let hub = Hub::with_handler(config, recorder.clone());
    let out = SharedBuf::default();
    let conn = hub.register(Box::new(out.clone()), None).unwrap();

    let reader = client(&[
        Frame::binary(vec![0; 3]).with_fin(false),
        Frame::new(OpCode::Continuation, vec![0; 3]),
    ]);
    let err = run_session(&hub, &conn, reader).unwrap_err();
    assert!(matches!(err, WebSocketError::MessageTooLarge { .. }));
    assert_eq!(&out.frames()[0].payload[..2], &1009u16.to_be_bytes());
}

#[test]
fn test_session_peer_drop_unregisters() {
    let (hub, recorder) = hub_with(8);
    let conn = hub.register(Box::new(io::sink()), None).unwrap();
    hub.join_room(conn.id, "lobby").unwrap();

    run_session(&hub, &conn, Cursor::new(Vec::new())).unwrap();
    assert_eq!(hub.room_size("lobby"), 0);
    assert!(hub.get(conn.id).is_none());
    assert_eq!(recorder.events.lock().last().unwrap(), "close 1006");
}
