// Girder - a blocking thread-pool HTTP/1.1 server for Rust
//
// Routing, middleware, reserved routes and the acceptor live in
// `girder-core`; the WebSocket engine lives in `girder-websocket`.

// Re-export core functionality
pub use girder_core::*;

// WebSocket engine, also reachable as `girder::websocket`
pub use girder_websocket::{
    CloseCode, Connection as WebSocketConnection, ConnectionId, Hub, Message, WebSocketConfig,
    WebSocketError, WebSocketHandler,
};

/// Prelude for common imports
///
/// ```
/// use girder::prelude::*;
///
/// let mut router = Router::new();
/// router.get("/ping", |_ctx| "pong").unwrap();
/// let app = Application::new(router);
/// assert_eq!(app.router().len(), 1);
/// ```
pub mod prelude {
    pub use girder_core::{
        Application, CorsMiddleware, Error, HttpMethod, HttpRequest, HttpResponse, HttpStatus,
        IntoResponse, Json, Middleware, Next, RecoveryMiddleware, RequestContext,
        RequestIdMiddleware, Result, Route, Router, Server, ServerConfig, StateValue,
        TimingMiddleware,
    };
    pub use girder_websocket::{Hub, Message, WebSocketConfig, WebSocketHandler};
}
