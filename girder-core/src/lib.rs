// Core library for the Girder HTTP server
// Request types, routing, middleware, reserved routes and the blocking acceptor

pub mod application;
pub mod arena;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod graphql;
pub mod handler;
pub mod health;
pub mod http;
pub mod listener;
pub mod logging;
pub mod middleware;
pub mod parser;
pub mod reserved;
pub mod routing;
pub mod server;
pub mod small_vec;
pub mod static_assets;
pub mod status;
pub mod worker;

// Re-export commonly used types
pub use application::{Application, ServerStats};
pub use config::ServerConfig;
pub use connection::ConnectionHandler;
pub use context::{RequestContext, StateValue};
pub use error::{Error, Result};
pub use graphql::{GraphQlEndpoint, GraphQlExecutor, GraphQlRequest};
pub use handler::{HandlerFn, IntoResponse};
pub use health::{
    HealthCheckResult, HealthIndicator, HealthProbe, HealthReport, HealthService, HealthStatus,
};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Json};
pub use listener::bind_with_fallback;
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use middleware::{
    CorsMiddleware, Middleware, MiddlewareChain, Next, RecoveryMiddleware, RequestIdMiddleware,
    TimingMiddleware,
};
pub use reserved::{Reserved, ReservedRoutes};
pub use routing::{Route, RouteDoc, Router};
pub use server::Server;
pub use small_vec::{HeaderList, PathParams, QueryParams};
pub use status::HttpStatus;
pub use worker::{ThreadPool, WorkerMode};

pub use girder_websocket as websocket;
