// Middleware system for request/response processing

use crate::context::{RequestContext, StateValue};
use crate::error::Result;
use crate::http::{HttpMethod, HttpResponse};
use crate::logging::{error, trace};
use serde_json::json;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use uuid::Uuid;

/// Terminal step of a chain: the route handler or a reserved route.
pub type Endpoint<'n> = &'n dyn Fn(&mut RequestContext<'_>) -> Result<HttpResponse>;

/// Middleware trait for processing requests before they reach the handler
pub trait Middleware: Send + Sync {
    /// Process the request, optionally calling `next.run(ctx)` to continue.
    fn handle(&self, ctx: &mut RequestContext<'_>, next: Next<'_>) -> Result<HttpResponse>;
}

/// The rest of the chain after the current middleware.
pub struct Next<'n> {
    middlewares: &'n [Arc<dyn Middleware>],
    endpoint: Endpoint<'n>,
}

impl<'n> Next<'n> {
    pub fn new(middlewares: &'n [Arc<dyn Middleware>], endpoint: Endpoint<'n>) -> Self {
        Self {
            middlewares,
            endpoint,
        }
    }

    /// Run the remaining middleware, then the endpoint.
    pub fn run(self, ctx: &mut RequestContext<'_>) -> Result<HttpResponse> {
        match self.middlewares.split_first() {
            Some((current, rest)) => current.handle(
                ctx,
                Next {
                    middlewares: rest,
                    endpoint: self.endpoint,
                },
            ),
            None => {
                trace!("Middleware chain complete, calling handler");
                (self.endpoint)(ctx)
            }
        }
    }
}

/// Middleware chain executor, run in registration order
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a middleware to the end of the chain
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middlewares.push(Arc::new(middleware));
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Execute the chain with `endpoint` as its last step
    pub fn apply(&self, ctx: &mut RequestContext<'_>, endpoint: Endpoint<'_>) -> Result<HttpResponse> {
        trace!(
            middleware_count = self.middlewares.len(),
            path = %ctx.path(),
            method = %ctx.method(),
            "Executing middleware chain"
        );
        Next::new(&self.middlewares, endpoint).run(ctx)
    }
}

// ========== Built-in Middleware ==========

/// CORS (Cross-Origin Resource Sharing) middleware
pub struct CorsMiddleware {
    pub allow_origin: String,
    pub allow_methods: String,
    pub allow_headers: String,
    pub allow_credentials: bool,
    pub max_age: u32,
}

impl CorsMiddleware {
    pub fn new() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, PUT, DELETE, OPTIONS, PATCH".to_string(),
            allow_headers: "Content-Type, Authorization, Accept".to_string(),
            allow_credentials: false,
            max_age: 86400, // 24 hours
        }
    }

    pub fn allow_origin(mut self, origin: &str) -> Self {
        self.allow_origin = origin.to_string();
        self
    }

    pub fn allow_headers(mut self, headers: &str) -> Self {
        self.allow_headers = headers.to_string();
        self
    }

    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for CorsMiddleware {
    fn handle(&self, ctx: &mut RequestContext<'_>, next: Next<'_>) -> Result<HttpResponse> {
        // Preflight never reaches the handler
        if ctx.method() == HttpMethod::OPTIONS {
            let mut response = HttpResponse::no_content()
                .with_header("Access-Control-Allow-Origin", self.allow_origin.as_str())
                .with_header("Access-Control-Allow-Methods", self.allow_methods.as_str())
                .with_header("Access-Control-Allow-Headers", self.allow_headers.as_str())
                .with_header("Access-Control-Max-Age", self.max_age.to_string());
            if self.allow_credentials {
                response = response.with_header("Access-Control-Allow-Credentials", "true");
            }
            return Ok(response);
        }

        let mut response = next.run(ctx)?;
        response
            .headers
            .set("Access-Control-Allow-Origin", self.allow_origin.as_str());
        if self.allow_credentials {
            response.headers.set("Access-Control-Allow-Credentials", "true");
        }
        Ok(response)
    }
}

/// Request ID middleware
///
/// Reuses a well-formed incoming `X-Request-Id`, otherwise generates a v4
/// UUID. The id is stored in context state under `request_id` and echoed on
/// the response.
pub struct RequestIdMiddleware;

impl RequestIdMiddleware {
    pub const STATE_KEY: &'static str = "request_id";
    pub const HEADER: &'static str = "X-Request-Id";
}

impl Middleware for RequestIdMiddleware {
    fn handle(&self, ctx: &mut RequestContext<'_>, next: Next<'_>) -> Result<HttpResponse> {
        let request_id = ctx
            .header(Self::HEADER)
            .and_then(|value| Uuid::parse_str(value).ok())
            .unwrap_or_else(Uuid::new_v4);

        ctx.set_state(Self::STATE_KEY, StateValue::Uuid(request_id));
        ctx.set_response_header(Self::HEADER, &request_id.to_string());
        next.run(ctx)
    }
}

/// Catches handler panics.
///
/// A panic becomes a 500 JSON response and is logged at `error`. Handler
/// errors pass through unchanged, so the router's error handler still maps
/// them.
pub struct RecoveryMiddleware;

impl Middleware for RecoveryMiddleware {
    fn handle(&self, ctx: &mut RequestContext<'_>, next: Next<'_>) -> Result<HttpResponse> {
        let method = ctx.method();
        let path = ctx.path();

        match panic::catch_unwind(AssertUnwindSafe(|| next.run(ctx))) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(method = %method, path = %path, panic = %message, "Handler panicked");
                Ok(HttpResponse::internal_server_error().with_json_value(&json!({
                    "error": "Internal Server Error",
                    "detail": "handler panicked",
                    "status": 500,
                })))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Adds an `X-Response-Time` header in milliseconds.
pub struct TimingMiddleware;

impl Middleware for TimingMiddleware {
    fn handle(&self, ctx: &mut RequestContext<'_>, next: Next<'_>) -> Result<HttpResponse> {
        let start = std::time::Instant::now();
        let mut response = next.run(ctx)?;
        let millis = start.elapsed().as_secs_f64() * 1000.0;
        response
            .headers
            .set("X-Response-Time", format!("{:.3}ms", millis));
        Ok(response)
    }
}
