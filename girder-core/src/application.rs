// Application: everything a worker needs to turn a request into a response
//
// Built single-threaded before the server starts, then shared read-only
// behind an `Arc` by every worker.

use crate::arena;
use crate::config::ServerConfig;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::graphql::{GraphQlEndpoint, GraphQlExecutor};
use crate::health::{HealthIndicator, ServerHealthIndicator};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::logging::error;
use crate::middleware::{Middleware, MiddlewareChain};
use crate::reserved::{Reserved, ReservedRoutes};
use crate::routing::{Route, Router};
use crate::small_vec::PathParams;
use girder_websocket::Hub;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Server-wide counters
#[derive(Debug, Default)]
pub struct ServerStats {
    active: Arc<AtomicUsize>,
    requests: AtomicU64,
    server_errors: AtomicU64,
    websocket_upgrades: AtomicU64,
}

impl ServerStats {
    /// Connections currently being handled
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Responses produced
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Responses with a 5xx status
    pub fn server_errors(&self) -> u64 {
        self.server_errors.load(Ordering::Relaxed)
    }

    /// Completed WebSocket handshakes
    pub fn websocket_upgrades(&self) -> u64 {
        self.websocket_upgrades.load(Ordering::Relaxed)
    }

    /// Shared handle to the active-connection counter.
    pub fn active_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.active)
    }

    pub(crate) fn record_response(&self, status: u16) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if status >= 500 {
            self.server_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_upgrade(&self) {
        self.websocket_upgrades.fetch_add(1, Ordering::Relaxed);
    }
}

enum Target<'r> {
    Route(&'r Route),
    Reserved(Reserved),
    NotFound,
}

/// Router, middleware, reserved routes and WebSocket endpoints.
pub struct Application {
    router: Router,
    middleware: MiddlewareChain,
    reserved: ReservedRoutes,
    websockets: HashMap<String, Arc<Hub>>,
    stats: Arc<ServerStats>,
}

impl Default for Application {
    fn default() -> Self {
        Self::new(Router::new())
    }
}

impl Application {
    /// Wrap `router`. The health route reports the server's own counters
    /// out of the box.
    pub fn new(router: Router) -> Self {
        let stats = Arc::new(ServerStats::default());
        let mut reserved = ReservedRoutes::new();
        reserved
            .health_mut()
            .register(ServerHealthIndicator::new(Arc::clone(&stats)));

        Self {
            router,
            middleware: MiddlewareChain::new(),
            reserved,
            websockets: HashMap::new(),
            stats,
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        self.middleware.use_middleware(middleware);
        self
    }

    /// Serve WebSocket upgrades on `path` through `hub`.
    pub fn websocket(&mut self, path: &str, hub: Arc<Hub>) -> Result<&mut Self> {
        if !path.starts_with('/') {
            return Err(Error::InvalidPattern(format!(
                "websocket path must start with '/': {}",
                path
            )));
        }
        if self.websockets.contains_key(path) {
            return Err(Error::DuplicateRoute {
                method: HttpMethod::GET,
                pattern: path.to_string(),
            });
        }
        self.websockets.insert(path.to_string(), hub);
        Ok(self)
    }

    /// Install the GraphQL executor behind the GraphQL reserved route.
    pub fn graphql<E: GraphQlExecutor + 'static>(&mut self, executor: E) -> &mut Self {
        self.reserved
            .set_graphql(GraphQlEndpoint::new(Arc::new(executor)));
        self
    }

    pub fn health_indicator<H: HealthIndicator + 'static>(&mut self, indicator: H) -> &mut Self {
        self.reserved.health_mut().register(indicator);
        self
    }

    pub fn websocket_hub(&self, path: &str) -> Option<&Arc<Hub>> {
        self.websockets.get(path)
    }

    /// WebSocket endpoint paths, sorted.
    pub fn websocket_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.websockets.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    pub fn reserved(&self) -> &ReservedRoutes {
        &self.reserved
    }

    pub(crate) fn configure(&mut self, config: &ServerConfig) {
        self.reserved.configure(config);
    }

    /// Produce the response for one request.
    ///
    /// Resolution order: user routes, reserved routes, the not-found
    /// handler, then the canonical 404. A HEAD request falls back to the
    /// GET route for its path. Everything runs through the middleware chain
    /// inside one arena scope.
    pub fn respond(&self, request: &HttpRequest) -> HttpResponse {
        let response = arena::scope(|bump| {
            let (target, params) = self.resolve(request.method, &request.path);
            let mut ctx = RequestContext::new(request, bump, params);

            let result = self
                .middleware
                .apply(&mut ctx, &|ctx| self.run_target(&target, ctx));

            let response = match result {
                Ok(response) => response,
                Err(err) => {
                    if err.is_server_error() {
                        error!(
                            method = %request.method,
                            path = %request.path,
                            error = %err,
                            "Handler failed"
                        );
                    }
                    self.router.error_response(&err)
                }
            };
            ctx.finalize(response)
        });

        self.stats.record_response(response.status);
        response
    }

    fn resolve(&self, method: HttpMethod, path: &str) -> (Target<'_>, PathParams) {
        let matched = self.router.match_route(method, path).or_else(|| {
            (method == HttpMethod::HEAD)
                .then(|| self.router.match_route(HttpMethod::GET, path))
                .flatten()
        });
        if let Some(found) = matched {
            return (Target::Route(found.route), found.params);
        }

        match self.reserved.lookup(method, path) {
            Some(reserved) => (Target::Reserved(reserved), PathParams::new()),
            None => (Target::NotFound, PathParams::new()),
        }
    }

    fn run_target(&self, target: &Target<'_>, ctx: &mut RequestContext<'_>) -> Result<HttpResponse> {
        match target {
            Target::Route(route) => (route.handler())(ctx),
            Target::Reserved(reserved) => {
                let websocket_paths = self.websocket_paths();
                self.reserved
                    .serve(*reserved, ctx, self.router.routes(), &websocket_paths)
            }
            Target::NotFound => match self.router.not_found_handler() {
                Some(handler) => handler(ctx),
                None => Ok(Error::RouteNotFound(format!("{} {}", ctx.method(), ctx.path()))
                    .to_response()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::RecoveryMiddleware;
    use girder_websocket::{LoggingHandler, WebSocketConfig};
    use serde_json::Value;

    fn app() -> Application {
        let mut router = Router::new();
        router
            .get("/users/{id}", |ctx| -> Result<HttpResponse> {
                let id: u64 = ctx.param_as("id")?;
                Ok(HttpResponse::ok().with_text(format!("user {}", id)))
            })
            .unwrap();
        router
            .get("/fail", |_ctx| -> Result<HttpResponse> {
                Err(Error::Forbidden("no entry".into()))
            })
            .unwrap();
        Application::new(router)
    }

    fn json(response: &HttpResponse) -> Value {
        serde_json::from_slice(&response.body).unwrap()
    }

    #[test]
    fn test_route_dispatch() {
        let response = app().respond(&HttpRequest::new(HttpMethod::GET, "/users/7"));
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"user 7");
    }

    #[test]
    fn test_canonical_not_found() {
        let response = app().respond(&HttpRequest::new(HttpMethod::DELETE, "/nowhere"));
        assert_eq!(response.status, 404);
        assert_eq!(
            json(&response),
            serde_json::json!({
                "error": "Not Found",
                "detail": "No route for DELETE /nowhere",
                "status": 404
            })
        );
    }

    #[test]
    fn test_handler_error_keeps_status() {
        let response = app().respond(&HttpRequest::new(HttpMethod::GET, "/fail"));
        assert_eq!(response.status, 403);
        assert_eq!(json(&response)["error"], "Forbidden");
    }

    #[test]
    fn test_parse_error_is_400() {
        let response = app().respond(&HttpRequest::new(HttpMethod::GET, "/users/abc"));
        assert_eq!(response.status, 400);
    }

    #[test]
    fn test_custom_error_handler() {
        let mut app = app();
        app.router_mut()
            .on_error(|err| HttpResponse::new(err.status_code()).with_text("custom"));
        let response = app.respond(&HttpRequest::new(HttpMethod::GET, "/fail"));
        assert_eq!(response.status, 403);
        assert_eq!(response.body, b"custom");
    }

    #[test]
    fn test_error_handler_applies_behind_recovery() {
        let mut app = app();
        app.use_middleware(RecoveryMiddleware);
        app.router_mut()
            .on_error(|err| HttpResponse::new(err.status_code()).with_text("custom"));

        let response = app.respond(&HttpRequest::new(HttpMethod::GET, "/fail"));
        assert_eq!(response.status, 403);
        assert_eq!(response.body, b"custom");

        let response = app.respond(&HttpRequest::new(HttpMethod::GET, "/users/abc"));
        assert_eq!(response.status, 400);
        assert_eq!(response.body, b"custom");
    }

    #[test]
    fn test_not_found_handler_runs_before_canonical_404() {
        let mut app = app();
        app.router_mut()
            .not_found(|_ctx| HttpResponse::new(404).with_text("gone fishing"));
        let response = app.respond(&HttpRequest::new(HttpMethod::GET, "/missing"));
        assert_eq!(response.body, b"gone fishing");
    }

    #[test]
    fn test_head_falls_back_to_get() {
        let response = app().respond(&HttpRequest::new(HttpMethod::HEAD, "/users/1"));
        assert_eq!(response.status, 200);
    }

    #[test]
    fn test_reserved_after_user_routes() {
        let mut app = app();
        let response = app.respond(&HttpRequest::new(HttpMethod::GET, "/health"));
        assert_eq!(json(&response)["status"], "UP");

        app.router_mut()
            .get("/health", |_ctx| HttpResponse::ok().with_text("mine"))
            .unwrap();
        let response = app.respond(&HttpRequest::new(HttpMethod::GET, "/health"));
        assert_eq!(response.body, b"mine");
    }

    #[test]
    fn test_panic_recovered_through_middleware() {
        let mut router = Router::new();
        router
            .get("/boom", |_ctx| -> HttpResponse { panic!("boom") })
            .unwrap();
        let mut app = Application::new(router);
        app.use_middleware(RecoveryMiddleware);

        let response = app.respond(&HttpRequest::new(HttpMethod::GET, "/boom"));
        assert_eq!(response.status, 500);
        assert_eq!(app.stats().server_errors(), 1);
        assert_eq!(app.stats().requests(), 1);
    }

    #[test]
    fn test_websocket_registration() {
        let mut app = app();
        let hub = Arc::new(Hub::new(WebSocketConfig::default(), LoggingHandler));
        app.websocket("/ws", Arc::clone(&hub)).unwrap();
        assert!(matches!(
            app.websocket("/ws", hub.clone()),
            Err(Error::DuplicateRoute { .. })
        ));
        assert!(matches!(app.websocket("ws", hub), Err(Error::InvalidPattern(_))));
        assert_eq!(app.websocket_paths(), vec!["/ws"]);
        assert!(app.websocket_hub("/ws").is_some());
    }

    #[test]
    fn test_graphql_reserved_route() {
        fn executor(
            _ctx: &RequestContext<'_>,
            req: crate::graphql::GraphQlRequest,
        ) -> Result<Value> {
            Ok(serde_json::json!({"data": {"echo": req.query}}))
        }

        let mut app = app();
        app.graphql(executor);
        let response = app.respond(
            &HttpRequest::new(HttpMethod::POST, "/graphql").with_body(r#"{"query":"{ ping }"}"#),
        );
        assert_eq!(json(&response)["data"]["echo"], "{ ping }");
    }
}
