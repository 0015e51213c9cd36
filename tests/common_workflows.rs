//! Integration tests for common Girder workflows.
//!
//! These tests drive an `Application` directly, without sockets, the way a
//! worker thread does after parsing a request.

use girder::prelude::*;
use girder::{HealthCheckResult, HealthIndicator, LogConfig, LogFormat, LogLevel};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;

// =============================================================================
// Handlers and responses
// =============================================================================

#[derive(Serialize)]
struct User {
    id: u64,
    name: String,
}

fn get_user(ctx: &mut RequestContext<'_>) -> Result<Json<User>> {
    let id: u64 = ctx.param_as("id")?;
    let name = ctx.query_or("name", "anonymous".to_string())?;
    Ok(Json(User { id, name }))
}

fn app() -> Application {
    let mut router = Router::new();
    router.get("/users/{id}", get_user).unwrap();
    router
        .post("/users", |ctx| -> Result<HttpResponse> {
            let user: serde_json::Value = ctx.json()?;
            HttpResponse::created().with_json(&user)
        })
        .unwrap();
    router.get("/accepted", |_ctx| HttpStatus::Accepted).unwrap();
    Application::new(router)
}

fn json(response: &HttpResponse) -> serde_json::Value {
    serde_json::from_slice(&response.body).unwrap()
}

#[test]
fn test_json_handler_with_typed_params() {
    let response = app().respond(&HttpRequest::new(HttpMethod::GET, "/users/5?name=ada"));
    assert_eq!(response.status, 200);
    assert_eq!(response.header("content-type"), Some("application/json"));
    assert_eq!(json(&response), serde_json::json!({"id": 5, "name": "ada"}));
}

#[test]
fn test_query_default() {
    let response = app().respond(&HttpRequest::new(HttpMethod::GET, "/users/5"));
    assert_eq!(json(&response)["name"], "anonymous");
}

#[test]
fn test_typed_param_mismatch_is_400() {
    let response = app().respond(&HttpRequest::new(HttpMethod::GET, "/users/five"));
    assert_eq!(response.status, 400);
    assert_eq!(json(&response)["error"], "Bad Request");
}

#[test]
fn test_json_body() {
    let request = HttpRequest::new(HttpMethod::POST, "/users").with_body(r#"{"name":"grace"}"#);
    let response = app().respond(&request);
    assert_eq!(response.status, 201);
    assert_eq!(json(&response)["name"], "grace");

    let bad = HttpRequest::new(HttpMethod::POST, "/users").with_body("{");
    assert_eq!(app().respond(&bad).status, 400);
}

#[test]
fn test_status_as_response() {
    let response = app().respond(&HttpRequest::new(HttpMethod::GET, "/accepted"));
    assert_eq!(response.status, 202);
}

// =============================================================================
// Middleware
// =============================================================================

struct ApiKey;

impl Middleware for ApiKey {
    fn handle(&self, ctx: &mut RequestContext<'_>, next: Next<'_>) -> Result<HttpResponse> {
        match ctx.header("x-api-key") {
            Some("secret") => {
                ctx.set_state("authenticated", StateValue::Bool(true));
                next.run(ctx)
            }
            _ => Err(Error::Unauthorized("missing API key".into())),
        }
    }
}

#[test]
fn test_middleware_short_circuit_and_state() {
    let mut router = Router::new();
    router
        .get("/me", |ctx| {
            let authenticated = ctx.state_bool("authenticated").unwrap_or(false);
            format!("authenticated={}", authenticated)
        })
        .unwrap();
    let mut app = Application::new(router);
    app.use_middleware(ApiKey);

    let denied = app.respond(&HttpRequest::new(HttpMethod::GET, "/me"));
    assert_eq!(denied.status, 401);

    let allowed = app.respond(
        &HttpRequest::new(HttpMethod::GET, "/me").with_header("X-Api-Key", "secret"),
    );
    assert_eq!(allowed.body, b"authenticated=true");
}

#[test]
fn test_builtin_middleware_stack() {
    let mut app = app();
    app.use_middleware(RecoveryMiddleware)
        .use_middleware(RequestIdMiddleware)
        .use_middleware(TimingMiddleware)
        .use_middleware(CorsMiddleware::new());

    let response = app.respond(&HttpRequest::new(HttpMethod::GET, "/users/1"));
    assert_eq!(response.status, 200);
    assert!(response.header("x-request-id").is_some());
    assert!(response.header("x-response-time").unwrap().ends_with("ms"));
    assert_eq!(response.header("access-control-allow-origin"), Some("*"));
}

#[test]
fn test_middleware_wraps_not_found() {
    let mut app = app();
    app.use_middleware(RequestIdMiddleware);
    let response = app.respond(&HttpRequest::new(HttpMethod::GET, "/nope"));
    assert_eq!(response.status, 404);
    assert!(response.header("x-request-id").is_some());
}

// =============================================================================
// Reserved routes
// =============================================================================

struct Database;

impl HealthIndicator for Database {
    fn name(&self) -> &str {
        "database"
    }

    fn check(&self) -> HealthCheckResult {
        HealthCheckResult::down("database").with_detail("reason", "connection refused")
    }
}

#[test]
fn test_health_probes() {
    let mut app = app();
    app.health_indicator(Database);

    let full = app.respond(&HttpRequest::new(HttpMethod::GET, "/health"));
    assert_eq!(full.status, 503);
    assert_eq!(json(&full)["status"], "DOWN");

    // Liveness skips dependency checks
    let live = app.respond(&HttpRequest::new(HttpMethod::GET, "/health/live"));
    assert_eq!(live.status, 200);
}

#[test]
fn test_docs_page_lists_routes() {
    let response = app().respond(&HttpRequest::new(HttpMethod::GET, "/docs"));
    assert_eq!(response.status, 200);
    let html = String::from_utf8(response.body).unwrap();
    assert!(html.contains("/users/{id}"));
    assert!(html.contains("/accepted"));
}

// =============================================================================
// Configuration and logging
// =============================================================================

#[test]
fn test_config_file_with_env_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "port = 9001\nworkers = 4\ndocs_path = \"/api-docs\"\n\n[websocket]\nmax_connections = 50"
    )
    .unwrap();

    let config = ServerConfig::from_file(file.path()).unwrap();
    assert_eq!(config.port, 9001);
    assert_eq!(config.workers, Some(4));
    assert_eq!(config.docs_path, "/api-docs");
    assert_eq!(config.websocket.max_connections, 50);

    let vars: HashMap<String, String> =
        [("PORT".to_string(), "9100".to_string())].into_iter().collect();
    let config = config.apply_vars(&vars).unwrap();
    assert_eq!(config.port, 9100);
}

#[test]
fn test_log_config_builds_filter() {
    let config = LogConfig::new().level(LogLevel::Debug).format(LogFormat::Compact);
    assert!(config.build_filter().is_ok());
}
