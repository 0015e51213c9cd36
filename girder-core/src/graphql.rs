//! GraphQL entrypoint.
//!
//! The server does not parse or execute GraphQL itself. It routes requests
//! on the configured path to a [`GraphQlExecutor`]:
//!
//! | Method | Input |
//! |--------|-------|
//! | `POST` | JSON body `{"query", "operationName", "variables"}` |
//! | `GET` | `query`, `operationName` and `variables` (JSON) query params |
//! | `GET` with `Accept: text/html` | embedded playground |
//! | `OPTIONS` | 204 preflight |
//!
//! Every response carries the same CORS headers.

use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::http::{HttpMethod, HttpResponse};
use crate::static_assets;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// One GraphQL operation request
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlRequest {
    pub query: String,
    #[serde(default)]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub variables: Option<Value>,
}

impl GraphQlRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Read a GET request's query parameters.
    pub fn from_query(ctx: &RequestContext<'_>) -> Result<Self> {
        let query = ctx
            .query("query")
            .ok_or_else(|| Error::MissingParameter("query".into()))?;
        let variables = match ctx.query("variables") {
            Some(raw) if !raw.is_empty() => Some(
                serde_json::from_str(raw)
                    .map_err(|e| Error::Deserialization(format!("variables: {}", e)))?,
            ),
            _ => None,
        };
        Ok(Self {
            query: query.to_string(),
            operation_name: ctx.query("operationName").map(str::to_string),
            variables,
        })
    }

    /// Read a POST request's JSON body.
    pub fn from_body(ctx: &RequestContext<'_>) -> Result<Self> {
        ctx.json()
    }
}

/// Executes GraphQL operations.
pub trait GraphQlExecutor: Send + Sync {
    /// Execute `request` and return the serialized GraphQL response,
    /// typically `{"data": ..., "errors": [...]}`.
    fn execute(&self, ctx: &RequestContext<'_>, request: GraphQlRequest) -> Result<Value>;
}

impl<F> GraphQlExecutor for F
where
    F: Fn(&RequestContext<'_>, GraphQlRequest) -> Result<Value> + Send + Sync,
{
    fn execute(&self, ctx: &RequestContext<'_>, request: GraphQlRequest) -> Result<Value> {
        self(ctx, request)
    }
}

/// The GraphQL reserved route
#[derive(Clone)]
pub struct GraphQlEndpoint {
    executor: Arc<dyn GraphQlExecutor>,
    playground: bool,
}

impl GraphQlEndpoint {
    pub fn new(executor: Arc<dyn GraphQlExecutor>) -> Self {
        Self {
            executor,
            playground: true,
        }
    }

    pub fn with_playground(mut self, enabled: bool) -> Self {
        self.playground = enabled;
        self
    }

    /// Methods the endpoint answers
    pub fn handles(method: HttpMethod) -> bool {
        matches!(
            method,
            HttpMethod::GET | HttpMethod::HEAD | HttpMethod::POST | HttpMethod::OPTIONS
        )
    }

    pub fn serve(&self, ctx: &mut RequestContext<'_>, endpoint_path: &str) -> Result<HttpResponse> {
        let response = match ctx.method() {
            HttpMethod::OPTIONS => Ok(HttpResponse::no_content()),
            HttpMethod::GET | HttpMethod::HEAD
                if self.playground && ctx.request().accepts("text/html") =>
            {
                Ok(HttpResponse::ok().with_html(static_assets::playground_html(endpoint_path)))
            }
            HttpMethod::GET | HttpMethod::HEAD => {
                GraphQlRequest::from_query(ctx).and_then(|request| self.run(ctx, request))
            }
            HttpMethod::POST => {
                GraphQlRequest::from_body(ctx).and_then(|request| self.run(ctx, request))
            }
            other => Err(Error::MethodNotAllowed(format!("{} {}", other, endpoint_path))),
        };

        Ok(with_cors(response.unwrap_or_else(|err| err.to_response())))
    }

    fn run(&self, ctx: &RequestContext<'_>, request: GraphQlRequest) -> Result<HttpResponse> {
        if request.query.trim().is_empty() {
            return Err(Error::BadRequest("empty GraphQL query".into()));
        }
        let body = self.executor.execute(ctx, request)?;
        Ok(HttpResponse::ok().with_json_value(&body))
    }
}

fn with_cors(response: HttpResponse) -> HttpResponse {
    response
        .with_header("Access-Control-Allow-Origin", "*")
        .with_header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .with_header("Access-Control-Allow-Headers", "Content-Type, Authorization, Accept")
        .with_header("Access-Control-Max-Age", "86400")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena;
    use crate::http::HttpRequest;
    use crate::small_vec::PathParams;
    use serde_json::json;

    fn echo(_ctx: &RequestContext<'_>, req: GraphQlRequest) -> Result<Value> {
        Ok(json!({
            "data": {
                "query": req.query,
                "operation": req.operation_name,
                "variables": req.variables,
            }
        }))
    }

    fn endpoint() -> GraphQlEndpoint {
        GraphQlEndpoint::new(Arc::new(echo))
    }

    fn serve(req: HttpRequest) -> HttpResponse {
        let endpoint = endpoint();
        arena::scope(|bump| {
            let mut ctx = RequestContext::new(&req, bump, PathParams::new());
            endpoint.serve(&mut ctx, "/graphql").unwrap()
        })
    }

    fn body(response: &HttpResponse) -> Value {
        serde_json::from_slice(&response.body).unwrap()
    }

    #[test]
    fn test_post_body() {
        let response = serve(
            HttpRequest::new(HttpMethod::POST, "/graphql")
                .with_body(r#"{"query":"{ me }","operationName":"Me","variables":{"id":1}}"#),
        );
        assert_eq!(response.status, 200);
        assert_eq!(
            body(&response),
            json!({"data": {"query": "{ me }", "operation": "Me", "variables": {"id": 1}}})
        );
        assert_eq!(response.header("access-control-allow-origin"), Some("*"));
    }

    #[test]
    fn test_get_query_params() {
        let response = serve(HttpRequest::new(
            HttpMethod::GET,
            "/graphql?query=%7B%20me%20%7D&variables=%7B%22id%22%3A2%7D",
        ));
        assert_eq!(response.status, 200);
        assert_eq!(body(&response)["data"]["variables"], json!({"id": 2}));
    }

    #[test]
    fn test_get_without_query_is_400_with_cors() {
        let response = serve(HttpRequest::new(HttpMethod::GET, "/graphql"));
        assert_eq!(response.status, 400);
        assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));
    }

    #[test]
    fn test_options_preflight() {
        let response = serve(HttpRequest::new(HttpMethod::OPTIONS, "/graphql"));
        assert_eq!(response.status, 204);
        assert_eq!(
            response.header("access-control-allow-methods"),
            Some("GET, POST, OPTIONS")
        );
    }

    #[test]
    fn test_playground_for_browsers() {
        let response = serve(
            HttpRequest::new(HttpMethod::GET, "/graphql").with_header("Accept", "text/html"),
        );
        assert_eq!(response.status, 200);
        assert!(response.header("content-type").unwrap().starts_with("text/html"));
        assert!(String::from_utf8_lossy(&response.body).contains("\"/graphql\""));
    }

    #[test]
    fn test_invalid_body() {
        let response = serve(HttpRequest::new(HttpMethod::POST, "/graphql").with_body("nope"));
        assert_eq!(response.status, 400);
    }
}
