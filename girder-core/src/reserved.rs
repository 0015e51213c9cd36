//! Reserved internal routes
//!
//! Served after user routes and before the not-found handler, so an
//! application route on the same path shadows them.
//!
//! | Path | Serves |
//! |------|--------|
//! | `{docs_path}` | HTML route listing |
//! | `{docs_path}/docs.css` | its stylesheet |
//! | `{docs_path}/routes.json` | route listing as JSON |
//! | `{health_path}`, `/live`, `/ready` | health reports |
//! | `{graphql_path}` | GraphQL entrypoint, when an executor is installed |

use crate::config::ServerConfig;
use crate::context::RequestContext;
use crate::error::Result;
use crate::graphql::GraphQlEndpoint;
use crate::health::{HealthProbe, HealthService};
use crate::http::{HttpMethod, HttpResponse};
use crate::routing::Route;
use crate::static_assets;
use serde::Serialize;

/// Documentation assets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocsAsset {
    Page,
    Stylesheet,
    RouteIndex,
}

/// A resolved reserved route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reserved {
    GraphQl,
    Health(HealthProbe),
    Docs(DocsAsset),
}

#[derive(Serialize)]
struct RouteEntry<'r> {
    method: HttpMethod,
    path: &'r str,
    #[serde(flatten)]
    doc: &'r crate::routing::RouteDoc,
}

/// The reserved route table
#[derive(Clone)]
pub struct ReservedRoutes {
    enabled: bool,
    docs_path: String,
    health_path: String,
    graphql_path: String,
    graphql: Option<GraphQlEndpoint>,
    health: HealthService,
}

impl Default for ReservedRoutes {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            enabled: defaults.reserved_routes,
            docs_path: defaults.docs_path,
            health_path: defaults.health_path,
            graphql_path: defaults.graphql_path,
            graphql: None,
            health: HealthService::new(),
        }
    }
}

impl ReservedRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take paths and switches from the server configuration.
    pub(crate) fn configure(&mut self, config: &ServerConfig) {
        self.enabled = config.reserved_routes;
        self.docs_path = normalize(&config.docs_path).to_string();
        self.health_path = normalize(&config.health_path).to_string();
        self.graphql_path = normalize(&config.graphql_path).to_string();
        self.graphql = self
            .graphql
            .take()
            .map(|endpoint| endpoint.with_playground(config.graphql_playground));
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_graphql(&mut self, endpoint: GraphQlEndpoint) {
        self.graphql = Some(endpoint);
    }

    pub fn health(&self) -> &HealthService {
        &self.health
    }

    pub fn health_mut(&mut self) -> &mut HealthService {
        &mut self.health
    }

    /// Resolve `(method, path)` to a reserved route.
    pub fn lookup(&self, method: HttpMethod, path: &str) -> Option<Reserved> {
        if !self.enabled {
            return None;
        }
        let path = normalize(path);

        if self.graphql.is_some() && path == self.graphql_path {
            return GraphQlEndpoint::handles(method).then_some(Reserved::GraphQl);
        }

        if !matches!(method, HttpMethod::GET | HttpMethod::HEAD) {
            return None;
        }

        if let Some(rest) = path.strip_prefix(self.health_path.as_str()) {
            match rest {
                "" => return Some(Reserved::Health(HealthProbe::Full)),
                "/live" => return Some(Reserved::Health(HealthProbe::Liveness)),
                "/ready" => return Some(Reserved::Health(HealthProbe::Readiness)),
                _ => {}
            }
        }

        if let Some(rest) = path.strip_prefix(self.docs_path.as_str()) {
            match rest {
                "" => return Some(Reserved::Docs(DocsAsset::Page)),
                "/docs.css" => return Some(Reserved::Docs(DocsAsset::Stylesheet)),
                "/routes.json" => return Some(Reserved::Docs(DocsAsset::RouteIndex)),
                _ => {}
            }
        }

        None
    }

    /// Serve a route resolved by [`lookup`](Self::lookup).
    pub fn serve(
        &self,
        which: Reserved,
        ctx: &mut RequestContext<'_>,
        routes: &[Route],
        websocket_paths: &[&str],
    ) -> Result<HttpResponse> {
        match which {
            Reserved::GraphQl => match &self.graphql {
                Some(endpoint) => endpoint.serve(ctx, &self.graphql_path),
                None => Ok(HttpResponse::not_found()),
            },
            Reserved::Health(probe) => Ok(self.health.check(probe).to_response()),
            Reserved::Docs(DocsAsset::Page) => Ok(HttpResponse::ok().with_html(
                static_assets::docs_html(&self.docs_path, routes, websocket_paths),
            )),
            Reserved::Docs(DocsAsset::Stylesheet) => Ok(HttpResponse::ok()
                .with_header("Content-Type", "text/css; charset=utf-8")
                .with_body(static_assets::DOCS_CSS)),
            Reserved::Docs(DocsAsset::RouteIndex) => {
                let entries: Vec<RouteEntry<'_>> = routes
                    .iter()
                    .map(|route| RouteEntry {
                        method: route.method,
                        path: &route.pattern,
                        doc: &route.doc,
                    })
                    .collect();
                HttpResponse::ok().with_json(&serde_json::json!({
                    "routes": entries,
                    "websockets": websocket_paths,
                }))
            }
        }
    }
}

// "/docs/" and "/docs" are the same reserved path
fn normalize(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}
