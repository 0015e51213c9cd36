// Routing system for HTTP requests
//
// Routes are matched by a linear scan in registration order and the first
// match wins. Patterns are split on `/` (empty segments ignored):
//
//   /users/{id}/posts/{post_id}   one segment per `{name}`
//   /files/{*path}                trailing rest segment, binds one or more segments
//
// A pattern without a rest segment only matches paths with exactly as many
// segments.

use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::handler::{into_handler, ErrorHandlerFn, HandlerFn, IntoResponse};
use crate::http::{HttpMethod, HttpResponse};
use crate::logging::debug;
use crate::small_vec::{PathParams, SmallSegments};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// One compiled pattern segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
    Rest(String),
}

/// Documentation attached to a route, rendered by the docs reserved route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Route definition with handler
#[derive(Clone)]
pub struct Route {
    pub method: HttpMethod,
    pub pattern: String,
    segments: Vec<Segment>,
    handler: HandlerFn,
    pub doc: RouteDoc,
}

impl Route {
    /// Compile `pattern` and wrap `handler`.
    pub fn new<F, R>(method: HttpMethod, pattern: &str, handler: F) -> Result<Self>
    where
        F: Fn(&mut RequestContext<'_>) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        Ok(Self {
            method,
            pattern: pattern.to_string(),
            segments: compile_pattern(pattern)?,
            handler: into_handler(handler),
            doc: RouteDoc::default(),
        })
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.doc.summary = Some(summary.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.doc.description = Some(description.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.doc.tags.push(tag.into());
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn handler(&self) -> &HandlerFn {
        &self.handler
    }

    /// Match a request path, extracting parameters in pattern order.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let parts: SmallSegments<'_> = path.split('/').filter(|s| !s.is_empty()).collect();

        let has_rest = matches!(self.segments.last(), Some(Segment::Rest(_)));
        if has_rest {
            if parts.len() < self.segments.len() {
                return None;
            }
        } else if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = PathParams::new();
        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(literal) => {
                    if parts[index] != literal.as_str() {
                        return None;
                    }
                }
                Segment::Param(name) => params.push_decoded(name, parts[index]),
                Segment::Rest(name) => params.push_decoded(name, &parts[index..].join("/")),
            }
        }
        Some(params)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("doc", &self.doc)
            .finish()
    }
}

fn compile_pattern(pattern: &str) -> Result<Vec<Segment>> {
    if !pattern.starts_with('/') {
        return Err(Error::InvalidPattern(format!(
            "{}: must start with '/'",
            pattern
        )));
    }

    let raw: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let mut segments = Vec::with_capacity(raw.len());

    for (index, part) in raw.iter().enumerate() {
        let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            Some(inner) => {
                if let Some(name) = inner.strip_prefix('*') {
                    if index + 1 != raw.len() {
                        return Err(Error::InvalidPattern(format!(
                            "{}: rest segment must be last",
                            pattern
                        )));
                    }
                    Segment::Rest(param_name(pattern, name)?)
                } else {
                    Segment::Param(param_name(pattern, inner)?)
                }
            }
            None if part.contains(['{', '}']) => {
                return Err(Error::InvalidPattern(format!(
                    "{}: unbalanced braces in {:?}",
                    pattern, part
                )));
            }
            None => Segment::Literal(part.to_string()),
        };

        if let Segment::Param(name) | Segment::Rest(name) = &segment {
            let duplicate = segments.iter().any(|existing| {
                matches!(existing, Segment::Param(n) | Segment::Rest(n) if n == name)
            });
            if duplicate {
                return Err(Error::InvalidPattern(format!(
                    "{}: parameter {} appears twice",
                    pattern, name
                )));
            }
        }
        segments.push(segment);
    }

    Ok(segments)
}

fn param_name(pattern: &str, name: &str) -> Result<String> {
    if name.is_empty() || name.contains(['{', '}', '*']) {
        return Err(Error::InvalidPattern(format!(
            "{}: invalid parameter name {:?}",
            pattern, name
        )));
    }
    Ok(name.to_string())
}

/// A matched route with its extracted parameters
pub struct RouteMatch<'r> {
    pub route: &'r Route,
    pub params: PathParams,
}

/// Router for managing routes and dispatching requests
#[derive(Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
    not_found: Option<HandlerFn>,
    error_handler: Option<ErrorHandlerFn>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. A route with the same method and the same compiled
    /// segments as an existing one is rejected and leaves the router
    /// unchanged, so `/users/{id}` and `/users//{id}/` collide.
    pub fn add_route(&mut self, route: Route) -> Result<()> {
        if self
            .routes
            .iter()
            .any(|r| r.method == route.method && r.segments == route.segments)
        {
            return Err(Error::DuplicateRoute {
                method: route.method,
                pattern: route.pattern,
            });
        }

        debug!(method = %route.method, pattern = %route.pattern, "Registered route");
        self.routes.push(route);
        Ok(())
    }

    /// Add a prebuilt route, for routes carrying documentation.
    pub fn route(&mut self, route: Route) -> Result<&mut Self> {
        self.add_route(route)?;
        Ok(self)
    }

    pub fn get<F, R>(&mut self, pattern: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut RequestContext<'_>) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        self.route(Route::new(HttpMethod::GET, pattern, handler)?)
    }

    pub fn post<F, R>(&mut self, pattern: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut RequestContext<'_>) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        self.route(Route::new(HttpMethod::POST, pattern, handler)?)
    }

    pub fn put<F, R>(&mut self, pattern: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut RequestContext<'_>) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        self.route(Route::new(HttpMethod::PUT, pattern, handler)?)
    }

    pub fn patch<F, R>(&mut self, pattern: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut RequestContext<'_>) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        self.route(Route::new(HttpMethod::PATCH, pattern, handler)?)
    }

    pub fn delete<F, R>(&mut self, pattern: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut RequestContext<'_>) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        self.route(Route::new(HttpMethod::DELETE, pattern, handler)?)
    }

    /// Install the handler used when no route or reserved route matches.
    pub fn not_found<F, R>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut RequestContext<'_>) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        self.not_found = Some(into_handler(handler));
        self
    }

    /// Install the handler that maps handler errors to responses.
    pub fn on_error<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&Error) -> HttpResponse + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Find the first route matching `method` and `path`.
    pub fn match_route(&self, method: HttpMethod, path: &str) -> Option<RouteMatch<'_>> {
        self.routes
            .iter()
            .filter(|route| route.method == method)
            .find_map(|route| {
                route
                    .matches(path)
                    .map(|params| RouteMatch { route, params })
            })
    }

    pub fn not_found_handler(&self) -> Option<&HandlerFn> {
        self.not_found.as_ref()
    }

    /// Response for a handler error: the installed error handler, or the
    /// JSON error body.
    pub fn error_response(&self, err: &Error) -> HttpResponse {
        match &self.error_handler {
            Some(handler) => handler(err),
            None => err.to_response(),
        }
    }

    /// Registered routes in registration order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_ctx: &mut RequestContext<'_>) -> HttpResponse {
        HttpResponse::ok()
    }

    #[test]
    fn test_compile_pattern() {
        let route = Route::new(HttpMethod::GET, "/users/{id}//files/{*path}", noop).unwrap();
        assert_eq!(
            route.segments(),
            &[
                Segment::Literal("users".into()),
                Segment::Param("id".into()),
                Segment::Literal("files".into()),
                Segment::Rest("path".into()),
            ]
        );
    }

    #[test]
    fn test_invalid_patterns() {
        for pattern in ["users", "/a/{", "/a/{}", "/{*rest}/b", "/{x}/{x}", "/a{b}"] {
            assert!(
                matches!(
                    Route::new(HttpMethod::GET, pattern, noop),
                    Err(Error::InvalidPattern(_))
                ),
                "{} should be rejected",
                pattern
            );
        }
    }

    #[test]
    fn test_root_pattern() {
        let route = Route::new(HttpMethod::GET, "/", noop).unwrap();
        assert_eq!(route.segment_count(), 0);
        assert!(route.matches("/").is_some());
        assert!(route.matches("").is_some());
        assert!(route.matches("/x").is_none());
    }

    #[test]
    fn test_literal_compare_is_exact() {
        let route = Route::new(HttpMethod::GET, "/Users", noop).unwrap();
        assert!(route.matches("/users").is_none());
        assert!(route.matches("/Users/").is_some());
    }

    #[test]
    fn test_rest_segment_needs_one_segment() {
        let route = Route::new(HttpMethod::GET, "/static/{*path}", noop).unwrap();
        assert!(route.matches("/static").is_none());
        let params = route.matches("/static/css/site%20main.css").unwrap();
        assert_eq!(params.get("path"), Some("css/site main.css"));
    }

    #[test]
    fn test_error_response_default_and_custom() {
        let mut router = Router::new();
        let err = Error::Forbidden("no".into());
        assert_eq!(router.error_response(&err).status, 403);

        router.on_error(|err| HttpResponse::new(err.status_code()).with_text("custom"));
        let response = router.error_response(&err);
        assert_eq!(response.status, 403);
        assert_eq!(response.body, b"custom");
    }
}
