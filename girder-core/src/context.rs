//! Per-request context handed to middleware and handlers.
//!
//! A [`RequestContext`] borrows the parsed request and the thread-local
//! arena for one request/response cycle. Scratch state and staged response
//! headers live in the arena and are freed in bulk once the response has
//! been written.

use crate::arena::{ArenaMap, ArenaVec};
use crate::error::{Error, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::small_vec::PathParams;
use bumpalo::Bump;
use serde::de::DeserializeOwned;
use std::str::FromStr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A value in the request scratch bag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateValue<'a> {
    Text(&'a str),
    Int(i64),
    Float(f64),
    Bool(bool),
    Bytes(&'a [u8]),
    Uuid(Uuid),
}

impl<'a> StateValue<'a> {
    pub fn as_text(&self) -> Option<&'a str> {
        match self {
            StateValue::Text(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            StateValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            StateValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StateValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            StateValue::Bytes(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            StateValue::Uuid(id) => Some(*id),
            _ => None,
        }
    }
}

/// Request-scoped view used by handlers.
pub struct RequestContext<'a> {
    request: &'a HttpRequest,
    arena: &'a Bump,
    params: PathParams,
    state: ArenaMap<'a, &'a str, StateValue<'a>>,
    response_headers: ArenaVec<'a, (&'a str, &'a str)>,
    started_at: Instant,
}

impl<'a> RequestContext<'a> {
    pub fn new(request: &'a HttpRequest, arena: &'a Bump, params: PathParams) -> Self {
        Self {
            request,
            arena,
            params,
            state: ArenaMap::new_in(arena),
            response_headers: ArenaVec::new_in(arena),
            started_at: Instant::now(),
        }
    }

    pub fn request(&self) -> &'a HttpRequest {
        self.request
    }

    pub fn method(&self) -> HttpMethod {
        self.request.method
    }

    pub fn path(&self) -> &'a str {
        &self.request.path
    }

    pub fn body(&self) -> &'a [u8] {
        &self.request.body
    }

    /// Header value, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.request.headers.get(name)
    }

    pub fn query(&self, name: &str) -> Option<&'a str> {
        self.request.query_params.get(name)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Per-request arena. Allocations are freed after the response is written.
    pub fn arena(&self) -> &'a Bump {
        self.arena
    }

    /// Time since the context was created.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Typed path parameter.
    pub fn param_as<T: FromStr>(&self, name: &str) -> Result<T> {
        let raw = self
            .param(name)
            .ok_or_else(|| Error::MissingParameter(name.to_string()))?;
        parse_value(name, raw)
    }

    /// Typed query parameter.
    pub fn query_as<T: FromStr>(&self, name: &str) -> Result<T> {
        let raw = self
            .query(name)
            .ok_or_else(|| Error::MissingParameter(name.to_string()))?;
        parse_value(name, raw)
    }

    /// Typed path parameter, `default` when absent.
    pub fn param_or<T: FromStr>(&self, name: &str, default: T) -> Result<T> {
        match self.param(name) {
            Some(raw) => parse_value(name, raw),
            None => Ok(default),
        }
    }

    /// Typed query parameter, `default` when absent.
    pub fn query_or<T: FromStr>(&self, name: &str, default: T) -> Result<T> {
        match self.query(name) {
            Some(raw) => parse_value(name, raw),
            None => Ok(default),
        }
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        self.request.json()
    }

    /// Store a value under `key`, replacing any previous one.
    pub fn set_state(&mut self, key: &str, value: StateValue<'a>) {
        let key: &'a str = self.arena.alloc_str(key);
        self.state.insert(key, value);
    }

    /// Copy `value` into the arena and store it as text.
    pub fn set_text(&mut self, key: &str, value: &str) {
        let value: &'a str = self.arena.alloc_str(value);
        self.set_state(key, StateValue::Text(value));
    }

    /// Copy `value` into the arena and store it as bytes.
    pub fn set_bytes(&mut self, key: &str, value: &[u8]) {
        let value: &'a [u8] = self.arena.alloc_slice_copy(value);
        self.set_state(key, StateValue::Bytes(value));
    }

    pub fn state(&self, key: &str) -> Option<&StateValue<'a>> {
        self.state.get(key)
    }

    pub fn state_text(&self, key: &str) -> Option<&'a str> {
        self.state(key).and_then(StateValue::as_text)
    }

    pub fn state_int(&self, key: &str) -> Option<i64> {
        self.state(key).and_then(StateValue::as_int)
    }

    pub fn state_bool(&self, key: &str) -> Option<bool> {
        self.state(key).and_then(StateValue::as_bool)
    }

    pub fn state_uuid(&self, key: &str) -> Option<Uuid> {
        self.state(key).and_then(StateValue::as_uuid)
    }

    /// Stage a header for the final response. Staging a name twice keeps the
    /// latest value; a header the handler sets on its response wins.
    pub fn set_response_header(&mut self, name: &str, value: &str) {
        let name: &'a str = self.arena.alloc_str(name);
        let value: &'a str = self.arena.alloc_str(value);
        self.response_headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        self.response_headers.push((name, value));
    }

    /// Staged response headers in staging order.
    pub fn response_headers(&self) -> impl Iterator<Item = (&'a str, &'a str)> + '_ {
        self.response_headers.iter().copied()
    }

    /// Merge staged headers into `response`.
    pub fn finalize(&self, mut response: HttpResponse) -> HttpResponse {
        for (name, value) in self.response_headers() {
            if !response.headers.contains(name) {
                response.headers.push(name, value);
            }
        }
        response
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse().map_err(|_| Error::Parse {
        name: name.to_string(),
        value: raw.to_string(),
        target: std::any::type_name::<T>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena;

    fn request() -> HttpRequest {
        HttpRequest::new(HttpMethod::GET, "/users/42?page=3&flag=maybe")
            .with_header("X-Token", "abc")
    }

    fn params() -> PathParams {
        let mut params = PathParams::new();
        params.push("id", "42");
        params.push("slug", "hello");
        params
    }

    #[test]
    fn test_typed_accessors() {
        let req = request();
        arena::scope(|bump| {
            let ctx = RequestContext::new(&req, bump, params());
            assert_eq!(ctx.param_as::<u64>("id").unwrap(), 42);
            assert_eq!(ctx.query_as::<u32>("page").unwrap(), 3);
            assert_eq!(ctx.query_or::<u32>("limit", 20).unwrap(), 20);
            assert_eq!(ctx.param_or::<i32>("missing", -1).unwrap(), -1);
            assert_eq!(ctx.header("x-token"), Some("abc"));
        });
    }

    #[test]
    fn test_typed_accessor_errors() {
        let req = request();
        arena::scope(|bump| {
            let ctx = RequestContext::new(&req, bump, params());
            assert!(matches!(
                ctx.param_as::<u64>("nope"),
                Err(Error::MissingParameter(name)) if name == "nope"
            ));
            assert!(matches!(
                ctx.param_as::<u64>("slug"),
                Err(Error::Parse { ref name, ref value, .. }) if name == "slug" && value == "hello"
            ));
            assert!(matches!(
                ctx.query_or::<bool>("flag", false),
                Err(Error::Parse { .. })
            ));
        });
    }

    #[test]
    fn test_state_bag() {
        let req = request();
        arena::scope(|bump| {
            let mut ctx = RequestContext::new(&req, bump, PathParams::new());
            let id = Uuid::new_v4();
            ctx.set_state("request_id", StateValue::Uuid(id));
            ctx.set_text("user", "ada");
            ctx.set_state("admin", StateValue::Bool(true));
            ctx.set_state("count", StateValue::Int(1));
            ctx.set_state("count", StateValue::Int(2));

            assert_eq!(ctx.state_uuid("request_id"), Some(id));
            assert_eq!(ctx.state_text("user"), Some("ada"));
            assert_eq!(ctx.state_bool("admin"), Some(true));
            assert_eq!(ctx.state_int("count"), Some(2));
            assert_eq!(ctx.state_text("count"), None);
            assert!(ctx.state("absent").is_none());
        });
    }

    #[test]
    fn test_staged_headers_do_not_override_handler() {
        let req = request();
        arena::scope(|bump| {
            let mut ctx = RequestContext::new(&req, bump, PathParams::new());
            ctx.set_response_header("X-Request-Id", "first");
            ctx.set_response_header("x-request-id", "second");
            ctx.set_response_header("Cache-Control", "no-store");

            let response = HttpResponse::ok().with_header("Cache-Control", "max-age=60");
            let response = ctx.finalize(response);
            assert_eq!(response.header("X-Request-Id"), Some("second"));
            assert_eq!(response.header("cache-control"), Some("max-age=60"));
        });
    }

    #[test]
    fn test_json_body() {
        #[derive(serde::Deserialize)]
        struct Login {
            user: String,
        }

        let req = HttpRequest::new(HttpMethod::POST, "/login").with_body(r#"{"user":"ada"}"#);
        let bad = HttpRequest::new(HttpMethod::POST, "/login").with_body("{");
        arena::scope(|bump| {
            let ctx = RequestContext::new(&req, bump, PathParams::new());
            assert_eq!(ctx.json::<Login>().unwrap().user, "ada");
            let ctx = RequestContext::new(&bad, bump, PathParams::new());
            assert!(matches!(ctx.json::<Login>(), Err(Error::Deserialization(_))));
        });
    }
}
