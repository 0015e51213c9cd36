// HTTP request and response types

use crate::error::{Error, Result};
use crate::small_vec::{HeaderList, QueryParams};
use crate::status::reason_phrase;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::time::SystemTime;

/// HTTP methods
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
}

impl HttpMethod {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "DELETE" => Some(HttpMethod::DELETE),
            "PATCH" => Some(HttpMethod::PATCH),
            "HEAD" => Some(HttpMethod::HEAD),
            "OPTIONS" => Some(HttpMethod::OPTIONS),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP request, parsed once from the wire
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Path without the query string
    pub path: String,
    /// Raw query string without the leading `?`
    pub query_string: String,
    pub query_params: QueryParams,
    pub headers: HeaderList,
    pub body: Vec<u8>,
    pub remote_addr: Option<SocketAddr>,
}

impl HttpRequest {
    /// Create a request from a method and a request target such as `/a?b=1`.
    pub fn new(method: HttpMethod, target: &str) -> Self {
        let (path, query_string) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };
        Self {
            method,
            path: path.to_string(),
            query_string: query_string.to_string(),
            query_params: QueryParams::parse(query_string),
            headers: HeaderList::new(),
            body: Vec::new(),
            remote_addr: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Get a header by name, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Get a query parameter by name
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_params.get(name)
    }

    /// Parse the request body as JSON
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Whether the `Accept` header lists `mime`
    pub fn accepts(&self, mime: &str) -> bool {
        self.header("accept")
            .map(|accept| {
                accept
                    .split(',')
                    .any(|part| part.split(';').next().unwrap_or("").trim().eq_ignore_ascii_case(mime))
            })
            .unwrap_or(false)
    }
}

/// HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderList,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderList::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn created() -> Self {
        Self::new(201)
    }

    pub fn no_content() -> Self {
        Self::new(204)
    }

    pub fn bad_request() -> Self {
        Self::new(400)
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn internal_server_error() -> Self {
        Self::new(500)
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_header("Content-Type", "text/plain; charset=utf-8")
            .with_body(text.into().into_bytes())
    }

    pub fn with_html(self, html: impl Into<String>) -> Self {
        self.with_header("Content-Type", "text/html; charset=utf-8")
            .with_body(html.into().into_bytes())
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self> {
        self.body = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.headers.set("Content-Type", "application/json");
        Ok(self)
    }

    /// Infallible JSON body from an already-built value.
    pub fn with_json_value(mut self, value: &serde_json::Value) -> Self {
        self.body = value.to_string().into_bytes();
        self.headers.set("Content-Type", "application/json");
        self
    }

    /// Set a header, replacing any existing one with the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Wire form including the body.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.to_bytes_with(true)
    }

    /// Wire form; HEAD responses pass `include_body = false` and keep the
    /// `Content-Length` of the body they would have sent.
    ///
    /// Header names or values containing CR or LF are rejected.
    pub fn to_bytes_with(&self, include_body: bool) -> Result<Vec<u8>> {
        for (name, value) in self.headers.iter() {
            if name.is_empty() || name.contains([':', '\r', '\n']) {
                return Err(Error::ResponseFormat(format!("invalid header name {:?}", name)));
            }
            if value.contains(['\r', '\n']) {
                return Err(Error::ResponseFormat(format!("invalid value for header {}", name)));
            }
        }

        let mut out = Vec::with_capacity(128 + self.body.len());
        out.extend_from_slice(
            format!("HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status)).as_bytes(),
        );
        let content_type = self
            .headers
            .get("content-type")
            .unwrap_or("text/plain; charset=utf-8");
        push_header(&mut out, "Content-Type", content_type);
        push_header(&mut out, "Content-Length", &self.body.len().to_string());
        push_header(&mut out, "Connection", "close");
        if !self.headers.contains("date") {
            push_header(&mut out, "Date", &httpdate::fmt_http_date(SystemTime::now()));
        }
        for (name, value) in self.headers.iter() {
            if ["content-type", "content-length", "connection"]
                .iter()
                .any(|reserved| name.eq_ignore_ascii_case(reserved))
            {
                continue;
            }
            push_header(&mut out, name, value);
        }
        out.extend_from_slice(b"\r\n");
        if include_body {
            out.extend_from_slice(&self.body);
        }
        Ok(out)
    }
}

fn push_header(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(b"\r\n");
}

/// JSON response helper
#[derive(Debug)]
pub struct Json<T: Serialize>(pub T);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_target_split() {
        let req = HttpRequest::new(HttpMethod::GET, "/search?q=rust&page=2");
        assert_eq!(req.path, "/search");
        assert_eq!(req.query_string, "q=rust&page=2");
        assert_eq!(req.query("page"), Some("2"));
    }

    #[test]
    fn test_accepts() {
        let req = HttpRequest::new(HttpMethod::GET, "/")
            .with_header("Accept", "text/html,application/xhtml+xml;q=0.9");
        assert!(req.accepts("text/html"));
        assert!(req.accepts("application/xhtml+xml"));
        assert!(!req.accepts("application/json"));
    }

    #[test]
    fn test_wire_format() {
        let bytes = HttpResponse::ok()
            .with_header("X-Custom", "1")
            .with_text("hi")
            .to_bytes()
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.contains("X-Custom: 1\r\n"));
        assert!(text.ends_with("\r\n\r\nhi"));
    }

    #[test]
    fn test_head_omits_body() {
        let bytes = HttpResponse::ok().with_text("hello").to_bytes_with(false).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_crlf_injection_rejected() {
        let response = HttpResponse::ok().with_header("X-Evil", "a\r\nSet-Cookie: x=1");
        assert!(matches!(response.to_bytes(), Err(Error::ResponseFormat(_))));
    }

    #[test]
    fn test_method_round_trip() {
        assert_eq!(HttpMethod::from_str("patch"), Some(HttpMethod::PATCH));
        assert_eq!(HttpMethod::from_str("TRACE"), None);
        assert_eq!(HttpMethod::DELETE.to_string(), "DELETE");
    }
}
