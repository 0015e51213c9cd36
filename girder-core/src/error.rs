// Error types for the Girder server

use crate::HttpStatus;
use crate::http::{HttpMethod, HttpResponse};
use crate::status::reason_phrase;
use girder_websocket::{HandshakeError, WebSocketError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Setup errors
    #[error("Duplicate route: {method} {pattern}")]
    DuplicateRoute { method: HttpMethod, pattern: String },

    #[error("Invalid route pattern: {0}")]
    InvalidPattern(String),

    #[error("Address in use: {0}")]
    AddressInUse(String),

    #[error("No free port in {start}..{end} ({attempts} attempts)")]
    BindExhausted { start: u16, end: u32, attempts: u32 },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Request errors
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("No route for {0}")]
    RouteNotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Cannot parse {name}={value:?} as {target}")]
    Parse {
        name: String,
        value: String,
        target: &'static str,
    },

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Payload Too Large: {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Handshake failed on {header}: {0}", header = .0.header())]
    Handshake(#[from] HandshakeError),

    // Server errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Response formatting failed: {0}")]
    ResponseFormat(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WebSocketError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::MalformedRequest(_)
            | Error::BadRequest(_)
            | Error::MissingParameter(_)
            | Error::Parse { .. }
            | Error::Deserialization(_)
            | Error::Handshake(_) => HttpStatus::BadRequest.code(),
            Error::NotFound(_) | Error::RouteNotFound(_) => HttpStatus::NotFound.code(),
            Error::MethodNotAllowed(_) => HttpStatus::MethodNotAllowed.code(),
            Error::Unauthorized(_) => HttpStatus::Unauthorized.code(),
            Error::Forbidden(_) => HttpStatus::Forbidden.code(),
            Error::PayloadTooLarge { .. } => HttpStatus::PayloadTooLarge.code(),
            Error::WebSocket(WebSocketError::Handshake(_)) => HttpStatus::BadRequest.code(),

            // Default to 500 for setup and server failures
            _ => HttpStatus::InternalServerError.code(),
        }
    }

    /// Get the HttpStatus enum for this error
    pub fn http_status(&self) -> HttpStatus {
        HttpStatus::from_code(self.status_code()).unwrap_or(HttpStatus::InternalServerError)
    }

    /// Reason phrase of the mapped status
    pub fn reason(&self) -> &'static str {
        reason_phrase(self.status_code())
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.http_status().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.http_status().is_server_error()
    }

    /// JSON error response: `{"error": reason, "detail": message, "status": code}`
    pub fn to_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = serde_json::json!({
            "error": self.reason(),
            "detail": self.to_string(),
            "status": status,
        });
        HttpResponse::new(status).with_json_value(&body)
    }
}

/// Result type alias for Girder operations
pub type Result<T> = std::result::Result<T, Error>;
