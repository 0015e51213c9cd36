// Server configuration
//
// Sources, lowest precedence first: `ServerConfig::default()`, a TOML file,
// then `GIRDER_*` environment variables (a `.env` file is loaded first when
// present). Every source ends with `validate()`.

use crate::error::{Error, Result};
use crate::logging::debug;
use crate::worker::WorkerMode;
use girder_websocket::WebSocketConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "GIRDER_";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Try the following ports when `port` is taken
    pub auto_port: bool,
    /// Total bind attempts when `auto_port` is on
    pub max_port_attempts: u32,
    /// Absent: auto. 0: single-threaded. n: fixed pool.
    pub workers: Option<usize>,
    pub access_log: bool,
    pub max_body_size: usize,
    pub max_header_size: usize,
    /// 0 disables the timeout
    pub read_timeout_ms: u64,
    /// 0 disables the timeout
    pub write_timeout_ms: u64,
    /// Serve the docs, health and GraphQL reserved routes
    pub reserved_routes: bool,
    pub docs_path: String,
    pub health_path: String,
    pub graphql_path: String,
    pub graphql_playground: bool,
    pub websocket: WebSocketConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            auto_port: false,
            max_port_attempts: 10,
            workers: None,
            access_log: true,
            max_body_size: 1024 * 1024,
            max_header_size: 8 * 1024,
            read_timeout_ms: 30_000,
            write_timeout_ms: 30_000,
            reserved_routes: true,
            docs_path: "/docs".to_string(),
            health_path: "/health".to_string(),
            graphql_path: "/graphql".to_string(),
            graphql_playground: true,
            websocket: WebSocketConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parse and validate a TOML document.
    ///
    /// ```
    /// use girder_core::ServerConfig;
    ///
    /// let config = ServerConfig::from_toml_str("port = 9000\nworkers = 0").unwrap();
    /// assert_eq!(config.port, 9000);
    /// assert_eq!(config.workers, Some(0));
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| Error::Config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Loaded configuration file");
        Self::from_toml_str(&source)
    }

    /// Defaults overridden by `GIRDER_*` variables, after loading `.env`.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }
        Self::default().apply_env()
    }

    /// Layer `GIRDER_*` variables from the process environment over `self`.
    pub fn apply_env(self) -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars()
            .filter_map(|(key, value)| {
                key.strip_prefix(ENV_PREFIX)
                    .map(|name| (name.to_string(), value))
            })
            .collect();
        self.apply_vars(&vars)
    }

    /// Layer overrides keyed by variable name without the prefix, such as
    /// `PORT` or `WS_MAX_CONNECTIONS`. Unknown keys are ignored.
    pub fn apply_vars(mut self, vars: &HashMap<String, String>) -> Result<Self> {
        for (key, value) in vars {
            let value = value.trim();
            match key.to_ascii_uppercase().as_str() {
                "HOST" => self.host = value.to_string(),
                "PORT" => self.port = parse_var(key, value)?,
                "AUTO_PORT" => self.auto_port = parse_bool(key, value)?,
                "MAX_PORT_ATTEMPTS" => self.max_port_attempts = parse_var(key, value)?,
                "WORKERS" => {
                    self.workers = if value.eq_ignore_ascii_case("auto") {
                        None
                    } else {
                        Some(parse_var(key, value)?)
                    }
                }
                "ACCESS_LOG" => self.access_log = parse_bool(key, value)?,
                "MAX_BODY_SIZE" => self.max_body_size = parse_var(key, value)?,
                "MAX_HEADER_SIZE" => self.max_header_size = parse_var(key, value)?,
                "READ_TIMEOUT_MS" => self.read_timeout_ms = parse_var(key, value)?,
                "WRITE_TIMEOUT_MS" => self.write_timeout_ms = parse_var(key, value)?,
                "RESERVED_ROUTES" => self.reserved_routes = parse_bool(key, value)?,
                "DOCS_PATH" => self.docs_path = value.to_string(),
                "HEALTH_PATH" => self.health_path = value.to_string(),
                "GRAPHQL_PATH" => self.graphql_path = value.to_string(),
                "GRAPHQL_PLAYGROUND" => self.graphql_playground = parse_bool(key, value)?,
                "WS_MAX_MESSAGE_SIZE" => self.websocket.max_message_size = parse_var(key, value)?,
                "WS_MAX_FRAME_SIZE" => self.websocket.max_frame_size = parse_var(key, value)?,
                "WS_PING_INTERVAL_MS" => self.websocket.ping_interval_ms = parse_var(key, value)?,
                "WS_PONG_TIMEOUT_MS" => self.websocket.pong_timeout_ms = parse_var(key, value)?,
                "WS_MAX_CONNECTIONS" => self.websocket.max_connections = parse_var(key, value)?,
                "WS_REQUIRE_MASKED" => self.websocket.require_masked = parse_bool(key, value)?,
                _ => debug!(key = %key, "Ignoring unknown configuration variable"),
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".into()));
        }
        if self.max_port_attempts == 0 {
            return Err(Error::Config("max_port_attempts must be at least 1".into()));
        }
        if self.max_body_size == 0 {
            return Err(Error::Config("max_body_size must be greater than 0".into()));
        }
        if self.max_header_size == 0 {
            return Err(Error::Config("max_header_size must be greater than 0".into()));
        }
        if self.websocket.max_connections == 0 {
            return Err(Error::Config(
                "websocket.max_connections must be greater than 0".into(),
            ));
        }
        if self.websocket.max_frame_size == 0 || self.websocket.max_message_size == 0 {
            return Err(Error::Config("websocket size limits must be greater than 0".into()));
        }
        for (name, path) in [
            ("docs_path", &self.docs_path),
            ("health_path", &self.health_path),
            ("graphql_path", &self.graphql_path),
        ] {
            if !path.starts_with('/') {
                return Err(Error::Config(format!("{} must start with '/': {:?}", name, path)));
            }
        }
        Ok(())
    }

    pub fn worker_mode(&self) -> WorkerMode {
        WorkerMode::from_config(self.workers)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }

    /// Upper bound on bytes read for one request.
    pub fn max_request_size(&self) -> usize {
        self.max_header_size.saturating_add(self.max_body_size)
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        Error::Config(format!(
            "{}{}: cannot parse {:?} as {}",
            ENV_PREFIX,
            key,
            value,
            std::any::type_name::<T>()
        ))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!(
            "{}{}: expected a boolean, got {:?}",
            ENV_PREFIX, key, value
        ))),
    }
}
