//! Configuration management for the SwarmBoard server.
//!
//! Supports multiple configuration sources with precedence:
//! 1. Environment variables (highest priority)
//! 2. TOML configuration file
//! 3. Default values (lowest priority)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "swarmboard.toml";

/// Main configuration structure for the SwarmBoard server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP/WebSocket listener
    #[serde(default)]
    pub server: ServerConfig,

    /// Run store
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Load engine, metrics backend and polling
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration (host, port)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port serving both the REST API and the event stream (default: 3001)
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database URL (default: "sqlite://loadtest_history.db")
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Max connections in pool (default: 5)
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection timeout in seconds (default: 5)
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
}

/// External services and the stats poll loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the load engine's web API (default: "http://localhost:8089")
    #[serde(default = "default_engine_url")]
    pub url: String,

    /// Base URL of the metrics-query backend (default: "http://localhost:9090")
    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    /// Where the scenario artifact is written for the engine to read
    /// (default: "locust/scenarios.json")
    #[serde(default = "default_scenarios_path")]
    pub scenarios_path: PathBuf,

    /// Stats poll interval in milliseconds (default: 2000)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// TCP connect timeout for engine and backend calls (default: 5)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Whole-request timeout for engine and backend calls (default: 10)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error (default: "info")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty (default: "pretty")
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_db_path() -> String {
    "sqlite://loadtest_history.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_engine_url() -> String {
    "http://localhost:8089".to_string()
}

fn default_prometheus_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_scenarios_path() -> PathBuf {
    PathBuf::from("locust/scenarios.json")
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
            connection_timeout_seconds: default_connection_timeout(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_engine_url(),
            prometheus_url: default_prometheus_url(),
            scenarios_path: default_scenarios_path(),
            poll_interval_ms: default_poll_interval_ms(),
            connect_timeout_seconds: default_connect_timeout(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl EngineConfig {
    /// Poll loop period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file doesn't exist or has invalid TOML syntax.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::TomlError { path, source: e })
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Reads `SWARMBOARD_CONFIG` (or `swarmboard.toml`) if it exists, otherwise uses
    /// defaults, then applies [`Config::apply_env_overrides`].
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("SWARMBOARD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `SWARMBOARD_HOST` / `SWARMBOARD_PORT` - Listener
    /// - `SWARMBOARD_DB_PATH` - Database URL
    /// - `SWARMBOARD_ENGINE_URL` / `SWARMBOARD_PROMETHEUS_URL` - External services
    /// - `SWARMBOARD_SCENARIOS_PATH` - Scenario artifact location
    /// - `SWARMBOARD_POLL_INTERVAL_MS` - Poll period
    /// - `SWARMBOARD_LOG_LEVEL` / `SWARMBOARD_LOG_FORMAT` - Logging
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("SWARMBOARD_HOST") {
            self.server.host = host;
        }

        if let Ok(port) = std::env::var("SWARMBOARD_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }

        if let Ok(path) = std::env::var("SWARMBOARD_DB_PATH") {
            self.database.path = path;
        }

        if let Ok(url) = std::env::var("SWARMBOARD_ENGINE_URL") {
            self.engine.url = url;
        }

        if let Ok(url) = std::env::var("SWARMBOARD_PROMETHEUS_URL") {
            self.engine.prometheus_url = url;
        }

        if let Ok(path) = std::env::var("SWARMBOARD_SCENARIOS_PATH") {
            self.engine.scenarios_path = PathBuf::from(path);
        }

        if let Ok(interval) = std::env::var("SWARMBOARD_POLL_INTERVAL_MS") {
            if let Ok(interval) = interval.parse() {
                self.engine.poll_interval_ms = interval;
            }
        }

        if let Ok(level) = std::env::var("SWARMBOARD_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = std::env::var("SWARMBOARD_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be non-zero".to_string(),
            ));
        }

        if self.database.path.is_empty() {
            return Err(ConfigError::ValidationError(
                "database.path cannot be empty".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database.max_connections must be > 0".to_string(),
            ));
        }

        if self.database.connection_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "database.connection_timeout_seconds must be > 0".to_string(),
            ));
        }

        for (key, url) in [
            ("engine.url", &self.engine.url),
            ("engine.prometheus_url", &self.engine.prometheus_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::ValidationError(format!(
                    "{key} must be an http(s) URL, got '{url}'"
                )));
            }
        }

        if self.engine.scenarios_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "engine.scenarios_path cannot be empty".to_string(),
            ));
        }

        if self.engine.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "engine.poll_interval_ms must be > 0".to_string(),
            ));
        }

        if self.engine.request_timeout_seconds == 0 || self.engine.connect_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "engine timeouts must be > 0".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.format must be one of: {}",
                valid_formats.join(", ")
            )));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading configuration file
    #[error("Failed to read config file {path:?}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// TOML parsing error
    #[error("Failed to parse TOML in {path:?}: {source}")]
    TomlError {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Validation error
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
