//! Configuration management for Gatekeeper.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{GatekeeperError, Result};
use crate::ratelimit::{LimiterConfig, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "GATEKEEPER";

/// Main configuration for the Gatekeeper service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Largest request body buffered when resolving identities
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3001))
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Requests admitted per user per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How often expired records are evicted, in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

fn default_max_requests() -> u32 {
    DEFAULT_MAX_REQUESTS
}

fn default_window_secs() -> u64 {
    DEFAULT_WINDOW.as_secs()
}

fn default_cleanup_interval() -> u64 {
    60
}

impl RateLimitingConfig {
    /// Settings for the admission store.
    pub fn limiter_config(&self) -> LimiterConfig {
        LimiterConfig {
            max_requests: self.max_requests,
            window: Duration::from_secs(self.window_secs),
        }
    }

    /// Period of the eviction sweeper.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl GatekeeperConfig {
    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GatekeeperError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Layer an optional config file and `GATEKEEPER_*` environment variables.
    ///
    /// Nested keys use `__`, e.g. `GATEKEEPER_RATE_LIMITING__MAX_REQUESTS=10`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.limiter_config().validate()?;
        if self.rate_limiting.cleanup_interval_secs == 0 {
            return Err(GatekeeperError::Config(
                "cleanup_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
