//! Configuration management for the IdeaHub middleware
//!
//! Loads configuration from config.toml at startup.
//! Every section falls back to defaults when omitted.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Middleware configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    /// Client pipeline token bucket
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub logger: LoggerConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Server-side per-client throttle
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Diagnostics server settings
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// TTL applied when a caller does not pass one
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Bucket size (and starting token count)
    #[serde(default = "default_capacity")]
    pub capacity: f64,

    /// Tokens restored per `refill_period_secs`
    #[serde(default = "default_capacity")]
    pub refill_amount: f64,

    #[serde(default = "default_refill_period_secs")]
    pub refill_period_secs: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggerConfig {
    #[serde(default = "default_max_log_entries")]
    pub max_entries: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Points kept per metric series
    #[serde(default = "default_max_points")]
    pub max_points: usize,

    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    #[serde(default = "default_latency_alert_ms")]
    pub latency_alert_ms: f64,

    #[serde(default = "default_cpu_alert_percent")]
    pub cpu_alert_percent: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThrottleConfig {
    /// Requests allowed per client per window
    #[serde(default = "default_throttle_limit")]
    pub limit: u32,

    #[serde(default = "default_throttle_ttl_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Port for the diagnostics HTTP server
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_amount: default_capacity(),
            refill_period_secs: default_refill_period_secs(),
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_log_entries(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_points: default_max_points(),
            sample_interval_ms: default_sample_interval_ms(),
            latency_alert_ms: default_latency_alert_ms(),
            cpu_alert_percent: default_cpu_alert_percent(),
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            limit: default_throttle_limit(),
            ttl_secs: default_throttle_ttl_secs(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    60
}

fn default_capacity() -> f64 {
    100.0
}

fn default_refill_period_secs() -> f64 {
    60.0
}

fn default_max_log_entries() -> usize {
    1000
}

fn default_max_points() -> usize {
    100
}

fn default_sample_interval_ms() -> u64 {
    2000
}

fn default_latency_alert_ms() -> f64 {
    2000.0
}

fn default_cpu_alert_percent() -> f64 {
    80.0
}

fn default_throttle_limit() -> u32 {
    10
}

fn default_throttle_ttl_secs() -> u64 {
    60
}

fn default_api_port() -> u16 {
    3000
}

impl CacheConfig {
    #[inline]
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

impl RateLimitConfig {
    /// Tokens restored per second
    #[inline]
    pub fn refill_per_sec(&self) -> f64 {
        if self.refill_period_secs <= 0.0 {
            return self.capacity;
        }
        self.refill_amount / self.refill_period_secs
    }
}

impl MonitorConfig {
    #[inline]
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

impl ThrottleConfig {
    #[inline]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Config {
    /// Load configuration from config.toml file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// # Errors
    /// Returns error if file exists but cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => Self::from_toml(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid TOML
    #[error("Failed to parse config: {0}")]
    Parse(String),
}
