use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Every option can come from the environment; flags override it.
#[derive(Debug, Clone, Parser)]
#[command(name = "url-redirect", version, about = "Public URL redirection service")]
pub struct Config {
    /// Address the HTTP listener binds to
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8082")]
    pub bind: SocketAddr,

    /// Redis connection string for the redirect table and analytics stream
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379/")]
    pub redis_url: String,

    /// Keep redirects in memory and log analytics instead of using Redis
    #[arg(long, env = "MEMORY_STORE", default_value_t = false)]
    pub memory_store: bool,

    /// Shared secret expected in `x-url-redirect-token` on /api routes
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Requests admitted per client per window
    #[arg(long, env = "HTTP_RATE_LIMIT", default_value_t = 10)]
    pub rate_limit: u32,

    /// Rate-limit window length in seconds
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value_t = 1)]
    pub rate_limit_window_secs: u64,

    /// Request headers whose values are attached to analytics events
    #[arg(long, env = "LOG_ADDITIONAL_HEADERS", value_delimiter = ',')]
    pub log_additional_headers: Vec<String>,

    /// Paths that bypass analytics and metrics (`*` suffix = prefix match)
    #[arg(
        long,
        env = "EXEMPT_PATHS",
        value_delimiter = ',',
        default_values = ["/metrics", "/app/health", "/favicon.ico", "/static/*"]
    )]
    pub exempt_paths: Vec<String>,

    /// Slots in the analytics queue before events are dropped
    #[arg(long, env = "ANALYTICS_QUEUE_CAPACITY", default_value_t = 1000)]
    pub analytics_queue_capacity: usize,

    /// How long shutdown waits for queued analytics events
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value_t = 5)]
    pub shutdown_grace_secs: u64,

    /// Length of generated short paths
    #[arg(long, env = "PATH_LENGTH", default_value_t = 9)]
    pub path_length: usize,

    /// Include the status code as a label on the duration histogram
    #[arg(
        long,
        env = "HISTOGRAM_BY_STATUS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub histogram_by_status: bool,

    /// Write a few demo redirects into the store at startup
    #[arg(long, env = "SEED_DEMO_DATA", default_value_t = false)]
    pub seed_demo_data: bool,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("API_KEY must not be empty")]
    EmptyApiKey,
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl Config {
    /// Rejects values that would make the service unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        if self.rate_limit == 0 {
            return Err(ConfigError::Zero("HTTP_RATE_LIMIT"));
        }
        if self.rate_limit_window_secs == 0 {
            return Err(ConfigError::Zero("RATE_LIMIT_WINDOW_SECS"));
        }
        if self.analytics_queue_capacity == 0 {
            return Err(ConfigError::Zero("ANALYTICS_QUEUE_CAPACITY"));
        }
        if self.path_length == 0 {
            return Err(ConfigError::Zero("PATH_LENGTH"));
        }
        Ok(())
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
