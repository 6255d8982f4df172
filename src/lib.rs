//! Public URL redirection service with per-request telemetry and
//! admission control.

pub mod analytics;
pub mod config;
pub mod demo_data;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod redis_client;
pub mod server;
pub mod store;

use std::sync::Arc;

use analytics::{AnalyticsReader, Recorder};
use config::Config;
use metrics::MetricsRegistry;
use middleware::{AuthGuard, ExemptPaths, RateLimiter};
use store::RedirectStore;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    pub store: Arc<dyn RedirectStore>,

    /// Built once at startup; every request updates it before responding.
    pub metrics: Arc<MetricsRegistry>,

    /// Non-blocking analytics entry point.
    pub recorder: Arc<dyn Recorder>,

    /// Aggregates over persisted events, for `/api/operations/stats`.
    pub analytics: Arc<dyn AnalyticsReader>,

    pub limiter: RateLimiter,
    pub auth: AuthGuard,
    pub exempt: ExemptPaths,

    /// Request headers copied into each analytics event.
    pub logged_headers: Vec<String>,

    /// Length of paths made by `generate`.
    pub path_length: usize,
}

impl AppState {
    pub fn new(
        config: &Config,
        store: Arc<dyn RedirectStore>,
        metrics: Arc<MetricsRegistry>,
        recorder: Arc<dyn Recorder>,
        analytics: Arc<dyn AnalyticsReader>,
    ) -> Self {
        Self {
            store,
            metrics,
            recorder,
            analytics,
            limiter: RateLimiter::new(config.rate_limit, config.rate_limit_window()),
            auth: AuthGuard::new(config.api_key.clone()),
            exempt: ExemptPaths::new(
                config
                    .exempt_paths
                    .iter()
                    .map(String::as_str)
                    .chain([metrics::exposition::METRICS_PATH]),
            ),
            logged_headers: config.log_additional_headers.clone(),
            path_length: config.path_length,
        }
    }
}
