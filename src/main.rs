use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use url_redirect::analytics::{
    AnalyticsPipeline, AnalyticsReader, AnalyticsSink, MemorySink, RedisSink,
};
use url_redirect::config::{Config, LogFormat};
use url_redirect::metrics::{DurationLabels, MetricsRegistry, TokioRuntimeSampler};
use url_redirect::store::{MemoryStore, RedirectStore, RedisStore};
use url_redirect::{demo_data, redis_client, server, AppState};

/// Approximate length cap for the analytics stream.
const ANALYTICS_STREAM_MAX_LEN: usize = 100_000;

/// Events kept for stats when running without Redis.
const MEMORY_ANALYTICS_RETAIN: usize = 10_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);
    config.validate()?;

    // ── 1. Storage and analytics sink ────────────────────────────
    let (store, sink, reader): (
        Arc<dyn RedirectStore>,
        Arc<dyn AnalyticsSink>,
        Arc<dyn AnalyticsReader>,
    ) = if config.memory_store {
        tracing::warn!("using in-memory redirect store; analytics go to the log");
        let sink = Arc::new(MemorySink::new(MEMORY_ANALYTICS_RETAIN));
        (Arc::new(MemoryStore::new()), sink.clone(), sink)
    } else {
        let conn = redis_client::connect(&config.redis_url)
            .await
            .context("failed to connect to redis")?;
        let sink = Arc::new(
            RedisSink::new(conn.clone(), config.log_additional_headers.clone())
                .with_max_len(ANALYTICS_STREAM_MAX_LEN),
        );
        (Arc::new(RedisStore::new(conn)), sink.clone(), sink)
    };

    // ── 2. Metrics (a name clash stops startup here) ─────────────
    let sampler = TokioRuntimeSampler::start().context("failed to create runtime sampler")?;
    let duration_labels = if config.histogram_by_status {
        DurationLabels::HandlerAndStatus
    } else {
        DurationLabels::Handler
    };
    let metrics = Arc::new(
        MetricsRegistry::new(duration_labels, Arc::new(sampler))
            .context("failed to register metrics")?,
    );

    // ── 3. Analytics pipeline ────────────────────────────────────
    let pipeline = Arc::new(AnalyticsPipeline::start(
        sink,
        config.analytics_queue_capacity,
        metrics.analytics_counters(),
    ));

    // ── 4. Optional demo data ────────────────────────────────────
    if config.seed_demo_data {
        demo_data::seed(store.as_ref())
            .await
            .context("failed to seed demo redirects")?;
    }

    // ── 5. Build shared state and router ─────────────────────────
    let state = Arc::new(AppState::new(
        &config,
        store,
        metrics,
        pipeline.clone(),
        reader,
    ));
    let app = server::create_router(state);

    // ── 6. Bind & serve ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(
        addr = %config.bind,
        rate_limit = config.rate_limit,
        window_secs = config.rate_limit_window_secs,
        "listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(server::shutdown_signal())
    .await
    .context("server exited with error")?;

    // ── 7. Drain analytics ───────────────────────────────────────
    pipeline.shutdown(config.shutdown_grace()).await;
    tracing::info!("shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,url_redirect=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
