//! Per-request analytics records and the path they take to durable storage.
//!
//! Request tasks only ever call [`Recorder::record`], which must not wait on
//! the sink. The [`pipeline::AnalyticsPipeline`] owns the queue and the single
//! consumer that talks to an [`AnalyticsSink`].

pub mod pipeline;
pub mod sink;
pub mod stats;

use std::collections::BTreeMap;
use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub use pipeline::{AnalyticsCounters, AnalyticsPipeline, PipelineStats};
pub use sink::{MemorySink, RedisSink};
pub use stats::{AnalyticsReader, AnalyticsStats, StatsWindow};

/// One finished request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsEvent {
    pub path: String,
    pub timestamp: DateTime<Utc>,
    pub status_code: u16,
    pub processing_time_ms: u64,
    /// Classifier label, bounded cardinality.
    pub label: String,
    pub client_context: ClientContext,
}

/// Opaque caller details captured with the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<IpAddr>,
    /// Values of the configured additional headers, by lowercase name.
    /// Absent headers are kept as empty strings.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl ClientContext {
    /// `|`-joined header values in configured order.
    pub fn joined_headers(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|n| self.headers.get(&n.to_ascii_lowercase()).map(String::as_str).unwrap_or(""))
            .collect::<Vec<_>>()
            .join("|")
    }
}

impl AnalyticsEvent {
    /// Stamps the event with the current time.
    pub fn new(
        path: impl Into<String>,
        status_code: u16,
        processing_time_ms: u64,
        label: impl Into<String>,
        client_context: ClientContext,
    ) -> Self {
        Self {
            path: path.into(),
            timestamp: Utc::now(),
            status_code,
            processing_time_ms,
            label: label.into(),
            client_context,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

/// Durable destination for analytics events.
#[async_trait]
pub trait AnalyticsSink: Send + Sync + 'static {
    async fn insert(&self, event: &AnalyticsEvent) -> Result<(), SinkError>;
}

/// Accepts events from request tasks without blocking them.
pub trait Recorder: Send + Sync {
    fn record(&self, event: AnalyticsEvent);
}
