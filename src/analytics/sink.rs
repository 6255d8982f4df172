use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::streams::StreamRangeReply;
use redis::AsyncCommands;

use super::stats::{AnalyticsReader, AnalyticsStats, StatsAccumulator, StatsWindow};
use super::{AnalyticsEvent, AnalyticsSink, SinkError};

/// Stream every analytics event is appended to.
pub const ANALYTICS_STREAM: &str = "url_redirect:analytics";

/// Entries fetched per `XRANGE` call when aggregating.
const STATS_PAGE: usize = 1_000;

/// Appends events to a Redis stream with `XADD`.
#[derive(Clone)]
pub struct RedisSink {
    conn: ConnectionManager,
    additional_headers: Vec<String>,
    /// Approximate cap passed as `MAXLEN ~`; `None` keeps everything.
    max_len: Option<usize>,
}

impl RedisSink {
    pub fn new(conn: ConnectionManager, additional_headers: Vec<String>) -> Self {
        Self {
            conn,
            additional_headers,
            max_len: None,
        }
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    fn fields(&self, event: &AnalyticsEvent) -> Vec<(&'static str, String)> {
        let ip = event
            .client_context
            .ip_address
            .map(|ip| ip.to_string())
            .unwrap_or_default();
        vec![
            ("path", event.path.clone()),
            ("log_timestamp", event.timestamp.to_rfc3339()),
            ("status", event.status_code.to_string()),
            ("processing_time", event.processing_time_ms.to_string()),
            ("label", event.label.clone()),
            ("ip_address", ip),
            (
                "additional_headers",
                event.client_context.joined_headers(&self.additional_headers),
            ),
        ]
    }
}

#[async_trait]
impl AnalyticsSink for RedisSink {
    async fn insert(&self, event: &AnalyticsEvent) -> Result<(), SinkError> {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(ANALYTICS_STREAM);
        if let Some(max_len) = self.max_len {
            cmd.arg("MAXLEN").arg("~").arg(max_len);
        }
        cmd.arg("*");
        for (field, value) in self.fields(event) {
            cmd.arg(field).arg(value);
        }

        let mut conn = self.conn.clone();
        let _: String = cmd.query_async(&mut conn).await?;
        Ok(())
    }
}

// ─── Stream read-back ────────────────────────────────────────────

#[async_trait]
impl AnalyticsReader for RedisSink {
    /// Entries are selected by stream id, i.e. the time they were appended.
    async fn stats(&self, window: StatsWindow) -> Result<AnalyticsStats, SinkError> {
        let mut conn = self.conn.clone();
        let end = window.end_ms().to_string();
        let mut start = window.start_ms().to_string();
        let mut acc = StatsAccumulator::default();
        let mut skipped = 0u64;

        loop {
            let reply: StreamRangeReply = conn
                .xrange_count(ANALYTICS_STREAM, &start, &end, STATS_PAGE)
                .await?;
            for entry in &reply.ids {
                let path: String = entry.get("path").unwrap_or_default();
                let label: String = entry.get("label").unwrap_or_default();
                let status = entry
                    .get::<String>("status")
                    .and_then(|s| s.parse::<u16>().ok());
                let time = entry
                    .get::<String>("processing_time")
                    .and_then(|s| s.parse::<u64>().ok());
                match (status, time) {
                    (Some(status), Some(time)) => acc.add(&path, status, &label, time),
                    _ => skipped += 1,
                }
            }
            if reply.ids.len() < STATS_PAGE {
                break;
            }
            match reply.ids.last().and_then(|e| next_stream_id(&e.id)) {
                Some(next) => start = next,
                None => break,
            }
        }

        if skipped > 0 {
            tracing::warn!(skipped, "analytics entries without status or timing");
        }
        Ok(acc.finish())
    }
}

/// Smallest id strictly after `id` (`<ms>-<seq>`).
fn next_stream_id(id: &str) -> Option<String> {
    let (ms, seq) = id.split_once('-')?;
    let seq: u64 = seq.parse().ok()?;
    match seq.checked_add(1) {
        Some(seq) => Some(format!("{ms}-{seq}")),
        None => Some(format!("{}-0", ms.parse::<u64>().ok()?.checked_add(1)?)),
    }
}

// ─── In-memory sink ──────────────────────────────────────────────

/// Logs every event and keeps the most recent ones for [`AnalyticsReader`].
pub struct MemorySink {
    events: Mutex<VecDeque<AnalyticsEvent>>,
    retain: usize,
}

impl MemorySink {
    pub fn new(retain: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            retain: retain.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AnalyticsSink for MemorySink {
    async fn insert(&self, event: &AnalyticsEvent) -> Result<(), SinkError> {
        let context = serde_json::to_string(&event.client_context)?;
        tracing::info!(
            target: "url_redirect::analytics",
            path = %event.path,
            status = event.status_code,
            processing_time_ms = event.processing_time_ms,
            label = %event.label,
            client = %context,
            "request"
        );
        let mut events = self.events.lock();
        if events.len() == self.retain {
            events.pop_front();
        }
        events.push_back(event.clone());
        Ok(())
    }
}

#[async_trait]
impl AnalyticsReader for MemorySink {
    async fn stats(&self, window: StatsWindow) -> Result<AnalyticsStats, SinkError> {
        let mut acc = StatsAccumulator::default();
        for event in self.events.lock().iter().filter(|e| window.contains(e.timestamp)) {
            acc.add(
                &event.path,
                event.status_code,
                &event.label,
                event.processing_time_ms,
            );
        }
        Ok(acc.finish())
    }
}
