//! Aggregated read-back of persisted analytics.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use super::SinkError;

/// Key reported for events with an empty dimension value.
const OTHER: &str = "Other";

/// Inclusive time range, whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl StatsWindow {
    /// `None` for negative or reversed bounds.
    pub fn from_unix(start: i64, end: i64) -> Option<Self> {
        if start < 0 || end < start {
            return None;
        }
        Some(Self {
            start: Utc.timestamp_opt(start, 0).single()?,
            end: Utc.timestamp_opt(end, 0).single()?,
        })
    }

    /// Covers the whole final second.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at.timestamp() <= self.end.timestamp()
    }

    pub fn start_ms(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_ms(&self) -> i64 {
        self.end.timestamp_millis() + 999
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatCount {
    pub stat_key: String,
    pub stat_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatAverage {
    pub stat_key: String,
    pub stat_count: f64,
}

/// Counts per dimension plus mean processing time (ms) per status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsStats {
    pub path: Vec<StatCount>,
    pub status: Vec<StatCount>,
    pub label: Vec<StatCount>,
    pub time: Vec<StatAverage>,
}

#[derive(Debug, Default)]
pub struct StatsAccumulator {
    path: BTreeMap<String, u64>,
    status: BTreeMap<u16, u64>,
    label: BTreeMap<String, u64>,
    time: BTreeMap<u16, (u64, u64)>,
}

impl StatsAccumulator {
    pub fn add(&mut self, path: &str, status: u16, label: &str, processing_time_ms: u64) {
        *self.path.entry(or_other(path)).or_default() += 1;
        *self.status.entry(status).or_default() += 1;
        *self.label.entry(or_other(label)).or_default() += 1;
        let (sum, n) = self.time.entry(status).or_default();
        *sum += processing_time_ms;
        *n += 1;
    }

    pub fn finish(self) -> AnalyticsStats {
        let counts = |m: BTreeMap<String, u64>| {
            m.into_iter()
                .map(|(stat_key, stat_count)| StatCount {
                    stat_key,
                    stat_count,
                })
                .collect()
        };
        AnalyticsStats {
            path: counts(self.path),
            status: counts(
                self.status
                    .into_iter()
                    .map(|(s, c)| (s.to_string(), c))
                    .collect(),
            ),
            label: counts(self.label),
            time: self
                .time
                .into_iter()
                .map(|(status, (sum, n))| StatAverage {
                    stat_key: status.to_string(),
                    stat_count: sum as f64 / n as f64,
                })
                .collect(),
        }
    }
}

fn or_other(value: &str) -> String {
    match value.trim() {
        "" => OTHER.to_string(),
        v => v.to_string(),
    }
}

/// Reads persisted events back as aggregates.
#[async_trait]
pub trait AnalyticsReader: Send + Sync {
    async fn stats(&self, window: StatsWindow) -> Result<AnalyticsStats, SinkError>;
}
