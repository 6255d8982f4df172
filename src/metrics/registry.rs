use std::collections::HashMap;
use std::sync::Arc;

use prometheus::{
    Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

use super::runtime::RuntimeSampler;
use super::summary::LatencySummary;
use crate::analytics::AnalyticsCounters;
use crate::middleware::classify::Classification;

// ─── Configuration ───────────────────────────────────────────────

/// Duration histogram buckets (ms)
const DURATION_BUCKETS_MS: &[f64] = &[0.5, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0];

/// Which labels the duration histogram carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationLabels {
    /// `{handler, status}`
    HandlerAndStatus,
    /// `{handler}` only
    Handler,
}

impl DurationLabels {
    fn names(self) -> &'static [&'static str] {
        match self {
            Self::HandlerAndStatus => &["handler", "status"],
            Self::Handler => &["handler"],
        }
    }
}

/// Every instrument the service exposes, registered once at startup.
///
/// Construction fails if any two instruments share a name; callers treat
/// that as fatal before serving traffic.
pub struct MetricsRegistry {
    registry: Registry,
    duration_labels: DurationLabels,

    total_requests: IntCounter,
    requests_by_status: IntCounterVec,
    status_duration: HistogramVec,
    active_requests: IntGauge,
    api_latency: LatencySummary,
    resolution_latency: LatencySummary,
    rate_limited: IntCounter,
    analytics: AnalyticsCounters,

    sampler: Arc<dyn RuntimeSampler>,
    runtime_gauges: HashMap<&'static str, Gauge>,
}

impl MetricsRegistry {
    pub fn new(
        duration_labels: DurationLabels,
        sampler: Arc<dyn RuntimeSampler>,
    ) -> prometheus::Result<Self> {
        let registry = Registry::new();

        let total_requests = IntCounter::new("http_requests_total", "Total requests")?;
        let requests_by_status = IntCounterVec::new(
            Opts::new("requests_by_response_status", "Requests by response status"),
            &["status"],
        )?;
        let status_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_response_status_time_ms",
                "Duration of HTTP requests in milliseconds by handler label",
            )
            .buckets(DURATION_BUCKETS_MS.to_vec()),
            duration_labels.names(),
        )?;
        let active_requests = IntGauge::new(
            "http_active_requests",
            "Number of requests currently being served",
        )?;
        let api_latency = LatencySummary::new("api_request_duration", "Duration of API requests")?;
        let resolution_latency = LatencySummary::new(
            "redirect_resolution_duration",
            "Duration of public redirect lookups",
        )?;
        let rate_limited = IntCounter::new(
            "http_rate_limited_total",
            "Requests rejected by the per-client rate limit",
        )?;
        let analytics = AnalyticsCounters {
            dropped: IntCounter::new(
                "analytics_events_dropped_total",
                "Analytics events dropped because the queue was full or closed",
            )?,
            persisted: IntCounter::new(
                "analytics_events_persisted_total",
                "Analytics events written to the sink",
            )?,
            sink_failures: IntCounter::new(
                "analytics_sink_failures_total",
                "Analytics events the sink failed to store",
            )?,
        };

        registry.register(Box::new(total_requests.clone()))?;
        registry.register(Box::new(requests_by_status.clone()))?;
        registry.register(Box::new(status_duration.clone()))?;
        registry.register(Box::new(active_requests.clone()))?;
        registry.register(Box::new(api_latency.clone()))?;
        registry.register(Box::new(resolution_latency.clone()))?;
        registry.register(Box::new(rate_limited.clone()))?;
        registry.register(Box::new(analytics.dropped.clone()))?;
        registry.register(Box::new(analytics.persisted.clone()))?;
        registry.register(Box::new(analytics.sink_failures.clone()))?;

        let mut runtime_gauges = HashMap::new();
        for (name, help) in sampler.names() {
            let gauge = Gauge::new(name, help)?;
            registry.register(Box::new(gauge.clone()))?;
            runtime_gauges.insert(name, gauge);
        }

        Ok(Self {
            registry,
            duration_labels,
            total_requests,
            requests_by_status,
            status_duration,
            active_requests,
            api_latency,
            resolution_latency,
            rate_limited,
            analytics,
            sampler,
            runtime_gauges,
        })
    }

    /// Counters the analytics pipeline should increment.
    pub fn analytics_counters(&self) -> AnalyticsCounters {
        self.analytics.clone()
    }

    /// Registers an extra collector; a name clash is an error.
    pub fn register(&self, collector: Box<dyn prometheus::core::Collector>) -> prometheus::Result<()> {
        self.registry.register(collector)
    }

    /// Marks a request as in flight until the guard is dropped.
    pub fn track_in_flight(&self) -> InFlightGuard {
        self.active_requests.inc();
        InFlightGuard {
            gauge: self.active_requests.clone(),
        }
    }

    pub fn active_requests(&self) -> i64 {
        self.active_requests.get()
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.inc();
    }

    /// Per-request update once the status and label are known.
    pub fn observe_request(&self, classification: &Classification, status: u16, elapsed_ms: f64) {
        let status_str = status.to_string();

        self.total_requests.inc();
        self.requests_by_status
            .with_label_values(&[status_str.as_str()])
            .inc();

        let label = classification.label.as_str();
        match self.duration_labels {
            DurationLabels::HandlerAndStatus => self
                .status_duration
                .with_label_values(&[label, status_str.as_str()])
                .observe(elapsed_ms),
            DurationLabels::Handler => self
                .status_duration
                .with_label_values(&[label])
                .observe(elapsed_ms),
        }

        if classification.is_privileged {
            self.api_latency.observe(elapsed_ms);
        }
        if classification.category.is_resolution() {
            self.resolution_latency.observe(elapsed_ms);
        }

        self.refresh_runtime();
    }

    /// Pulls a fresh runtime sample set onto the runtime gauges.
    pub fn refresh_runtime(&self) {
        for sample in self.sampler.sample() {
            if let Some(gauge) = self.runtime_gauges.get(sample.name) {
                gauge.set(sample.value.reduce());
            }
        }
    }

    /// Prometheus text exposition of every registered instrument.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

/// Decrements `http_active_requests` on drop, so early returns and
/// unwinding both release the slot.
#[must_use = "the request stops counting as in flight when the guard drops"]
pub struct InFlightGuard {
    gauge: IntGauge,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::runtime::{BucketCounts, RuntimeSample, SampleValue};
    use crate::middleware::classify::classify;

    struct FixedSampler;

    impl RuntimeSampler for FixedSampler {
        fn names(&self) -> Vec<(&'static str, &'static str)> {
            vec![("test_workers", "workers"), ("test_lag_median", "lag")]
        }

        fn sample(&self) -> Vec<RuntimeSample> {
            vec![
                RuntimeSample {
                    name: "test_workers",
                    value: SampleValue::Gauge(4.0),
                },
                RuntimeSample {
                    name: "test_lag_median",
                    value: SampleValue::Histogram(BucketCounts {
                        boundaries: vec![0.0, 10.0, 20.0, 30.0],
                        counts: vec![1, 1, 1, 1],
                    }),
                },
            ]
        }
    }

    fn registry() -> MetricsRegistry {
        MetricsRegistry::new(DurationLabels::HandlerAndStatus, Arc::new(FixedSampler)).unwrap()
    }

    #[test]
    fn request_updates_counters_and_histogram() {
        let metrics = registry();
        metrics.observe_request(&classify("/gh", 302), 302, 1.5);
        metrics.observe_request(&classify("/nope", 404), 404, 0.7);

        let text = metrics.render().unwrap();
        assert!(text.contains("http_requests_total 2"));
        assert!(text.contains("requests_by_response_status{status=\"302\"} 1"));
        assert!(text.contains("http_response_status_time_ms_count{handler=\"redirect\",status=\"302\"} 1"));
        assert!(text.contains("redirect_resolution_duration_count 2"));
        assert!(text.contains("api_request_duration_count 0"));
    }

    #[test]
    fn privileged_requests_feed_api_summary() {
        let metrics = registry();
        metrics.observe_request(&classify("/api/action/create", 200), 200, 3.0);
        let text = metrics.render().unwrap();
        assert!(text.contains("api_request_duration_count 1"));
        assert!(text.contains("handler=\"api_create_success\""));
    }

    #[test]
    fn handler_only_budget_drops_status_label() {
        let metrics = MetricsRegistry::new(DurationLabels::Handler, Arc::new(FixedSampler)).unwrap();
        metrics.observe_request(&classify("/gh", 302), 302, 1.0);
        let text = metrics.render().unwrap();
        assert!(text.contains("http_response_status_time_ms_count{handler=\"redirect\"} 1"));
    }

    #[test]
    fn runtime_gauges_use_reduced_values() {
        let metrics = registry();
        metrics.refresh_runtime();
        let text = metrics.render().unwrap();
        assert!(text.contains("test_workers 4"));
        assert!(text.contains("test_lag_median 10"));
    }

    #[test]
    fn in_flight_guard_restores_gauge() {
        let metrics = registry();
        {
            let _a = metrics.track_in_flight();
            let _b = metrics.track_in_flight();
            assert_eq!(metrics.active_requests(), 2);
        }
        assert_eq!(metrics.active_requests(), 0);
    }

    #[test]
    fn in_flight_guard_releases_on_panic() {
        let metrics = registry();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = metrics.track_in_flight();
            panic!("handler blew up");
        }));
        assert!(result.is_err());
        assert_eq!(metrics.active_requests(), 0);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let metrics = registry();
        let clash = IntCounter::new("http_requests_total", "again").unwrap();
        assert!(metrics.register(Box::new(clash)).is_err());
    }

    #[test]
    fn sampler_name_clash_fails_construction() {
        struct Clashing;
        impl RuntimeSampler for Clashing {
            fn names(&self) -> Vec<(&'static str, &'static str)> {
                vec![("http_active_requests", "clash")]
            }
            fn sample(&self) -> Vec<RuntimeSample> {
                Vec::new()
            }
        }
        assert!(MetricsRegistry::new(DurationLabels::Handler, Arc::new(Clashing)).is_err());
    }
}
