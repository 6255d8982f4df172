use std::sync::Arc;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto::{Metric, MetricFamily, MetricType, Quantile, Summary};

/// Quantiles every latency summary reports.
pub const QUANTILES: [f64; 3] = [0.5, 0.9, 0.99];

/// HdrHistogram range: 1 μs → 60 s, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

/// Quantile breakdown of one summary, in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct PercentileSet {
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub count: u64,
    pub sum: f64,
}

impl PercentileSet {
    /// Zeroed values if the histogram is empty.
    fn from_histogram(hist: &Histogram<u64>, sum: f64) -> Self {
        if hist.len() == 0 {
            return Self {
                p50: 0.0,
                p90: 0.0,
                p99: 0.0,
                count: 0,
                sum: 0.0,
            };
        }
        let ms = |q: f64| hist.value_at_quantile(q) as f64 / 1000.0;
        Self {
            p50: ms(0.5),
            p90: ms(0.9),
            p99: ms(0.99),
            count: hist.len(),
            sum,
        }
    }

    fn values(&self) -> [f64; 3] {
        [self.p50, self.p90, self.p99]
    }
}

struct Inner {
    hist: Histogram<u64>,
    sum_ms: f64,
}

/// Prometheus summary backed by an HdrHistogram.
///
/// Observations are in milliseconds and kept at microsecond resolution.
/// Quantiles are computed over everything observed since start. Clones
/// share state, so one clone can be registered while another observes.
#[derive(Clone)]
pub struct LatencySummary {
    desc: Desc,
    inner: Arc<Mutex<Inner>>,
}

impl LatencySummary {
    pub fn new(name: &str, help: &str) -> prometheus::Result<Self> {
        let desc = Desc::new(name.to_string(), help.to_string(), vec![], Default::default())?;
        let hist = Histogram::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
            .map_err(|e| prometheus::Error::Msg(format!("summary histogram: {e}")))?;
        Ok(Self {
            desc,
            inner: Arc::new(Mutex::new(Inner { hist, sum_ms: 0.0 })),
        })
    }

    pub fn observe(&self, ms: f64) {
        let us = ((ms.max(0.0) * 1000.0) as u64).clamp(HIST_LOW, HIST_HIGH);
        let mut inner = self.inner.lock();
        let _ = inner.hist.record(us);
        inner.sum_ms += ms.max(0.0);
    }

    pub fn percentiles(&self) -> PercentileSet {
        let inner = self.inner.lock();
        PercentileSet::from_histogram(&inner.hist, inner.sum_ms)
    }
}

impl Collector for LatencySummary {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let set = self.percentiles();

        let mut summary = Summary::default();
        summary.set_sample_count(set.count);
        summary.set_sample_sum(set.sum);
        for (q, v) in QUANTILES.iter().zip(set.values()) {
            let mut quantile = Quantile::default();
            quantile.set_quantile(*q);
            quantile.set_value(v);
            summary.mut_quantile().push(quantile);
        }

        let mut metric = Metric::default();
        metric.set_summary(summary);

        let mut family = MetricFamily::default();
        family.set_name(self.desc.fq_name.clone());
        family.set_help(self.desc.help.clone());
        family.set_field_type(MetricType::SUMMARY);
        family.mut_metric().push(metric);
        vec![family]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, Registry, TextEncoder};

    #[test]
    fn empty_summary_reports_zeroes() {
        let s = LatencySummary::new("test_duration", "test").unwrap();
        let p = s.percentiles();
        assert_eq!(p.count, 0);
        assert_eq!(p.p99, 0.0);
    }

    #[test]
    fn quantiles_track_observations() {
        let s = LatencySummary::new("test_duration", "test").unwrap();
        for ms in 1..=100 {
            s.observe(ms as f64);
        }
        let p = s.percentiles();
        assert_eq!(p.count, 100);
        assert!((p.p50 - 50.0).abs() < 1.0);
        assert!((p.p99 - 99.0).abs() < 1.0);
        assert!((p.sum - 5050.0).abs() < 1e-6);
    }

    #[test]
    fn summary_renders_in_text_format() {
        let registry = Registry::new();
        let s = LatencySummary::new("api_request_duration", "Duration of API requests").unwrap();
        registry.register(Box::new(s.clone())).unwrap();
        s.observe(4.0);

        let mut buf = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("# TYPE api_request_duration summary"));
        assert!(text.contains("api_request_duration{quantile=\"0.5\"}"));
        assert!(text.contains("api_request_duration_count 1"));
    }
}
