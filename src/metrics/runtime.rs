//! Host-runtime samples exposed as gauges.
//!
//! A sample is either a scalar or a bucketed distribution. Distributions are
//! turned into one number with [`median_bucket`] before they reach a gauge.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

// ─── Sample model ────────────────────────────────────────────────

/// Bucket upper boundaries with one count per boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketCounts {
    pub boundaries: Vec<f64>,
    pub counts: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    Counter(u64),
    Gauge(f64),
    Histogram(BucketCounts),
}

impl SampleValue {
    /// Scalar value to publish on a gauge.
    pub fn reduce(&self) -> f64 {
        match self {
            Self::Counter(v) => *v as f64,
            Self::Gauge(v) => *v,
            Self::Histogram(h) => median_bucket(&h.boundaries, &h.counts),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSample {
    pub name: &'static str,
    pub value: SampleValue,
}

/// Boundary of the first bucket whose running count reaches half of the
/// total (integer division). An empty distribution yields `0.0`.
pub fn median_bucket(boundaries: &[f64], counts: &[u64]) -> f64 {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let threshold = total / 2;
    let mut running = 0u64;
    for (boundary, count) in boundaries.iter().zip(counts) {
        running += count;
        if running >= threshold {
            return *boundary;
        }
    }
    boundaries.last().copied().unwrap_or(0.0)
}

// ─── Samplers ────────────────────────────────────────────────────

/// Source of runtime samples. `names` is fixed for the sampler's lifetime so
/// the registry can create one gauge per name at startup.
pub trait RuntimeSampler: Send + Sync {
    fn names(&self) -> Vec<(&'static str, &'static str)>;
    fn sample(&self) -> Vec<RuntimeSample>;
}

pub const TOKIO_WORKERS: &str = "tokio_workers";
pub const TOKIO_ALIVE_TASKS: &str = "tokio_alive_tasks";
pub const PROCESS_RESIDENT_MEMORY: &str = "process_resident_memory_bytes";
pub const SCHEDULER_LATENCY: &str = "tokio_scheduler_latency_median_us";

/// Interval the lag task asks to sleep for.
const LAG_SLEEP: Duration = Duration::from_millis(10);
/// Pause between lag measurements.
const LAG_PERIOD: Duration = Duration::from_millis(250);

/// Sleep overshoot range: 1 μs → 10 s, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 10_000_000;
const HIST_SIGFIG: u8 = 3;

/// Scheduler latency bucket boundaries (μs). The last bucket catches
/// everything above the previous boundary.
const LATENCY_BOUNDARIES: &[u64] = &[
    50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 25_000, 50_000, 100_000,
];

/// Samples the tokio runtime the caller runs on plus the process RSS.
///
/// A background task repeatedly sleeps for [`LAG_SLEEP`] and records
/// how late it woke up; that distribution is the scheduler latency sample.
pub struct TokioRuntimeSampler {
    wakeup_lag: Arc<Mutex<Histogram<u64>>>,
    /// Last RSS reading in bytes, 0 when unknown. Refreshed by the lag task.
    resident_bytes: Arc<AtomicU64>,
    lag_task: Option<JoinHandle<()>>,
}

impl TokioRuntimeSampler {
    /// Sampler without the background task; the latency sample stays empty.
    pub fn new() -> Result<Self, hdrhistogram::CreationError> {
        Ok(Self {
            wakeup_lag: Arc::new(Mutex::new(Histogram::new_with_bounds(
                HIST_LOW,
                HIST_HIGH,
                HIST_SIGFIG,
            )?)),
            resident_bytes: Arc::new(AtomicU64::new(0)),
            lag_task: None,
        })
    }

    /// Sampler with the scheduler lag task spawned on the current runtime.
    pub fn start() -> Result<Self, hdrhistogram::CreationError> {
        let mut sampler = Self::new()?;
        let lag = sampler.wakeup_lag.clone();
        let resident = sampler.resident_bytes.clone();
        sampler.lag_task = Some(tokio::spawn(async move {
            loop {
                if let Some(rss) = resident_memory_bytes().await {
                    resident.store(rss, Ordering::Relaxed);
                }
                let asked = Instant::now();
                tokio::time::sleep(LAG_SLEEP).await;
                let overshoot = asked.elapsed().saturating_sub(LAG_SLEEP);
                let us = (overshoot.as_micros() as u64).clamp(HIST_LOW, HIST_HIGH);
                let _ = lag.lock().record(us);
                tokio::time::sleep(LAG_PERIOD).await;
            }
        }));
        Ok(sampler)
    }

    fn latency_buckets(&self) -> BucketCounts {
        bucket_counts(&self.wakeup_lag.lock(), LATENCY_BOUNDARIES)
    }
}

impl Drop for TokioRuntimeSampler {
    fn drop(&mut self) {
        if let Some(task) = self.lag_task.take() {
            task.abort();
        }
    }
}

impl RuntimeSampler for TokioRuntimeSampler {
    fn names(&self) -> Vec<(&'static str, &'static str)> {
        vec![
            (TOKIO_WORKERS, "Worker threads of the tokio runtime"),
            (TOKIO_ALIVE_TASKS, "Tasks currently alive on the tokio runtime"),
            (PROCESS_RESIDENT_MEMORY, "Resident set size of the process in bytes"),
            (SCHEDULER_LATENCY, "Median wake-up lag of a sleeping task in microseconds"),
        ]
    }

    fn sample(&self) -> Vec<RuntimeSample> {
        let mut samples = Vec::with_capacity(4);

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let metrics = handle.metrics();
            samples.push(RuntimeSample {
                name: TOKIO_WORKERS,
                value: SampleValue::Gauge(metrics.num_workers() as f64),
            });
            samples.push(RuntimeSample {
                name: TOKIO_ALIVE_TASKS,
                value: SampleValue::Gauge(metrics.num_alive_tasks() as f64),
            });
        }

        match self.resident_bytes.load(Ordering::Relaxed) {
            0 => {}
            rss => samples.push(RuntimeSample {
                name: PROCESS_RESIDENT_MEMORY,
                value: SampleValue::Counter(rss),
            }),
        }

        samples.push(RuntimeSample {
            name: SCHEDULER_LATENCY,
            value: SampleValue::Histogram(self.latency_buckets()),
        });

        samples
    }
}

/// Folds an HdrHistogram into fixed buckets. Every boundary is reported,
/// empty ones included, plus an overflow bucket bounded by the max value.
fn bucket_counts(hist: &Histogram<u64>, bounds: &[u64]) -> BucketCounts {
    let mut counts = vec![0u64; bounds.len() + 1];

    for iv in hist.iter_recorded() {
        let val = iv.value_iterated_to();
        // binary_search gives us the first boundary >= val
        let idx = match bounds.binary_search(&val) {
            Ok(i) | Err(i) => i,
        };
        counts[idx.min(bounds.len())] += iv.count_at_value();
    }

    let overflow = hist.max().max(bounds.last().copied().unwrap_or(0));
    let boundaries = bounds
        .iter()
        .copied()
        .chain(std::iter::once(overflow))
        .map(|b| b as f64)
        .collect();

    BucketCounts { boundaries, counts }
}

#[cfg(target_os = "linux")]
async fn resident_memory_bytes() -> Option<u64> {
    let status = tokio::fs::read_to_string("/proc/self/status").await.ok()?;
    parse_vm_rss(&status)
}

#[cfg(not(target_os = "linux"))]
async fn resident_memory_bytes() -> Option<u64> {
    None
}

/// `VmRSS` from a `/proc/<pid>/status` dump, in bytes.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}
