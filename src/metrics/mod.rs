//! Prometheus instruments, latency summaries and runtime samples.

pub mod exposition;
pub mod registry;
pub mod runtime;
pub mod summary;

pub use registry::{DurationLabels, InFlightGuard, MetricsRegistry};
pub use runtime::{median_bucket, RuntimeSampler, TokioRuntimeSampler};
pub use summary::{LatencySummary, PercentileSet};
