use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use prometheus::IntCounter;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{AnalyticsEvent, AnalyticsSink, Recorder};

/// Prometheus counters the pipeline increments. The registry owns the
/// registered instances and hands clones in here.
#[derive(Clone)]
pub struct AnalyticsCounters {
    pub dropped: IntCounter,
    pub persisted: IntCounter,
    pub sink_failures: IntCounter,
}

impl AnalyticsCounters {
    /// Counters not attached to any registry.
    pub fn detached() -> prometheus::Result<Self> {
        Ok(Self {
            dropped: IntCounter::new("analytics_events_dropped_total", "dropped")?,
            persisted: IntCounter::new("analytics_events_persisted_total", "persisted")?,
            sink_failures: IntCounter::new("analytics_sink_failures_total", "failures")?,
        })
    }
}

/// Point-in-time view of what happened to recorded events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub recorded: u64,
    pub dropped: u64,
    pub persisted: u64,
    pub sink_failures: u64,
}

impl PipelineStats {
    /// Events accepted into the queue that have not reached the sink yet.
    pub fn in_flight(&self) -> u64 {
        self.recorded
            .saturating_sub(self.dropped + self.persisted + self.sink_failures)
    }
}

struct Worker {
    handle: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

/// Bounded queue in front of a single sink consumer.
///
/// `record` is a `try_send`: a full or closed queue drops the event and
/// bumps `dropped`, so request latency never depends on the sink.
pub struct AnalyticsPipeline {
    tx: mpsc::Sender<AnalyticsEvent>,
    recorded: AtomicU64,
    counters: AnalyticsCounters,
    worker: Mutex<Option<Worker>>,
}

impl AnalyticsPipeline {
    /// Spawns the consumer on the current tokio runtime.
    pub fn start(
        sink: Arc<dyn AnalyticsSink>,
        capacity: usize,
        counters: AnalyticsCounters,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(consume(rx, sink, counters.clone(), shutdown_rx));

        Self {
            tx,
            recorded: AtomicU64::new(0),
            counters,
            worker: Mutex::new(Some(Worker {
                handle,
                shutdown: shutdown_tx,
            })),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            recorded: self.recorded.load(Ordering::Relaxed),
            dropped: self.counters.dropped.get(),
            persisted: self.counters.persisted.get(),
            sink_failures: self.counters.sink_failures.get(),
        }
    }

    /// Stops accepting events and drains the queue for at most `grace`.
    /// Whatever is still queued afterwards is lost.
    pub async fn shutdown(&self, grace: Duration) -> PipelineStats {
        let Some(worker) = self.worker.lock().take() else {
            return self.stats();
        };
        let _ = worker.shutdown.send(());

        let mut handle = worker.handle;
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(_) => {}
            Err(_) => {
                handle.abort();
                let stats = self.stats();
                tracing::warn!(
                    lost = stats.in_flight(),
                    grace_ms = grace.as_millis() as u64,
                    "analytics drain timed out, discarding queued events"
                );
            }
        }

        let stats = self.stats();
        tracing::info!(
            recorded = stats.recorded,
            persisted = stats.persisted,
            dropped = stats.dropped,
            sink_failures = stats.sink_failures,
            "analytics pipeline stopped"
        );
        stats
    }
}

impl Recorder for AnalyticsPipeline {
    fn record(&self, event: AnalyticsEvent) {
        self.recorded.fetch_add(1, Ordering::Relaxed);
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.counters.dropped.inc();
                tracing::debug!(path = %event.path, "analytics queue full, event dropped");
            }
            Err(TrySendError::Closed(event)) => {
                self.counters.dropped.inc();
                tracing::debug!(path = %event.path, "analytics queue closed, event dropped");
            }
        }
    }
}

// ─── Consumer ────────────────────────────────────────────────────

async fn consume(
    mut rx: mpsc::Receiver<AnalyticsEvent>,
    sink: Arc<dyn AnalyticsSink>,
    counters: AnalyticsCounters,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            // Fires on an explicit shutdown or when the pipeline is dropped.
            _ = &mut shutdown => break,
            event = rx.recv() => match event {
                Some(event) => persist(sink.as_ref(), &counters, event).await,
                None => return,
            },
        }
    }

    rx.close();
    while let Some(event) = rx.recv().await {
        persist(sink.as_ref(), &counters, event).await;
    }
}

async fn persist(sink: &dyn AnalyticsSink, counters: &AnalyticsCounters, event: AnalyticsEvent) {
    match sink.insert(&event).await {
        Ok(()) => counters.persisted.inc(),
        Err(e) => {
            counters.sink_failures.inc();
            tracing::warn!(path = %event.path, error = %e, "analytics insert failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{ClientContext, SinkError};
    use async_trait::async_trait;
    use std::time::Instant;

    struct CollectSink {
        events: Mutex<Vec<AnalyticsEvent>>,
        delay: Duration,
    }

    impl CollectSink {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
                delay,
            })
        }
    }

    #[async_trait]
    impl AnalyticsSink for CollectSink {
        async fn insert(&self, event: &AnalyticsEvent) -> Result<(), SinkError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.events.lock().push(event.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl AnalyticsSink for FailingSink {
        async fn insert(&self, _event: &AnalyticsEvent) -> Result<(), SinkError> {
            Err(SinkError::Other("table missing".into()))
        }
    }

    fn event(path: &str) -> AnalyticsEvent {
        AnalyticsEvent::new(path, 302, 1, "redirect", ClientContext::default())
    }

    #[tokio::test]
    async fn events_reach_sink_in_fifo_order() {
        let sink = CollectSink::new(Duration::ZERO);
        let pipeline = AnalyticsPipeline::start(
            sink.clone(),
            16,
            AnalyticsCounters::detached().unwrap(),
        );

        for i in 0..5 {
            pipeline.record(event(&format!("/p{i}")));
        }
        let stats = pipeline.shutdown(Duration::from_secs(5)).await;

        assert_eq!(stats.persisted, 5);
        assert_eq!(stats.dropped, 0);
        let paths: Vec<_> = sink.events.lock().iter().map(|e| e.path.clone()).collect();
        assert_eq!(paths, vec!["/p0", "/p1", "/p2", "/p3", "/p4"]);
    }

    #[tokio::test]
    async fn saturated_queue_drops_instead_of_blocking() {
        let sink = CollectSink::new(Duration::from_millis(20));
        let pipeline = AnalyticsPipeline::start(
            sink.clone(),
            4,
            AnalyticsCounters::detached().unwrap(),
        );

        let calls = 200;
        for i in 0..calls {
            let started = Instant::now();
            pipeline.record(event(&format!("/burst{i}")));
            assert!(started.elapsed() < Duration::from_millis(10));
        }

        let stats = pipeline.shutdown(Duration::from_secs(10)).await;
        assert_eq!(stats.recorded, calls);
        assert!(stats.dropped > 0);
        assert_eq!(stats.persisted + stats.dropped, calls);
        assert_eq!(sink.events.lock().len() as u64, stats.persisted);
    }

    #[tokio::test]
    async fn sink_failures_are_counted_and_not_retried() {
        let pipeline = AnalyticsPipeline::start(
            Arc::new(FailingSink),
            8,
            AnalyticsCounters::detached().unwrap(),
        );
        pipeline.record(event("/a"));
        pipeline.record(event("/b"));
        let stats = pipeline.shutdown(Duration::from_secs(5)).await;

        assert_eq!(stats.sink_failures, 2);
        assert_eq!(stats.persisted, 0);
        assert_eq!(stats.in_flight(), 0);
    }

    #[tokio::test]
    async fn records_after_shutdown_are_dropped() {
        let sink = CollectSink::new(Duration::ZERO);
        let pipeline = AnalyticsPipeline::start(
            sink.clone(),
            8,
            AnalyticsCounters::detached().unwrap(),
        );
        pipeline.shutdown(Duration::from_secs(1)).await;

        pipeline.record(event("/late"));
        let stats = pipeline.stats();
        assert_eq!(stats.dropped, 1);
        assert!(sink.events.lock().is_empty());
    }

    #[tokio::test]
    async fn drain_gives_up_after_grace_period() {
        let sink = CollectSink::new(Duration::from_millis(200));
        let pipeline = AnalyticsPipeline::start(
            sink.clone(),
            32,
            AnalyticsCounters::detached().unwrap(),
        );
        for i in 0..10 {
            pipeline.record(event(&format!("/slow{i}")));
        }

        let stats = pipeline.shutdown(Duration::from_millis(300)).await;
        assert!(stats.persisted < 10);
        assert!(stats.in_flight() > 0);
    }
}
