//! Per-client fixed-window admission control.
//!
//! Each client key owns a window start and a counter. When the window has
//! elapsed the counter resets; a request is admitted while the counter stays
//! at or below the limit. A burst straddling a boundary can therefore see up
//! to twice the limit.
//!
//! Windows live in a `DashMap`, so only the shard holding a key is locked
//! while its window is stepped.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Tracked keys at which stale windows are swept before inserting a new one.
const SWEEP_THRESHOLD: usize = 65_536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub window_start: Instant,
    pub count: u32,
}

impl RateLimitWindow {
    fn step(&mut self, now: Instant, limit: u32, window: Duration) -> bool {
        if now.saturating_duration_since(self.window_start) >= window {
            self.window_start = now;
            self.count = 0;
        }
        self.count = self.count.saturating_add(1);
        self.count <= limit
    }
}

pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: DashMap<String, RateLimitWindow>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: DashMap::new(),
        }
    }

    pub fn admit(&self, client_key: &str) -> bool {
        self.admit_at(client_key, Instant::now())
    }

    /// `admit` against an explicit clock reading.
    pub fn admit_at(&self, client_key: &str, now: Instant) -> bool {
        if let Some(mut w) = self.windows.get_mut(client_key) {
            return w.step(now, self.limit, self.window);
        }

        if self.windows.len() >= SWEEP_THRESHOLD {
            self.sweep(now);
        }
        self.windows
            .entry(client_key.to_owned())
            .or_insert_with(|| RateLimitWindow {
                window_start: now,
                count: 0,
            })
            .step(now, self.limit, self.window)
    }

    /// Tracked client keys.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    fn sweep(&self, now: Instant) {
        let window = self.window;
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.window_start) < window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn request_past_limit_is_rejected_within_window() {
        let limiter = RateLimiter::new(10, Duration::from_secs(1));
        let now = Instant::now();
        let admitted = (0..15).filter(|_| limiter.admit_at("10.0.0.1", now)).count();
        assert_eq!(admitted, 10);
    }

    #[test]
    fn window_resets_after_elapsing() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));
        let t0 = Instant::now();
        assert!(limiter.admit_at("k", t0));
        assert!(limiter.admit_at("k", t0));
        assert!(!limiter.admit_at("k", t0 + Duration::from_millis(999)));
        assert!(limiter.admit_at("k", t0 + Duration::from_secs(1)));
    }

    #[test]
    fn boundary_burst_can_reach_twice_the_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));
        let t0 = Instant::now();
        let edge = t0 + Duration::from_secs(1);

        assert!(limiter.admit_at("k", t0));
        let late = (0..2)
            .filter(|_| limiter.admit_at("k", t0 + Duration::from_millis(999)))
            .count();
        let early = (0..3).filter(|_| limiter.admit_at("k", edge)).count();

        // five admissions within two milliseconds of each other
        assert_eq!(late + early, 5);
        assert!(!limiter.admit_at("k", edge));
    }

    #[test]
    fn clients_are_limited_independently() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.admit_at("a", now));
        assert!(!limiter.admit_at("a", now));
        assert!(limiter.admit_at("b", now));
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn concurrent_admissions_never_exceed_limit() {
        let limiter = Arc::new(RateLimiter::new(50, Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || (0..100).filter(|_| limiter.admit("shared")).count())
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }

    #[test]
    fn stale_windows_are_swept_once_map_is_full() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));
        let t0 = Instant::now();
        for i in 0..SWEEP_THRESHOLD {
            limiter.admit_at(&format!("client-{i}"), t0);
        }
        assert_eq!(limiter.tracked_keys(), SWEEP_THRESHOLD);

        let later = t0 + Duration::from_secs(1);
        assert!(limiter.admit_at("late", later));
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn sweep_keeps_live_windows() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        for i in 0..SWEEP_THRESHOLD {
            limiter.admit_at(&format!("client-{i}"), t0);
        }
        limiter.admit_at("late", t0 + Duration::from_secs(1));
        assert_eq!(limiter.tracked_keys(), SWEEP_THRESHOLD + 1);
        assert!(!limiter.admit_at("client-0", t0 + Duration::from_secs(2)));
    }
}
