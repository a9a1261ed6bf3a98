//! Per-IP rate limiting for authentication failures.
//!
//! # Purpose
//! Before a credential verifies, the caller's identity is by definition
//! untrusted, so the client IP is the only usable key. Failures are counted
//! in a sliding window; crossing the threshold puts the IP into a cooldown
//! during which requests are refused before any validation work happens.
//!
//! # Concurrency
//! State lives in a sharded concurrent map: reads (`is_rate_limited`) do not
//! block each other, and `record_failure` gets exclusive per-key access, so
//! the transition-to-rate-limited boolean it returns is an authoritative
//! ordering witness under concurrent failures for the same IP.
//!
//! # Eviction
//! A background reaper wakes every window and drops entries whose window is
//! stale twice over and whose cooldown has lapsed, bounding memory under
//! address churn. `close()` stops the reaper.
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Failures within the window before the cooldown trips.
    pub failure_threshold: u32,
    /// Sliding window over which failures are counted.
    pub window: Duration,
    /// How long a tripped IP stays refused.
    pub cooldown: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct IpState {
    failure_count: u32,
    window_start: Instant,
    cooldown_until: Option<Instant>,
}

pub struct FailureRateLimiter {
    config: RateLimitConfig,
    state: DashMap<String, IpState>,
    shutdown: watch::Sender<bool>,
}

impl FailureRateLimiter {
    /// Create the limiter and start its background reaper.
    pub fn new(config: RateLimitConfig) -> Arc<Self> {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let limiter = Arc::new(Self {
            config,
            state: DashMap::new(),
            shutdown,
        });
        limiter.spawn_reaper(shutdown_rx);
        limiter
    }

    /// True iff the IP is inside an active cooldown.
    pub fn is_rate_limited(&self, ip: &str) -> bool {
        match self.state.get(ip) {
            Some(entry) => match entry.cooldown_until {
                Some(until) => Instant::now() < until,
                None => false,
            },
            None => false,
        }
    }

    /// Record one authentication failure for `ip`. Returns true exactly on
    /// the transition into the rate-limited state.
    pub fn record_failure(&self, ip: &str) -> bool {
        let now = Instant::now();
        let mut entry = self.state.entry(ip.to_string()).or_insert(IpState {
            failure_count: 0,
            window_start: now,
            cooldown_until: None,
        });

        // A lapsed cooldown resets the record entirely.
        if let Some(until) = entry.cooldown_until {
            if now >= until {
                entry.failure_count = 0;
                entry.window_start = now;
                entry.cooldown_until = None;
            }
        }

        // A lapsed window restarts the count.
        if now.duration_since(entry.window_start) > self.config.window {
            entry.failure_count = 0;
            entry.window_start = now;
        }

        entry.failure_count += 1;
        if entry.failure_count >= self.config.failure_threshold {
            entry.cooldown_until = Some(now + self.config.cooldown);
            return true;
        }
        false
    }

    /// Clear all state for an IP unconditionally.
    pub fn reset(&self, ip: &str) {
        self.state.remove(ip);
    }

    pub fn failure_count(&self, ip: &str) -> u32 {
        self.state.get(ip).map(|s| s.failure_count).unwrap_or(0)
    }

    /// Stop the background reaper.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }

    fn spawn_reaper(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let limiter = Arc::clone(self);
        let window = limiter.config.window;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(window);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => return,
                    _ = ticker.tick() => {
                        let now = Instant::now();
                        limiter.state.retain(|_, state| {
                            let stale = now.duration_since(state.window_start) > window * 2;
                            let cooled_down = match state.cooldown_until {
                                Some(until) => now >= until,
                                None => true,
                            };
                            !(stale && cooled_down)
                        });
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(threshold: u32, window: Duration, cooldown: Duration) -> Arc<FailureRateLimiter> {
        FailureRateLimiter::new(RateLimitConfig {
            failure_threshold: threshold,
            window,
            cooldown,
        })
    }

    #[tokio::test]
    async fn unknown_ip_is_not_limited() {
        let limiter = limiter(3, Duration::from_secs(60), Duration::from_secs(300));
        assert!(!limiter.is_rate_limited("10.0.0.1"));
        assert_eq!(limiter.failure_count("10.0.0.1"), 0);
    }

    #[tokio::test]
    async fn threshold_transition_returns_true_exactly_once() {
        let limiter = limiter(3, Duration::from_secs(60), Duration::from_secs(300));
        assert!(!limiter.record_failure("10.0.0.1"));
        assert!(!limiter.record_failure("10.0.0.1"));
        assert!(limiter.record_failure("10.0.0.1"));
        assert!(limiter.is_rate_limited("10.0.0.1"));
        assert_eq!(limiter.failure_count("10.0.0.1"), 3);
    }

    #[tokio::test]
    async fn ips_are_tracked_independently() {
        let limiter = limiter(2, Duration::from_secs(60), Duration::from_secs(300));
        limiter.record_failure("10.0.0.1");
        limiter.record_failure("10.0.0.2");
        assert!(!limiter.is_rate_limited("10.0.0.1"));
        assert!(!limiter.is_rate_limited("10.0.0.2"));
        limiter.record_failure("10.0.0.1");
        assert!(limiter.is_rate_limited("10.0.0.1"));
        assert!(!limiter.is_rate_limited("10.0.0.2"));
    }

    #[tokio::test]
    async fn window_expiry_resets_the_count() {
        let limiter = limiter(3, Duration::from_millis(30), Duration::from_secs(300));
        limiter.record_failure("10.0.0.1");
        limiter.record_failure("10.0.0.1");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!limiter.record_failure("10.0.0.1"));
        assert_eq!(limiter.failure_count("10.0.0.1"), 1);
    }

    #[tokio::test]
    async fn cooldown_expires_and_state_resets() {
        let limiter = limiter(2, Duration::from_secs(60), Duration::from_millis(30));
        limiter.record_failure("10.0.0.1");
        assert!(limiter.record_failure("10.0.0.1"));
        assert!(limiter.is_rate_limited("10.0.0.1"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!limiter.is_rate_limited("10.0.0.1"));
        // The next failure starts a fresh count, not a continuation.
        assert!(!limiter.record_failure("10.0.0.1"));
        assert_eq!(limiter.failure_count("10.0.0.1"), 1);
    }

    #[tokio::test]
    async fn reset_clears_state_unconditionally() {
        let limiter = limiter(2, Duration::from_secs(60), Duration::from_secs(300));
        limiter.record_failure("10.0.0.1");
        limiter.record_failure("10.0.0.1");
        assert!(limiter.is_rate_limited("10.0.0.1"));
        limiter.reset("10.0.0.1");
        assert!(!limiter.is_rate_limited("10.0.0.1"));
        assert_eq!(limiter.failure_count("10.0.0.1"), 0);
    }

    #[tokio::test]
    async fn reaper_evicts_stale_entries() {
        let limiter = limiter(10, Duration::from_millis(20), Duration::from_millis(10));
        limiter.record_failure("10.0.0.1");
        assert_eq!(limiter.failure_count("10.0.0.1"), 1);

        // Past 2x window with no active cooldown the entry is reaped.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(limiter.failure_count("10.0.0.1"), 0);
        limiter.close();
    }

    #[tokio::test]
    async fn concurrent_failures_serialize_per_ip() {
        let limiter = limiter(32, Duration::from_secs(60), Duration::from_secs(300));
        let mut handles = Vec::new();
        for _ in 0..64 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.record_failure("10.0.0.1")
            }));
        }
        let mut limited = 0;
        for handle in handles {
            if handle.await.unwrap() {
                limited += 1;
            }
        }
        // Each call increments by exactly one under the per-key lock, so the
        // counts 1..=64 are each observed once and every count at or above
        // the threshold reports rate-limited.
        assert_eq!(limited, 33);
        assert_eq!(limiter.failure_count("10.0.0.1"), 64);
        assert!(limiter.is_rate_limited("10.0.0.1"));
    }
}
