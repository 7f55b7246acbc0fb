//! Per-identifier fixed-window rate limiting for photo downloads.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use photoflow_core::clock::Clock;

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window (0 when denied).
    pub remaining_requests: u32,
    /// Epoch milliseconds at which the current window resets.
    pub reset_at: i64,
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    started_at: i64,
    count: u32,
}

/// Fixed-window counter keyed by client identifier (user id or IP).
///
/// Windows are not sliding: the first request after expiry starts a fresh
/// window with a full allowance.
pub struct RateLimiter {
    windows: DashMap<String, WindowState>,
    window_ms: i64,
    max_requests: u32,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("window_ms", &self.window_ms)
            .field("max_requests", &self.max_requests)
            .field("tracked", &self.windows.len())
            .finish()
    }
}

impl RateLimiter {
    pub fn new(window_ms: i64, max_requests: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            window_ms,
            max_requests,
            clock,
        }
    }

    /// Record one request for the identifier and decide whether to allow it.
    pub fn check(&self, identifier: &str) -> RateLimitDecision {
        let now = self.clock.now_millis();
        let mut entry = self
            .windows
            .entry(identifier.to_string())
            .or_insert(WindowState {
                started_at: now,
                count: 0,
            });

        if now - entry.started_at >= self.window_ms {
            entry.started_at = now;
            entry.count = 0;
        }

        let reset_at = entry.started_at + self.window_ms;
        if entry.count >= self.max_requests {
            debug!(identifier, "Rate limit exceeded");
            return RateLimitDecision {
                allowed: false,
                remaining_requests: 0,
                reset_at,
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining_requests: self.max_requests - entry.count,
            reset_at,
        }
    }

    /// Drop expired window entries. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.windows.len();
        self.windows
            .retain(|_, state| now - state.started_at < self.window_ms);
        before - self.windows.len()
    }

    /// Number of identifiers currently tracked.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

/// Background task that periodically sweeps expired rate limit windows.
pub struct SweepTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SweepTask {
    pub fn spawn(limiter: Arc<RateLimiter>, interval: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.sweep();
                        if removed > 0 {
                            debug!(removed, "Swept expired rate limit windows");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Rate limit sweep task stopping");
                            break;
                        }
                    }
                }
            }
        });
        Self { shutdown, handle }
    }

    /// Stop the sweep loop and wait for it to finish.
    pub async fn destroy(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use photoflow_core::clock::ManualClock;

    fn limiter(clock: Arc<ManualClock>) -> RateLimiter {
        RateLimiter::new(900_000, 100, clock)
    }

    #[test]
    fn allows_up_to_the_limit_then_denies() {
        let clock = ManualClock::starting_at(1_700_000_000_000);
        let limiter = limiter(clock);

        for i in 0..100 {
            let decision = limiter.check("user-1");
            assert!(decision.allowed, "request {} should be allowed", i + 1);
            assert_eq!(decision.remaining_requests, 99 - i);
        }

        let denied = limiter.check("user-1");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining_requests, 0);
        assert_eq!(denied.reset_at, 1_700_000_000_000 + 900_000);
    }

    #[test]
    fn identifiers_are_counted_independently() {
        let clock = ManualClock::starting_at(0);
        let limiter = limiter(clock);

        for _ in 0..100 {
            limiter.check("user-1");
        }
        assert!(!limiter.check("user-1").allowed);
        assert!(limiter.check("user-2").allowed);
    }

    #[test]
    fn a_new_window_starts_after_expiry() {
        let clock = ManualClock::starting_at(1_700_000_000_000);
        let limiter = limiter(clock.clone());

        for _ in 0..100 {
            limiter.check("user-1");
        }
        assert!(!limiter.check("user-1").allowed);

        clock.advance_millis(900_000);
        let decision = limiter.check("user-1");
        assert!(decision.allowed);
        assert_eq!(decision.remaining_requests, 99);
    }

    #[test]
    fn sweep_drops_only_expired_windows() {
        let clock = ManualClock::starting_at(0);
        let limiter = limiter(clock.clone());

        limiter.check("old");
        clock.advance_millis(900_000);
        limiter.check("fresh");

        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_task_stops_on_destroy() {
        let clock = ManualClock::starting_at(0);
        let limiter = Arc::new(RateLimiter::new(1_000, 10, clock));
        let task = SweepTask::spawn(limiter, Duration::from_secs(300));
        task.destroy().await;
    }
}
