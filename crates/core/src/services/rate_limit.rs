//! Failed-login rate limiting.
//!
//! Tracks failed admin credential attempts per client IP in a sliding window
//! and blocks an IP for one window once it reaches the threshold.
//!
//! The state is in-memory and per-process. Running several server processes
//! behind one address gives each its own counters.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::RwLock;

/// Rate limiter configuration.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Failures tolerated inside one window.
    pub threshold: u32,
    /// Window length, also the block duration.
    pub window: TimeDelta,
}

impl RateLimitConfig {
    /// Create a new rate limit config.
    #[must_use]
    pub fn new(threshold: u32, window_secs: u64) -> Self {
        Self {
            threshold,
            window: saturating_seconds(window_secs),
        }
    }
}

/// Seconds as a `TimeDelta`, capped at the largest representable span.
pub(crate) fn saturating_seconds(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(5, 900)
    }
}

/// Failure history for a single IP.
#[derive(Debug, Clone, Default)]
struct FailureHistory {
    /// Failure timestamps, oldest first.
    failures: VecDeque<DateTime<Utc>>,
    /// Block expiry, if currently blocked.
    blocked_until: Option<DateTime<Utc>>,
}

impl FailureHistory {
    fn prune(&mut self, now: DateTime<Utc>, window: TimeDelta) {
        while self
            .failures
            .front()
            .is_some_and(|&at| now - at > window)
        {
            self.failures.pop_front();
        }
    }

    fn is_idle(&self) -> bool {
        self.failures.is_empty() && self.blocked_until.is_none()
    }
}

/// Rate limit check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// The IP may attempt to authenticate.
    Allowed,
    /// The IP is blocked.
    Blocked {
        /// Seconds until the block lifts.
        retry_after: u64,
    },
}

impl RateLimitDecision {
    /// Whether this decision blocks the request.
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

fn seconds_until(now: DateTime<Utc>, until: DateTime<Utc>) -> u64 {
    let remaining = until.signed_duration_since(now);
    let secs = remaining.num_seconds() + i64::from(remaining.subsec_nanos() > 0);
    secs.max(1).unsigned_abs()
}

/// Per-IP failed-login limiter.
#[derive(Clone)]
pub struct LoginRateLimiter {
    config: RateLimitConfig,
    states: Arc<RwLock<HashMap<String, FailureHistory>>>,
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl LoginRateLimiter {
    /// Create a new rate limiter with the given configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            states: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Decide whether `ip` may attempt to authenticate at `now`.
    ///
    /// Expired blocks are cleared together with the failure history. Reaching
    /// the threshold starts a new block lasting one window.
    pub async fn check(&self, ip: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let mut states = self.states.write().await;

        let Some(state) = states.get_mut(ip) else {
            return RateLimitDecision::Allowed;
        };

        if let Some(until) = state.blocked_until {
            if now < until {
                return RateLimitDecision::Blocked {
                    retry_after: seconds_until(now, until),
                };
            }
            state.blocked_until = None;
            state.failures.clear();
        }

        state.prune(now, self.config.window);

        if state.failures.len() >= self.config.threshold as usize {
            let until = now
                .checked_add_signed(self.config.window)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            state.blocked_until = Some(until);
            tracing::warn!(ip = %ip, until = %until, "Blocking IP after repeated failed logins");
            return RateLimitDecision::Blocked {
                retry_after: seconds_until(now, until),
            };
        }

        if state.is_idle() {
            states.remove(ip);
        }

        RateLimitDecision::Allowed
    }

    /// Record one rejected credential from `ip`.
    pub async fn record_failure(&self, ip: &str, now: DateTime<Utc>) {
        let mut states = self.states.write().await;
        let state = states.entry(ip.to_string()).or_default();

        state.prune(now, self.config.window);
        state.failures.push_back(now);
        while state.failures.len() > self.config.threshold as usize {
            state.failures.pop_front();
        }

        tracing::debug!(ip = %ip, failures = state.failures.len(), "Recorded failed login");
    }

    /// Drop entries with no live failures and no active block.
    pub async fn sweep(&self, now: DateTime<Utc>) {
        let window = self.config.window;
        let mut states = self.states.write().await;

        states.retain(|_, state| {
            if state.blocked_until.is_some_and(|until| now >= until) {
                state.blocked_until = None;
                state.failures.clear();
            }
            state.prune(now, window);
            !state.is_idle()
        });
    }

    /// Get the number of tracked IPs.
    pub async fn tracked_ips(&self) -> usize {
        self.states.read().await.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    fn secs(n: i64) -> TimeDelta {
        TimeDelta::seconds(n)
    }

    #[tokio::test]
    async fn test_unknown_ip_is_allowed() {
        let limiter = LoginRateLimiter::default();
        assert_eq!(limiter.check("10.0.0.1", t0()).await, RateLimitDecision::Allowed);
        assert_eq!(limiter.tracked_ips().await, 0);
    }

    #[tokio::test]
    async fn test_blocks_after_threshold() {
        let limiter = LoginRateLimiter::new(RateLimitConfig::new(5, 900));

        for i in 0..5 {
            assert_eq!(
                limiter.check("10.0.0.1", t0() + secs(i)).await,
                RateLimitDecision::Allowed
            );
            limiter.record_failure("10.0.0.1", t0() + secs(i)).await;
        }

        match limiter.check("10.0.0.1", t0() + secs(5)).await {
            RateLimitDecision::Blocked { retry_after } => assert_eq!(retry_after, 900),
            RateLimitDecision::Allowed => panic!("Expected Blocked"),
        }

        // Still blocked later in the window
        assert!(limiter.check("10.0.0.1", t0() + secs(600)).await.is_blocked());
    }

    #[tokio::test]
    async fn test_block_expires_and_history_resets() {
        let limiter = LoginRateLimiter::new(RateLimitConfig::new(5, 900));
        for _ in 0..5 {
            limiter.record_failure("10.0.0.1", t0()).await;
        }
        assert!(limiter.check("10.0.0.1", t0()).await.is_blocked());

        let after = t0() + secs(901);
        assert_eq!(limiter.check("10.0.0.1", after).await, RateLimitDecision::Allowed);
        assert_eq!(limiter.tracked_ips().await, 0);

        // One new failure is far from the threshold again
        limiter.record_failure("10.0.0.1", after).await;
        assert_eq!(limiter.check("10.0.0.1", after).await, RateLimitDecision::Allowed);
    }

    #[tokio::test]
    async fn test_old_failures_slide_out_of_window() {
        let limiter = LoginRateLimiter::new(RateLimitConfig::new(3, 60));
        limiter.record_failure("ip", t0()).await;
        limiter.record_failure("ip", t0() + secs(10)).await;
        limiter.record_failure("ip", t0() + secs(70)).await;

        // Only the most recent failure is still inside the window
        assert_eq!(limiter.check("ip", t0() + secs(71)).await, RateLimitDecision::Allowed);
    }

    #[tokio::test]
    async fn test_separate_ips() {
        let limiter = LoginRateLimiter::new(RateLimitConfig::new(2, 60));
        limiter.record_failure("a", t0()).await;
        limiter.record_failure("a", t0()).await;

        assert!(limiter.check("a", t0()).await.is_blocked());
        assert_eq!(limiter.check("b", t0()).await, RateLimitDecision::Allowed);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let limiter = LoginRateLimiter::new(RateLimitConfig::new(3, 60));
        for _ in 0..50 {
            limiter.record_failure("ip", t0()).await;
        }
        let states = limiter.states.read().await;
        assert_eq!(states["ip"].failures.len(), 3);
    }

    #[tokio::test]
    async fn test_huge_window_blocks_without_overflow() {
        let limiter = LoginRateLimiter::new(RateLimitConfig::new(1, u64::MAX));
        assert_eq!(limiter.config.window, TimeDelta::MAX);

        limiter.record_failure("ip", t0()).await;
        match limiter.check("ip", t0()).await {
            RateLimitDecision::Blocked { retry_after } => assert!(retry_after > 0),
            RateLimitDecision::Allowed => panic!("Expected Blocked"),
        }
        assert!(limiter.check("ip", t0() + secs(1)).await.is_blocked());

        let near_limit = LoginRateLimiter::new(RateLimitConfig::new(1, 9_000_000_000_000_000));
        near_limit.record_failure("ip", t0()).await;
        assert!(near_limit.check("ip", t0()).await.is_blocked());
    }

    #[test]
    fn test_saturating_seconds() {
        assert_eq!(saturating_seconds(900), TimeDelta::seconds(900));
        assert_eq!(saturating_seconds(u64::MAX), TimeDelta::MAX);
        assert_eq!(saturating_seconds(100_000_000_000_000_000), TimeDelta::MAX);
    }

    #[tokio::test]
    async fn test_sweep_drops_stale_entries() {
        let limiter = LoginRateLimiter::new(RateLimitConfig::new(5, 60));
        limiter.record_failure("stale", t0()).await;
        limiter.record_failure("fresh", t0() + secs(100)).await;
        assert_eq!(limiter.tracked_ips().await, 2);

        limiter.sweep(t0() + secs(120)).await;
        assert_eq!(limiter.tracked_ips().await, 1);
    }
}
