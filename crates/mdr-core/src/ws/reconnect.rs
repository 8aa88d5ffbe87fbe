//! Bounded reconnect policy.
//!
//! Two curves are used in the relay:
//!
//! - **Exponential** (upstream feeds): the retry scheduled while `attempts`
//!   reconnects have already been made waits `base * 2^attempts`.
//! - **Linear** (room client): the n-th retry (1-based) waits `base * n`.
//!
//! Both stop after `max_attempts` retries; what happens next (polling
//! fallback, giving up) is the caller's decision.

use std::time::Duration;

/// Shape of the delay curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffCurve {
    Exponential,
    Linear,
}

/// Outcome of consulting the policy after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Wait this long, then retry.
    Retry(Duration),
    /// Retries are used up.
    Exhausted,
}

/// Reconnect policy: attempt ceiling + delay curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub curve: BackoffCurve,
}

impl ReconnectPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

    /// Exponential policy used by upstream feed links.
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts, base_delay, curve: BackoffCurve::Exponential }
    }

    /// Linear policy used by the room client.
    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts, base_delay, curve: BackoffCurve::Linear }
    }

    /// Decide what to do after a failure, given the number of reconnect
    /// attempts already made since the last successful open.
    pub fn next(&self, attempts: u32) -> Backoff {
        if attempts >= self.max_attempts {
            Backoff::Exhausted
        } else {
            Backoff::Retry(self.delay_for(attempts))
        }
    }

    /// Delay for the retry scheduled when `attempts` retries were already made.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let ms = match self.curve {
            BackoffCurve::Exponential => {
                base_ms.saturating_mul(1u64.checked_shl(attempts).unwrap_or(u64::MAX))
            }
            BackoffCurve::Linear => base_ms.saturating_mul(u64::from(attempts) + 1),
        };
        Duration::from_millis(ms)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::exponential(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_BASE_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_nth_retry_doubles() {
        let p = ReconnectPolicy::default();
        // n-th consecutive failure (1-based) sees n-1 prior attempts.
        for n in 1..p.max_attempts {
            let expected = Duration::from_millis(1000 * 2u64.pow(n - 1));
            assert_eq!(p.next(n - 1), Backoff::Retry(expected), "failure #{n}");
        }
    }

    #[test]
    fn exhausted_at_ceiling() {
        let p = ReconnectPolicy::default();
        assert_eq!(p.next(4), Backoff::Retry(Duration::from_millis(16_000)));
        assert_eq!(p.next(5), Backoff::Exhausted);
        assert_eq!(p.next(6), Backoff::Exhausted);
    }

    #[test]
    fn linear_grows_by_base() {
        let p = ReconnectPolicy::linear(5, Duration::from_millis(1000));
        assert_eq!(p.next(0), Backoff::Retry(Duration::from_millis(1000)));
        assert_eq!(p.next(1), Backoff::Retry(Duration::from_millis(2000)));
        assert_eq!(p.next(4), Backoff::Retry(Duration::from_millis(5000)));
        assert_eq!(p.next(5), Backoff::Exhausted);
    }

    #[test]
    fn huge_attempt_counts_saturate() {
        let p = ReconnectPolicy::exponential(u32::MAX, Duration::from_millis(1000));
        assert_eq!(p.delay_for(200), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn zero_attempts_allowed_is_immediately_exhausted() {
        let p = ReconnectPolicy::exponential(0, Duration::from_millis(10));
        assert_eq!(p.next(0), Backoff::Exhausted);
    }
}
