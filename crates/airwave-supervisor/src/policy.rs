//! Retry timing and network retry policy.

use std::time::Duration;

/// Default delay before the first automatic retry, in milliseconds.
pub const BASE_RETRY_DELAY_MS: u64 = 500;

/// Default relaunches allowed after the ingest target is re-discovered.
pub const NETWORK_RETRIES: u32 = 1;

/// When and how often a failed stream is relaunched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Base delay between attempts (exponential backoff applied).
    pub retry_delay: Duration,

    /// Maximum delay between attempts.
    pub max_delay: Duration,

    /// Relaunches with the same format after a network failure has
    /// invalidated the ingest target. Further network failures are terminal.
    pub network_retries: u32,

    /// An attempt that ran at least this long resets the network retry count.
    pub stable_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(BASE_RETRY_DELAY_MS),
            max_delay: Duration::from_secs(10),
            network_retries: NETWORK_RETRIES,
            stable_after: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Policy with no delay between attempts.
    pub fn immediate() -> Self {
        Self {
            retry_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Delay before launch attempt `attempt` (the first retry is attempt 2).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(2).min(16);
        let delay = self.retry_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }

    /// Returns true if an attempt that ran for `uptime` counts as stable.
    pub fn is_stable(&self, uptime: Duration) -> bool {
        uptime >= self.stable_after
    }

    /// Check if another network retry is allowed after `used` of them.
    pub fn allows_network_retry(&self, used: u32) -> bool {
        used < self.network_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_delays() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(10));
    }

    #[test]
    fn test_network_retries() {
        let policy = RetryPolicy::default();

        assert!(policy.allows_network_retry(0));
        assert!(!policy.allows_network_retry(1));

        let patient = RetryPolicy {
            network_retries: 3,
            ..RetryPolicy::default()
        };
        assert!(patient.allows_network_retry(2));
        assert!(!patient.allows_network_retry(3));
    }

    #[test]
    fn test_stability_threshold() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_stable(Duration::from_secs(5)));
        assert!(policy.is_stable(Duration::from_secs(60)));
    }

    #[test]
    fn test_immediate_has_no_delay() {
        assert_eq!(RetryPolicy::immediate().delay_for_attempt(5), Duration::ZERO);
    }
}
