//! Per-error-type retry policy.

use std::time::Duration;

use warden_config::schema::SpawnConfig;
use warden_core::ErrorType;

/// How many times to try one model, and how long to wait in between,
/// depending on how the last attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts on one model while it keeps rate-limiting.
    pub max_retries: u32,
    /// Delay between same-model attempts (base delay for `unknown`).
    pub retry_delay: Duration,
    /// Extra attempts after a timeout.
    pub timeout_retries: u32,
    /// Extra attempts after an unclassified error.
    pub unknown_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            timeout_retries: 1,
            unknown_retries: 2,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SpawnConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            timeout_retries: config.timeout_retries,
            unknown_retries: config.unknown_retries,
        }
    }

    /// Total attempts allowed on one model when the latest failure is `error`.
    pub fn attempts_for(&self, error: ErrorType) -> u32 {
        match error {
            ErrorType::RateLimit => self.max_retries.max(1),
            ErrorType::Timeout => 1 + self.timeout_retries,
            ErrorType::ModelUnavailable => 1,
            ErrorType::Unknown => 1 + self.unknown_retries,
        }
    }

    /// Wait before the next attempt on the same model, after `failed`
    /// attempts on it so far.
    pub fn delay_after(&self, error: ErrorType, failed: u32) -> Duration {
        match error {
            ErrorType::RateLimit | ErrorType::Timeout => self.retry_delay,
            ErrorType::ModelUnavailable => Duration::ZERO,
            ErrorType::Unknown => {
                let exp = failed.saturating_sub(1).min(16);
                self.retry_delay.saturating_mul(1u32 << exp)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_budgets() {
        let p = RetryPolicy::default();
        assert_eq!(p.attempts_for(ErrorType::RateLimit), 3);
        assert_eq!(p.attempts_for(ErrorType::Timeout), 2);
        assert_eq!(p.attempts_for(ErrorType::ModelUnavailable), 1);
        assert_eq!(p.attempts_for(ErrorType::Unknown), 3);
    }

    #[test]
    fn test_unknown_backs_off_exponentially() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_after(ErrorType::Unknown, 1), Duration::from_secs(5));
        assert_eq!(p.delay_after(ErrorType::Unknown, 2), Duration::from_secs(10));
        assert_eq!(p.delay_after(ErrorType::RateLimit, 2), Duration::from_secs(5));
        assert_eq!(p.delay_after(ErrorType::ModelUnavailable, 1), Duration::ZERO);
    }

    #[test]
    fn test_zero_max_retries_still_tries_once() {
        let p = RetryPolicy {
            max_retries: 0,
            ..Default::default()
        };
        assert_eq!(p.attempts_for(ErrorType::RateLimit), 1);
    }
}
