use std::cmp::min;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            // Zero keeps retries immediate
            base_delay: Duration::ZERO,
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
        }
    }
}

impl RetryConfig {
    /// Whether a task that has already been retried `retry_count` times may go again.
    pub fn can_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() || attempt == 0 {
            return Duration::ZERO;
        }

        let delay_ms = self.base_delay.as_millis() as f64
            * self.exponential_base.powi(attempt as i32 - 1);

        let delay = Duration::from_millis(delay_ms.min(u64::MAX as f64) as u64);
        min(delay, self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_immediate() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff_delay(1), Duration::ZERO);
        assert_eq!(retry.backoff_delay(3), Duration::ZERO);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let retry = RetryConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            ..RetryConfig::default()
        };

        assert_eq!(retry.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(retry.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(retry.backoff_delay(3), Duration::from_millis(350));
        assert_eq!(retry.backoff_delay(40), Duration::from_millis(350));
    }

    #[test]
    fn test_retry_budget() {
        let retry = RetryConfig::default();
        assert!(retry.can_retry(0));
        assert!(retry.can_retry(2));
        assert!(!retry.can_retry(3));

        let none = RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        };
        assert!(!none.can_retry(0));
    }
}
