use std::time::Duration;

/// Bounded retry schedule with exponential backoff.
///
/// Used by the consumer loop before dead-lettering a delivery, and by the
/// stock-release compensation path, which must not be best-effort.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the given attempt count and base delay.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Returns the delay to sleep before retry number `retry` (1-based),
    /// or `None` once the attempt budget is spent.
    pub fn delay_before(&self, retry: u32) -> Option<Duration> {
        if retry >= self.max_attempts {
            return None;
        }
        Some(self.base_delay * 2u32.saturating_pow(retry.saturating_sub(1)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_until_budget_spent() {
        let policy = RetryPolicy::new(3, Duration::from_millis(50));
        assert_eq!(policy.delay_before(1), Some(Duration::from_millis(50)));
        assert_eq!(policy.delay_before(2), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_before(3), None);
    }

    #[test]
    fn none_policy_never_retries() {
        assert_eq!(RetryPolicy::none().delay_before(1), None);
    }

    #[test]
    fn at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
