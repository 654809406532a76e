//! # Retry
//!
//! Module providing a `RetryPolicy` to decide how long a failed message stays hidden before
//! the queue delivers it again.
use std::time;

#[derive(Clone, Debug, PartialEq, Eq)]
/// A retry policy to determine redelivery delays for a message.
pub struct RetryPolicy {
    /// Coefficient to multiply initial_interval with for every past delivery.
    pub backoff_coefficient: u32,
    /// The delay after the first failed delivery.
    pub initial_interval: time::Duration,
    /// The maximum possible delay between deliveries.
    pub maximum_interval: Option<time::Duration>,
}

impl RetryPolicy {
    /// Initialize a `RetryPolicyBuilder`.
    pub fn build(backoff_coefficient: u32, initial_interval: time::Duration) -> RetryPolicyBuilder {
        RetryPolicyBuilder::new(backoff_coefficient, initial_interval)
    }

    /// Determine the redelivery delay for a message that failed on its `receive_count`-th delivery.
    pub fn redelivery_delay(&self, receive_count: u32) -> time::Duration {
        let factor = self
            .backoff_coefficient
            .checked_pow(receive_count.saturating_sub(1))
            .unwrap_or(u32::MAX);
        let candidate_interval = self
            .initial_interval
            .checked_mul(factor)
            .unwrap_or(time::Duration::MAX);

        match self.maximum_interval {
            Some(max_interval) => std::cmp::min(candidate_interval, max_interval),
            None => candidate_interval,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicyBuilder::default().provide()
    }
}

/// Builder pattern struct to provide a `RetryPolicy`.
pub struct RetryPolicyBuilder {
    pub backoff_coefficient: u32,
    pub initial_interval: time::Duration,
    pub maximum_interval: Option<time::Duration>,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self {
            backoff_coefficient: 2,
            initial_interval: time::Duration::from_secs(1),
            maximum_interval: None,
        }
    }
}

impl RetryPolicyBuilder {
    pub fn new(backoff_coefficient: u32, initial_interval: time::Duration) -> Self {
        Self {
            backoff_coefficient,
            initial_interval,
            ..RetryPolicyBuilder::default()
        }
    }

    pub fn maximum_interval(mut self, interval: time::Duration) -> RetryPolicyBuilder {
        self.maximum_interval = Some(interval);
        self
    }

    /// Provide a `RetryPolicy` according to build parameters provided thus far.
    pub fn provide(&self) -> RetryPolicy {
        RetryPolicy {
            backoff_coefficient: self.backoff_coefficient,
            initial_interval: self.initial_interval,
            maximum_interval: self.maximum_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_delay() {
        let retry_policy = RetryPolicy::build(1, time::Duration::from_secs(2)).provide();

        assert_eq!(retry_policy.redelivery_delay(1), time::Duration::from_secs(2));
        assert_eq!(retry_policy.redelivery_delay(2), time::Duration::from_secs(2));
        assert_eq!(retry_policy.redelivery_delay(5), time::Duration::from_secs(2));
    }

    #[test]
    fn test_exponential_delay() {
        let retry_policy = RetryPolicy::build(2, time::Duration::from_secs(1)).provide();

        assert_eq!(retry_policy.redelivery_delay(1), time::Duration::from_secs(1));
        assert_eq!(retry_policy.redelivery_delay(2), time::Duration::from_secs(2));
        assert_eq!(retry_policy.redelivery_delay(3), time::Duration::from_secs(4));
        assert_eq!(retry_policy.redelivery_delay(4), time::Duration::from_secs(8));
    }

    #[test]
    fn test_exponential_delay_with_maximum() {
        let retry_policy = RetryPolicy::build(2, time::Duration::from_secs(1))
            .maximum_interval(time::Duration::from_secs(4))
            .provide();

        assert_eq!(retry_policy.redelivery_delay(1), time::Duration::from_secs(1));
        assert_eq!(retry_policy.redelivery_delay(3), time::Duration::from_secs(4));
        assert_eq!(retry_policy.redelivery_delay(4), time::Duration::from_secs(4));
    }

    #[test]
    fn test_large_receive_counts_do_not_overflow() {
        let retry_policy = RetryPolicy::build(10, time::Duration::from_secs(1))
            .maximum_interval(time::Duration::from_secs(60))
            .provide();

        assert_eq!(
            retry_policy.redelivery_delay(1_000),
            time::Duration::from_secs(60)
        );
        assert_eq!(RetryPolicy::default().redelivery_delay(0), time::Duration::from_secs(1));
    }
}
