// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use super::backoff::LinearBackoff;
use super::{FailedAttempt, RetryDecision, RetryPolicy, ThrottlingOptions};

/// Retries of throttled (`429`) requests, always in the same region.
///
/// The delay is the retry-after sent by the service, or a linearly growing delay when there is
/// none. Retries stop after the configured count or once the cumulative wait would exceed the
/// configured maximum, whichever comes first.
#[derive(Debug, Clone)]
pub struct ThrottlingPolicy {
    options: ThrottlingOptions,
    fallback: LinearBackoff,
    retries: u32,
    waited: Duration,
}

impl ThrottlingPolicy {
    /// Creates the policy of one operation.
    #[must_use]
    pub const fn new(options: ThrottlingOptions) -> Self {
        Self {
            options,
            fallback: LinearBackoff::new(options.step()),
            retries: 0,
            waited: Duration::ZERO,
        }
    }
}

impl RetryPolicy for ThrottlingPolicy {
    fn should_retry(&mut self, failed: &FailedAttempt) -> RetryDecision {
        if self.retries >= self.options.retries() {
            return RetryDecision::DoNotRetry;
        }

        let delay = failed.retry_after().unwrap_or_else(|| self.fallback.delay(self.retries));
        let waited = self.waited.saturating_add(delay);

        if waited > self.options.wait() {
            return RetryDecision::DoNotRetry;
        }

        self.retries += 1;
        self.waited = waited;
        RetryDecision::RetrySameRegion { delay }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorClass;

    fn throttled(retry_after: Option<Duration>) -> FailedAttempt {
        FailedAttempt::new(ErrorClass::Throttled, retry_after, 2)
    }

    #[test]
    fn stops_after_max_retries() {
        let mut policy = ThrottlingPolicy::new(ThrottlingOptions::default());

        for _ in 0..9 {
            assert_eq!(
                policy.should_retry(&throttled(Some(Duration::from_millis(10)))),
                RetryDecision::RetrySameRegion {
                    delay: Duration::from_millis(10)
                }
            );
        }
        assert_eq!(policy.should_retry(&throttled(None)), RetryDecision::DoNotRetry);
    }

    #[test]
    fn stops_when_wait_exceeded() {
        let mut policy = ThrottlingPolicy::new(ThrottlingOptions::default());

        assert!(policy.should_retry(&throttled(Some(Duration::from_secs(20)))).delay().is_some());
        assert_eq!(
            policy.should_retry(&throttled(Some(Duration::from_secs(11)))),
            RetryDecision::DoNotRetry
        );
        assert!(policy.should_retry(&throttled(Some(Duration::from_secs(10)))).delay().is_some());
    }

    #[test]
    fn linear_fallback_without_retry_after() {
        let mut policy = ThrottlingPolicy::new(ThrottlingOptions::default().fallback_step(Duration::from_millis(50)));

        let delays: Vec<_> = (0..3)
            .filter_map(|_| policy.should_retry(&throttled(None)).delay())
            .collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(50),
                Duration::from_millis(100),
                Duration::from_millis(150)
            ]
        );
    }
}
