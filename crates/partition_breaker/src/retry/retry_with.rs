// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{FailedAttempt, RetryDecision, RetryPolicy};
use crate::ExponentialBackoff;

/// Retries of `449 Retry With` responses, always in the same region.
///
/// Write contention is local to the replica, so the operation never fails over. The number of
/// retries is the retry-count bound of the backoff.
#[derive(Debug, Clone)]
pub struct RetryWithPolicy {
    backoff: ExponentialBackoff,
    max_retries: u32,
    retries: u32,
}

impl RetryWithPolicy {
    /// Creates the policy of one operation.
    #[must_use]
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self {
            backoff,
            max_retries: backoff.retry_count_bound(),
            retries: 0,
        }
    }
}

impl RetryPolicy for RetryWithPolicy {
    fn should_retry(&mut self, _failed: &FailedAttempt) -> RetryDecision {
        if self.retries >= self.max_retries {
            return RetryDecision::DoNotRetry;
        }

        let delay = self.backoff.delay(self.retries);
        self.retries += 1;
        RetryDecision::RetrySameRegion { delay }
    }
}
