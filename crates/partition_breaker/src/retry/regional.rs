// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use super::{FailedAttempt, RetryDecision, RetryPolicy};

/// Failover after regional degradation: gone, service unavailable, write forbidden and request
/// timeout.
///
/// These failures are reported to the circuit breaker by the executor; the policy only moves the
/// operation to the next applicable region, without waiting. Once the breaker marks a region
/// unavailable, endpoint selection skips it.
#[derive(Debug, Clone)]
pub struct RegionalFailoverPolicy {
    max_failovers: Option<u32>,
    failovers: u32,
}

impl RegionalFailoverPolicy {
    /// Creates the policy. Without an explicit limit, the operation fails over once per applicable
    /// region, and at least once.
    #[must_use]
    pub const fn new(max_failovers: Option<u32>) -> Self {
        Self {
            max_failovers,
            failovers: 0,
        }
    }
}

impl RetryPolicy for RegionalFailoverPolicy {
    fn should_retry(&mut self, failed: &FailedAttempt) -> RetryDecision {
        let limit = self
            .max_failovers
            .unwrap_or_else(|| u32::try_from(failed.regions().max(1)).unwrap_or(u32::MAX));

        if self.failovers >= limit {
            return RetryDecision::DoNotRetry;
        }

        self.failovers += 1;
        RetryDecision::RetryNextRegion { delay: Duration::ZERO }
    }
}
