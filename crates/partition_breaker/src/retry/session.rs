// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use super::{FailedAttempt, RetryDecision, RetryPolicy};
use crate::constants::SESSION_RETRY_PASSES;
use crate::{ExponentialBackoff, RegionSwitchHint, SessionRetryConfig};

/// Retries of session-token mismatches (`404/1002`).
///
/// The applicable regions are swept in order, twice. Each region visit grants one attempt plus a
/// number of in-region retries: the configured small count when remote regions are preferred, or
/// the full exponential retry-count bound when the local region is preferred. The first retry of
/// a visit does not wait; in-region retries wait on the exponential backoff.
///
/// When every attempt fails, an operation against `n` regions with `r` in-region retries makes
/// `1 + 2 * n * (1 + r)` attempts.
#[derive(Debug, Clone)]
pub struct SessionRetryPolicy {
    backoff: ExponentialBackoff,
    in_region_retries: u32,
    // frozen on the first failure so that topology changes do not move the budget
    budget: Option<u32>,
    retries: u32,
}

impl SessionRetryPolicy {
    /// Creates the policy of one operation.
    #[must_use]
    pub fn new(config: &SessionRetryConfig) -> Self {
        let backoff = ExponentialBackoff::new(config.initial_backoff(), 2, config.max_backoff(), config.wait_time());

        let in_region_retries = match config.hint() {
            RegionSwitchHint::RemoteRegionPreferred => config.max_retries_in_local_region_when_remote_region_preferred(),
            RegionSwitchHint::LocalRegionPreferred => backoff.retry_count_bound(),
        };

        Self {
            backoff,
            in_region_retries,
            budget: None,
            retries: 0,
        }
    }

    /// Attempts granted to each region visit.
    #[must_use]
    pub fn attempts_per_region(&self) -> u32 {
        self.in_region_retries.saturating_add(1)
    }

    /// Total retries granted for `regions` applicable regions.
    #[must_use]
    pub fn retry_budget(&self, regions: usize) -> u32 {
        let regions = u32::try_from(regions.max(1)).unwrap_or(u32::MAX);

        SESSION_RETRY_PASSES
            .saturating_mul(regions)
            .saturating_mul(self.attempts_per_region())
    }
}

impl RetryPolicy for SessionRetryPolicy {
    fn should_retry(&mut self, failed: &FailedAttempt) -> RetryDecision {
        let budget = match self.budget {
            Some(budget) => budget,
            None => {
                let budget = self.retry_budget(failed.regions());
                self.budget = Some(budget);
                budget
            }
        };

        if self.retries >= budget {
            return RetryDecision::DoNotRetry;
        }

        let visit = self.retries / self.attempts_per_region();
        let position = self.retries % self.attempts_per_region();
        self.retries += 1;

        match (visit, position) {
            // the first visit starts in the region that just failed, right away
            (0, 0) => RetryDecision::RetrySameRegion { delay: Duration::ZERO },
            (_, 0) => RetryDecision::RetryNextRegion { delay: Duration::ZERO },
            (_, position) => RetryDecision::RetrySameRegion {
                delay: self.backoff.delay(position - 1),
            },
        }
    }
}
