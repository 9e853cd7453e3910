// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use crate::{RegionEndpoint, StatusCode, SubStatusCode};

/// Ordered log of the status codes observed by the attempts of one logical operation.
///
/// One entry is appended per attempt, including the first one and the final success, so the
/// length of the log is the number of attempts made.
///
/// # Examples
///
/// ```
/// use partition_breaker::{RetryContext, StatusCode, SubStatusCode};
///
/// let mut context = RetryContext::default();
/// context.record(StatusCode::GONE, SubStatusCode::NONE);
/// context.record(StatusCode::OK, SubStatusCode::NONE);
///
/// assert_eq!(context.attempts(), 2);
/// assert_eq!(context.retry_count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryContext {
    statuses: Vec<(StatusCode, SubStatusCode)>,
}

impl RetryContext {
    /// Appends the outcome of an attempt.
    pub fn record(&mut self, status: StatusCode, sub_status: SubStatusCode) {
        self.statuses.push((status, sub_status));
    }

    /// The recorded `(status, sub-status)` pairs in attempt order.
    #[must_use]
    pub fn statuses(&self) -> &[(StatusCode, SubStatusCode)] {
        &self.statuses
    }

    /// The number of attempts recorded.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.statuses.len()
    }

    /// The number of retries, that is every attempt after the first one.
    #[must_use]
    pub fn retry_count(&self) -> usize {
        self.statuses.len().saturating_sub(1)
    }

    /// Returns `true` if no attempt was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

/// Diagnostics attached to the outcome of a logical operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDiagnostics {
    retry_context: RetryContext,
    regions_contacted: Vec<RegionEndpoint>,
    elapsed: Duration,
}

impl OperationDiagnostics {
    pub(crate) const fn new(retry_context: RetryContext, regions_contacted: Vec<RegionEndpoint>, elapsed: Duration) -> Self {
        Self {
            retry_context,
            regions_contacted,
            elapsed,
        }
    }

    /// The status codes of every attempt.
    #[must_use]
    pub const fn retry_context(&self) -> &RetryContext {
        &self.retry_context
    }

    /// The distinct regions contacted, in the order they were first contacted.
    #[must_use]
    pub fn regions_contacted(&self) -> &[RegionEndpoint] {
        &self.regions_contacted
    }

    /// The time spent on the operation, including backoff delays.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }
}
