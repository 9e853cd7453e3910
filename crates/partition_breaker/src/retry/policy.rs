// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use super::regional::RegionalFailoverPolicy;
use super::retry_with::RetryWithPolicy;
use super::session::SessionRetryPolicy;
use super::throttling::ThrottlingPolicy;
use crate::{ErrorClass, RetryOptions};

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry against the region of the failed attempt after `delay`.
    RetrySameRegion {
        /// Time to wait before the retry.
        delay: Duration,
    },
    /// Retry against the next applicable region after `delay`.
    RetryNextRegion {
        /// Time to wait before the retry.
        delay: Duration,
    },
    /// Surface the error to the caller.
    DoNotRetry,
}

impl RetryDecision {
    /// The delay before the retry, or `None` for [`RetryDecision::DoNotRetry`].
    #[must_use]
    pub const fn delay(&self) -> Option<Duration> {
        match self {
            Self::RetrySameRegion { delay } | Self::RetryNextRegion { delay } => Some(*delay),
            Self::DoNotRetry => None,
        }
    }
}

/// A failed attempt, as seen by a retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedAttempt {
    class: ErrorClass,
    retry_after: Option<Duration>,
    regions: usize,
}

impl FailedAttempt {
    /// Creates a failed attempt of the given class, with `regions` applicable regions.
    #[must_use]
    pub const fn new(class: ErrorClass, retry_after: Option<Duration>, regions: usize) -> Self {
        Self {
            class,
            retry_after,
            regions,
        }
    }

    /// The classification of the failure.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        self.class
    }

    /// The delay requested by the service, if any.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// The number of regions the operation may be routed to.
    #[must_use]
    pub const fn regions(&self) -> usize {
        self.regions
    }
}

/// Decides whether a failed attempt is retried.
///
/// A policy instance belongs to one logical operation and keeps the retry budget of that
/// operation; it is never shared.
pub trait RetryPolicy {
    /// Evaluates a failed attempt and consumes budget when a retry is granted.
    fn should_retry(&mut self, failed: &FailedAttempt) -> RetryDecision;
}

/// Per-operation dispatcher that routes each failure to the policy for its class.
///
/// Each class keeps its own budget: throttling retries do not consume session retries and the
/// other way round.
#[derive(Debug, Clone)]
pub struct OperationRetryPolicy {
    session: SessionRetryPolicy,
    regional: RegionalFailoverPolicy,
    throttling: ThrottlingPolicy,
    retry_with: RetryWithPolicy,
}

impl OperationRetryPolicy {
    /// Creates the retry policies of one operation.
    #[must_use]
    pub fn new(options: &RetryOptions) -> Self {
        Self {
            session: SessionRetryPolicy::new(options.session_config()),
            regional: RegionalFailoverPolicy::new(options.failovers()),
            throttling: ThrottlingPolicy::new(options.throttling_options()),
            retry_with: RetryWithPolicy::new(options.retry_with_backoff()),
        }
    }
}

impl RetryPolicy for OperationRetryPolicy {
    fn should_retry(&mut self, failed: &FailedAttempt) -> RetryDecision {
        match failed.class() {
            ErrorClass::SessionNotAvailable => self.session.should_retry(failed),
            ErrorClass::Gone | ErrorClass::ServiceUnavailable | ErrorClass::WriteForbidden | ErrorClass::RequestTimeout => {
                self.regional.should_retry(failed)
            }
            ErrorClass::Throttled => self.throttling.should_retry(failed),
            ErrorClass::RetryWith => self.retry_with.should_retry(failed),
            ErrorClass::Success | ErrorClass::NonRetryable => RetryDecision::DoNotRetry,
        }
    }
}
