// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use crate::constants::{DEFAULT_THROTTLING_FALLBACK_STEP, DEFAULT_THROTTLING_MAX_RETRIES, DEFAULT_THROTTLING_MAX_WAIT};
use crate::{ExponentialBackoff, SessionRetryConfig};

/// Limits of retries for throttled (`429`) requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlingOptions {
    max_retries: u32,
    max_wait: Duration,
    fallback_step: Duration,
}

impl Default for ThrottlingOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_THROTTLING_MAX_RETRIES,
            max_wait: DEFAULT_THROTTLING_MAX_WAIT,
            fallback_step: DEFAULT_THROTTLING_FALLBACK_STEP,
        }
    }
}

impl ThrottlingOptions {
    /// Sets the maximum number of retries.
    ///
    /// **Default**: 9
    #[must_use]
    pub const fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the cap on the cumulative wait across retries.
    ///
    /// **Default**: 30 seconds
    #[must_use]
    pub const fn max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }

    /// Sets the step of the linear delay used when the service sends no retry-after hint.
    ///
    /// **Default**: 100 milliseconds
    #[must_use]
    pub const fn fallback_step(mut self, step: Duration) -> Self {
        self.fallback_step = step;
        self
    }

    pub(crate) const fn retries(&self) -> u32 {
        self.max_retries
    }

    pub(crate) const fn wait(&self) -> Duration {
        self.max_wait
    }

    pub(crate) const fn step(&self) -> Duration {
        self.fallback_step
    }
}

/// Options of the [`RetryExecutor`][crate::RetryExecutor].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use partition_breaker::{RegionSwitchHint, RetryOptions, SessionRetryConfig};
///
/// let options = RetryOptions::default()
///     .session(SessionRetryConfig::default().region_switch_hint(RegionSwitchHint::RemoteRegionPreferred))
///     .end_to_end_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOptions {
    session: SessionRetryConfig,
    retry_with: ExponentialBackoff,
    throttling: ThrottlingOptions,
    end_to_end_timeout: Option<Duration>,
    max_failovers: Option<u32>,
    logs_enabled: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            session: SessionRetryConfig::default(),
            retry_with: ExponentialBackoff::retry_with(),
            throttling: ThrottlingOptions::default(),
            end_to_end_timeout: None,
            max_failovers: None,
            logs_enabled: false,
        }
    }
}

impl RetryOptions {
    /// Sets the tuning of session-token mismatch retries.
    #[must_use]
    pub fn session(mut self, session: SessionRetryConfig) -> Self {
        self.session = session;
        self
    }

    /// Sets the backoff of `449 Retry With` retries.
    ///
    /// **Default**: 10 ms doubling up to 1 s within a 30 s window
    #[must_use]
    pub const fn retry_with(mut self, backoff: ExponentialBackoff) -> Self {
        self.retry_with = backoff;
        self
    }

    /// Sets the limits of throttling retries.
    #[must_use]
    pub const fn throttling(mut self, throttling: ThrottlingOptions) -> Self {
        self.throttling = throttling;
        self
    }

    /// Stops scheduling retries once the operation can no longer complete within `timeout`.
    ///
    /// Attempts already in flight are never abandoned.
    ///
    /// **Default**: none
    #[must_use]
    pub const fn end_to_end_timeout(mut self, timeout: Duration) -> Self {
        self.end_to_end_timeout = Some(timeout);
        self
    }

    /// Sets the number of cross-region failovers after regional failures.
    ///
    /// **Default**: one per applicable region, at least one
    #[must_use]
    pub const fn max_failovers(mut self, failovers: u32) -> Self {
        self.max_failovers = Some(failovers);
        self
    }

    /// Enables or disables structured log events for retries.
    ///
    /// **Default**: disabled
    #[must_use]
    pub const fn enable_logs(mut self, enabled: bool) -> Self {
        self.logs_enabled = enabled;
        self
    }

    pub(crate) const fn session_config(&self) -> &SessionRetryConfig {
        &self.session
    }

    pub(crate) const fn retry_with_backoff(&self) -> ExponentialBackoff {
        self.retry_with
    }

    pub(crate) const fn throttling_options(&self) -> ThrottlingOptions {
        self.throttling
    }

    pub(crate) const fn timeout(&self) -> Option<Duration> {
        self.end_to_end_timeout
    }

    pub(crate) const fn failovers(&self) -> Option<u32> {
        self.max_failovers
    }

    pub(crate) const fn logs_enabled(&self) -> bool {
        self.logs_enabled
    }
}
