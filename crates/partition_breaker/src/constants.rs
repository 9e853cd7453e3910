// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Default number of consecutive read exceptions a region absorbs before it is downgraded.
///
/// Reads are cheaper to retry than writes, so they tolerate more failures.
pub(crate) const DEFAULT_TOLERATED_READ_EXCEPTIONS: u32 = 10;

/// Default number of consecutive write exceptions a region absorbs before it is downgraded.
pub(crate) const DEFAULT_TOLERATED_WRITE_EXCEPTIONS: u32 = 5;

/// Default cool-down before an unavailable region becomes eligible for a tentative retry.
pub(crate) const DEFAULT_UNAVAILABILITY_DURATION: Duration = Duration::from_secs(60);

/// Default interval of the background sweep.
pub(crate) const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Default idle time after which a fully healthy partition scope is evicted.
pub(crate) const DEFAULT_IDLE_EVICTION: Duration = Duration::from_secs(30 * 60);

/// Default number of in-region retries before switching regions when remote regions are preferred.
pub(crate) const DEFAULT_MAX_RETRIES_IN_LOCAL_REGION: u32 = 1;

pub(crate) const DEFAULT_SESSION_WAIT_TIME: Duration = Duration::from_millis(5000);
pub(crate) const DEFAULT_SESSION_INITIAL_BACKOFF: Duration = Duration::from_millis(5);
pub(crate) const DEFAULT_SESSION_MAX_BACKOFF: Duration = Duration::from_millis(500);

/// Session retries sweep the applicable regions twice: once with the cached session token and
/// once after it has been refreshed.
pub(crate) const SESSION_RETRY_PASSES: u32 = 2;

pub(crate) const DEFAULT_RETRY_WITH_INITIAL_BACKOFF: Duration = Duration::from_millis(10);
pub(crate) const DEFAULT_RETRY_WITH_MULTIPLIER: u32 = 2;
pub(crate) const DEFAULT_RETRY_WITH_MAX_BACKOFF: Duration = Duration::from_millis(1000);
pub(crate) const DEFAULT_RETRY_WITH_WAIT_TIME: Duration = Duration::from_secs(30);

/// Default number of retries of a throttled request.
pub(crate) const DEFAULT_THROTTLING_MAX_RETRIES: u32 = 9;

/// Default cap on the cumulative wait across retries of a throttled request.
pub(crate) const DEFAULT_THROTTLING_MAX_WAIT: Duration = Duration::from_secs(30);

/// Step of the linear delay used when the service does not send a retry-after hint.
pub(crate) const DEFAULT_THROTTLING_FALLBACK_STEP: Duration = Duration::from_millis(100);
