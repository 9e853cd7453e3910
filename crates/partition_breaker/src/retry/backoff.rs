// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::cmp::{max, min};
use std::time::Duration;

use crate::constants::{
    DEFAULT_RETRY_WITH_INITIAL_BACKOFF, DEFAULT_RETRY_WITH_MAX_BACKOFF, DEFAULT_RETRY_WITH_MULTIPLIER,
    DEFAULT_RETRY_WITH_WAIT_TIME,
};

/// Smallest step used by an exponential backoff. Keeps the retry-count bound finite.
const MIN_BACKOFF: Duration = Duration::from_millis(1);

/// Capped exponential backoff bounded by a total wait window.
///
/// The first delay is `initial`; every following delay is the previous one times `multiplier`,
/// capped at `max`. The number of attempts that fit in the wait window is given by
/// [`ExponentialBackoff::retry_count_bound`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use partition_breaker::ExponentialBackoff;
///
/// let backoff = ExponentialBackoff::new(
///     Duration::from_millis(5),
///     2,
///     Duration::from_millis(500),
///     Duration::from_millis(5000),
/// );
///
/// let delays: Vec<_> = backoff.delays().take(4).collect();
/// assert_eq!(delays[3], Duration::from_millis(40));
/// assert_eq!(backoff.retry_count_bound(), 18);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    initial: Duration,
    multiplier: u32,
    max: Duration,
    wait_time: Duration,
}

impl ExponentialBackoff {
    /// Creates a new backoff.
    ///
    /// `initial` is raised to at least one millisecond, `multiplier` to at least 1 and `max` to at
    /// least `initial`.
    #[must_use]
    pub fn new(initial: Duration, multiplier: u32, max_backoff: Duration, wait_time: Duration) -> Self {
        let initial = max(initial, MIN_BACKOFF);

        Self {
            initial,
            multiplier: multiplier.max(1),
            max: max(max_backoff, initial),
            wait_time,
        }
    }

    /// The backoff used for `449 Retry With` responses.
    #[must_use]
    pub fn retry_with() -> Self {
        Self::new(
            DEFAULT_RETRY_WITH_INITIAL_BACKOFF,
            DEFAULT_RETRY_WITH_MULTIPLIER,
            DEFAULT_RETRY_WITH_MAX_BACKOFF,
            DEFAULT_RETRY_WITH_WAIT_TIME,
        )
    }

    /// The first delay.
    #[must_use]
    pub const fn initial(&self) -> Duration {
        self.initial
    }

    /// The delay cap.
    #[must_use]
    pub const fn max(&self) -> Duration {
        self.max
    }

    /// The total wait window.
    #[must_use]
    pub const fn wait_time(&self) -> Duration {
        self.wait_time
    }

    /// Returns the infinite sequence of delays.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        let backoff = *self;
        let mut next = self.initial;

        std::iter::from_fn(move || {
            let current = next;
            next = backoff.grow(current);
            Some(current)
        })
    }

    /// The delay before the retry with the given zero-based index.
    #[must_use]
    pub fn delay(&self, retry_index: u32) -> Duration {
        self.delays()
            .nth(usize::try_from(retry_index).unwrap_or(usize::MAX))
            .unwrap_or(self.max)
    }

    /// The maximum number of attempts that fit in the wait window.
    ///
    /// Counting starts at one; every delay that starts while the cumulative wait is still within
    /// the window adds an attempt, and the result carries one extra attempt of margin for
    /// scheduling jitter. The result is deterministic for a given backoff.
    #[must_use]
    pub fn retry_count_bound(&self) -> u32 {
        let mut count: u32 = 1;
        let mut backoff = self.initial;
        let mut cumulative = Duration::ZERO;

        while cumulative <= self.wait_time {
            cumulative = cumulative.saturating_add(backoff);
            backoff = self.grow(backoff);
            count = count.saturating_add(1);
        }

        count.saturating_add(1)
    }

    fn grow(&self, backoff: Duration) -> Duration {
        min(backoff.saturating_mul(self.multiplier), self.max)
    }
}

/// Linearly increasing delay used when throttled responses carry no retry-after hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LinearBackoff {
    step: Duration,
}

impl LinearBackoff {
    pub(crate) const fn new(step: Duration) -> Self {
        Self { step }
    }

    /// The delay before the retry with the given zero-based index.
    pub(crate) fn delay(self, retry_index: u32) -> Duration {
        self.step.saturating_mul(retry_index.saturating_add(1))
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    fn closed_form(initial_ms: u64, multiplier: u64, max_ms: u64, total_ms: u64) -> u32 {
        let mut count = 1;
        let mut backoff = initial_ms;
        let mut cumulative = 0;
        while cumulative <= total_ms {
            cumulative += backoff;
            backoff = (backoff * multiplier).min(max_ms);
            count += 1;
        }
        count + 1
    }

    #[test]
    fn session_defaults_bound() {
        let backoff = ExponentialBackoff::new(
            Duration::from_millis(5),
            2,
            Duration::from_millis(500),
            Duration::from_millis(5000),
        );

        assert_eq!(backoff.retry_count_bound(), closed_form(5, 2, 500, 5000));
        assert_eq!(backoff.retry_count_bound(), 18);
    }

    #[test]
    fn retry_with_defaults_bound() {
        let backoff = ExponentialBackoff::retry_with();

        assert_eq!(backoff.initial(), Duration::from_millis(10));
        assert_eq!(backoff.max(), Duration::from_millis(1000));
        assert_eq!(backoff.wait_time(), Duration::from_secs(30));
        assert_eq!(backoff.retry_count_bound(), closed_form(10, 2, 1000, 30_000));
        assert_eq!(backoff.retry_count_bound(), 38);
    }

    #[test]
    fn bound_when_window_shorter_than_first_delay() {
        let backoff = ExponentialBackoff::new(
            Duration::from_millis(100),
            2,
            Duration::from_millis(100),
            Duration::from_millis(50),
        );

        // one delay starts within the window
        assert_eq!(backoff.retry_count_bound(), 3);
    }

    #[test]
    fn delays_double_until_capped() {
        let backoff = ExponentialBackoff::new(
            Duration::from_millis(5),
            2,
            Duration::from_millis(30),
            Duration::from_secs(1),
        );

        let delays: Vec<_> = backoff.delays().take(5).map(|d| d.as_millis()).collect();

        assert_eq!(delays, vec![5, 10, 20, 30, 30]);
        assert_eq!(backoff.delay(0), Duration::from_millis(5));
        assert_eq!(backoff.delay(10), Duration::from_millis(30));
    }

    #[test]
    fn new_normalizes_inputs() {
        let backoff = ExponentialBackoff::new(Duration::ZERO, 0, Duration::ZERO, Duration::from_millis(10));

        assert_eq!(backoff.initial(), MIN_BACKOFF);
        assert_eq!(backoff.max(), MIN_BACKOFF);
        assert_eq!(backoff.delays().take(3).collect::<Vec<_>>(), vec![MIN_BACKOFF; 3]);
        assert_eq!(backoff.retry_count_bound(), 13);
    }

    #[test]
    fn linear_delays() {
        let backoff = LinearBackoff::new(Duration::from_millis(100));

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(300));
    }
}
