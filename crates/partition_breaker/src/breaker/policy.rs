// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use crate::{CircuitBreakerConfig, LocationHealthState, OperationKind};

/// Thresholds of the per-region health state machine.
///
/// The policy is pure: it holds no shared state and answers the same questions for every
/// partition scope.
#[derive(Debug, Clone)]
pub struct CircuitBreakerPolicy {
    config: CircuitBreakerConfig,
    unavailability_duration: Duration,
}

impl CircuitBreakerPolicy {
    pub(crate) const fn new(config: CircuitBreakerConfig, unavailability_duration: Duration) -> Self {
        Self {
            config,
            unavailability_duration,
        }
    }

    /// The number of consecutive exceptions a region in `state` absorbs for operations of `kind`.
    ///
    /// From [`LocationHealthState::Healthy`] the region is degraded once the streak reaches this
    /// count; from the other available states it becomes unavailable once the streak exceeds it.
    /// An unavailable region absorbs nothing.
    #[must_use]
    pub const fn allowed_exception_count_to_maintain_status(&self, state: LocationHealthState, kind: OperationKind) -> u32 {
        match state {
            LocationHealthState::Healthy | LocationHealthState::HealthyWithFailures | LocationHealthState::HealthyTentative => {
                self.config.tolerated_exceptions(kind)
            }
            LocationHealthState::Unavailable => 0,
        }
    }

    /// The number of consecutive successes required to move a region in `state` up to
    /// [`LocationHealthState::Healthy`]. Never zero.
    ///
    /// A degraded region needs as many successes as it tolerates exceptions, and at least two, so
    /// a single success never restores it. A tentative region needs half of that.
    #[must_use]
    pub const fn minimum_success_count_for_status_upgrade(&self, state: LocationHealthState, kind: OperationKind) -> u32 {
        let tolerated = self.config.tolerated_exceptions(kind);

        match state {
            LocationHealthState::HealthyWithFailures => {
                if tolerated < 2 {
                    2
                } else {
                    tolerated
                }
            }
            LocationHealthState::HealthyTentative => {
                if tolerated < 2 {
                    1
                } else {
                    tolerated / 2
                }
            }
            LocationHealthState::Healthy | LocationHealthState::Unavailable => 1,
        }
    }

    /// The cool-down an unavailable region waits before the sweep makes it tentative.
    #[must_use]
    pub const fn unavailability_duration(&self) -> Duration {
        self.unavailability_duration
    }

    /// The configuration the policy was built from.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocationHealthState::*;
    use crate::OperationKind::*;

    fn policy(reads: u32, writes: u32) -> CircuitBreakerPolicy {
        CircuitBreakerPolicy::new(
            CircuitBreakerConfig::default()
                .enabled(true)
                .tolerated_read_exceptions(reads)
                .tolerated_write_exceptions(writes),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn allowed_exceptions_by_state() {
        let policy = policy(10, 5);

        assert_eq!(policy.allowed_exception_count_to_maintain_status(Healthy, Read), 10);
        assert_eq!(policy.allowed_exception_count_to_maintain_status(HealthyWithFailures, Read), 10);
        assert_eq!(policy.allowed_exception_count_to_maintain_status(HealthyTentative, Read), 10);
        assert_eq!(policy.allowed_exception_count_to_maintain_status(Unavailable, Read), 0);
        assert_eq!(policy.allowed_exception_count_to_maintain_status(Healthy, Write), 5);
    }

    #[test]
    fn minimum_successes_never_zero() {
        for tolerated in 1..=12 {
            let policy = policy(tolerated, tolerated);

            for state in [Healthy, HealthyWithFailures, HealthyTentative, Unavailable] {
                assert!(policy.minimum_success_count_for_status_upgrade(state, Read) >= 1);
            }

            assert!(policy.minimum_success_count_for_status_upgrade(HealthyWithFailures, Write) >= 2);
        }
    }

    #[test]
    fn minimum_successes_defaults() {
        let policy = policy(10, 5);

        assert_eq!(policy.minimum_success_count_for_status_upgrade(HealthyWithFailures, Read), 10);
        assert_eq!(policy.minimum_success_count_for_status_upgrade(HealthyTentative, Read), 5);
        assert_eq!(policy.minimum_success_count_for_status_upgrade(HealthyWithFailures, Write), 5);
        assert_eq!(policy.minimum_success_count_for_status_upgrade(HealthyTentative, Write), 2);
        assert_eq!(policy.minimum_success_count_for_status_upgrade(Healthy, Write), 1);
    }

    #[test]
    fn unavailability_duration() {
        assert_eq!(policy(1, 1).unavailability_duration(), Duration::from_secs(60));
    }
}
