// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Instant;

use parking_lot::Mutex;

use crate::breaker::CircuitBreakerPolicy;
use crate::{OperationKind, RegionEndpoint};

/// Health of one region for one partition scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationHealthState {
    /// The region serves requests normally.
    Healthy,
    /// The region failed repeatedly but still receives requests.
    HealthyWithFailures,
    /// The region recovered from unavailability and is on probation.
    HealthyTentative,
    /// The region is skipped by endpoint selection until its cool-down elapses.
    Unavailable,
}

impl LocationHealthState {
    /// Returns a static string for telemetry.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::HealthyWithFailures => "healthy_with_failures",
            Self::HealthyTentative => "healthy_tentative",
            Self::Unavailable => "unavailable",
        }
    }

    /// Returns `true` for every state except [`LocationHealthState::Unavailable`].
    #[must_use]
    pub const fn is_available(self) -> bool {
        !matches!(self, Self::Unavailable)
    }
}

/// What an outcome reported to the circuit breaker did to a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum HealthTransition {
    /// The counters were updated; the state did not change.
    Unchanged,
    /// The outcome arrived while the region was unavailable and was ignored.
    Ignored,
    /// `Healthy` moved to `HealthyWithFailures`.
    Degraded,
    /// The region became unavailable.
    MarkedUnavailable,
    /// The region would have become unavailable but it is the last available one for the scope.
    FailOpen,
    /// The region moved back to `Healthy`.
    Recovered,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Streaks {
    exceptions: u32,
    successes: u32,
}

/// Point-in-time copy of a region's health, for inspection and testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationHealthSnapshot {
    state: LocationHealthState,
    read: Streaks,
    write: Streaks,
    unavailable_since: Option<Instant>,
    ignored_outcomes: u64,
}

impl LocationHealthSnapshot {
    /// The health state.
    #[must_use]
    pub const fn state(&self) -> LocationHealthState {
        self.state
    }

    /// The current streak of consecutive exceptions for operations of `kind`.
    #[must_use]
    pub const fn consecutive_exception_count(&self, kind: OperationKind) -> u32 {
        match kind {
            OperationKind::Read => self.read.exceptions,
            OperationKind::Write => self.write.exceptions,
        }
    }

    /// The current streak of consecutive successes for operations of `kind`.
    #[must_use]
    pub const fn consecutive_success_count(&self, kind: OperationKind) -> u32 {
        match kind {
            OperationKind::Read => self.read.successes,
            OperationKind::Write => self.write.successes,
        }
    }

    /// When the region became unavailable; `None` unless the state is `Unavailable`.
    #[must_use]
    pub const fn unavailable_since(&self) -> Option<Instant> {
        self.unavailable_since
    }

    /// Number of outcomes reported while the region was unavailable, which did not count.
    #[must_use]
    pub const fn ignored_outcomes(&self) -> u64 {
        self.ignored_outcomes
    }

    /// Returns `true` unless the region is unavailable.
    #[must_use]
    pub const fn is_region_available_to_process_requests(&self) -> bool {
        self.state.is_available()
    }

    /// Returns `true` exactly when the region is unavailable.
    #[must_use]
    pub const fn is_exception_threshold_breached(&self) -> bool {
        !self.state.is_available()
    }
}

/// Mutable health of one (partition scope, region) pair.
///
/// Every counter update and state transition happens under one narrow per-context lock, so two
/// threads observing the same threshold cannot both apply a transition.
#[derive(Debug)]
pub(crate) struct LocationHealthContext {
    endpoint: RegionEndpoint,
    record: Mutex<HealthRecord>,
}

impl LocationHealthContext {
    pub fn new(endpoint: RegionEndpoint, now: Instant) -> Self {
        Self {
            endpoint,
            record: Mutex::new(HealthRecord::new(now)),
        }
    }

    pub fn endpoint(&self) -> &RegionEndpoint {
        &self.endpoint
    }

    pub fn record_success(&self, kind: OperationKind, now: Instant, policy: &CircuitBreakerPolicy) -> HealthTransition {
        self.record.lock().success(kind, now, policy)
    }

    /// Records an exception. `reserve_unavailable` is invoked, with the context lock held, right
    /// before the region would become unavailable; returning `false` suppresses the transition.
    pub fn record_exception(
        &self,
        kind: OperationKind,
        now: Instant,
        policy: &CircuitBreakerPolicy,
        reserve_unavailable: impl FnOnce() -> bool,
    ) -> HealthTransition {
        self.record.lock().exception(kind, now, policy, reserve_unavailable)
    }

    /// Moves an unavailable region whose cool-down elapsed to `HealthyTentative`.
    /// `release_unavailable` is invoked, with the context lock held, when the transition happens.
    pub fn promote_if_expired(&self, now: Instant, policy: &CircuitBreakerPolicy, release_unavailable: impl FnOnce()) -> bool {
        let mut record = self.record.lock();

        let expired = record
            .unavailable_since
            .is_some_and(|since| now.saturating_duration_since(since) >= policy.unavailability_duration());

        if record.state == LocationHealthState::Unavailable && expired {
            record.transition(LocationHealthState::HealthyTentative, now);
            release_unavailable();
            true
        } else {
            false
        }
    }

    /// Returns `true` when the context carries no information and was not touched since `idle_since`.
    pub fn is_idle(&self, idle_since: Instant) -> bool {
        let record = self.record.lock();

        record.state == LocationHealthState::Healthy
            && record.read == Streaks::default()
            && record.write == Streaks::default()
            && record.last_updated <= idle_since
    }

    pub fn snapshot(&self) -> LocationHealthSnapshot {
        let record = self.record.lock();

        LocationHealthSnapshot {
            state: record.state,
            read: record.read,
            write: record.write,
            unavailable_since: record.unavailable_since,
            ignored_outcomes: record.ignored,
        }
    }
}

#[derive(Debug)]
struct HealthRecord {
    state: LocationHealthState,
    read: Streaks,
    write: Streaks,
    unavailable_since: Option<Instant>,
    last_updated: Instant,
    // results that arrived while unavailable
    ignored: u64,
}

impl HealthRecord {
    const fn new(now: Instant) -> Self {
        Self {
            state: LocationHealthState::Healthy,
            read: Streaks {
                exceptions: 0,
                successes: 0,
            },
            write: Streaks {
                exceptions: 0,
                successes: 0,
            },
            unavailable_since: None,
            last_updated: now,
            ignored: 0,
        }
    }

    fn streaks(&mut self, kind: OperationKind) -> &mut Streaks {
        match kind {
            OperationKind::Read => &mut self.read,
            OperationKind::Write => &mut self.write,
        }
    }

    fn success(&mut self, kind: OperationKind, now: Instant, policy: &CircuitBreakerPolicy) -> HealthTransition {
        let state = self.state;

        if state == LocationHealthState::Unavailable {
            // Requests that were in flight when the region went unavailable may still complete.
            // Only the sweep moves a region out of this state.
            self.ignored = self.ignored.saturating_add(1);
            return HealthTransition::Ignored;
        }

        self.last_updated = now;
        let streaks = self.streaks(kind);
        streaks.exceptions = 0;
        streaks.successes = streaks.successes.saturating_add(1);
        let successes = streaks.successes;

        match state {
            LocationHealthState::HealthyWithFailures | LocationHealthState::HealthyTentative
                if successes >= policy.minimum_success_count_for_status_upgrade(state, kind) =>
            {
                self.transition(LocationHealthState::Healthy, now);
                HealthTransition::Recovered
            }
            _ => HealthTransition::Unchanged,
        }
    }

    fn exception(
        &mut self,
        kind: OperationKind,
        now: Instant,
        policy: &CircuitBreakerPolicy,
        reserve_unavailable: impl FnOnce() -> bool,
    ) -> HealthTransition {
        let state = self.state;

        if state == LocationHealthState::Unavailable {
            self.ignored = self.ignored.saturating_add(1);
            return HealthTransition::Ignored;
        }

        self.last_updated = now;
        let streaks = self.streaks(kind);
        streaks.successes = 0;
        streaks.exceptions = streaks.exceptions.saturating_add(1);
        let exceptions = streaks.exceptions;
        let allowed = policy.allowed_exception_count_to_maintain_status(state, kind);

        match state {
            LocationHealthState::Healthy if exceptions >= allowed => {
                // The streak carries over: it is the same run of failures.
                self.state = LocationHealthState::HealthyWithFailures;
                HealthTransition::Degraded
            }
            LocationHealthState::HealthyWithFailures | LocationHealthState::HealthyTentative if exceptions > allowed => {
                if reserve_unavailable() {
                    self.transition(LocationHealthState::Unavailable, now);
                    HealthTransition::MarkedUnavailable
                } else {
                    self.streaks(kind).exceptions = 0;
                    HealthTransition::FailOpen
                }
            }
            _ => HealthTransition::Unchanged,
        }
    }

    fn transition(&mut self, state: LocationHealthState, now: Instant) {
        self.state = state;
        self.read = Streaks::default();
        self.write = Streaks::default();
        self.last_updated = now;
        self.unavailable_since = (state == LocationHealthState::Unavailable).then_some(now);
    }
}
