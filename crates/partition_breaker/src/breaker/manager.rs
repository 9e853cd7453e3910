// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use anyspawn::{JoinHandle, Spawner};
use parking_lot::Mutex;
use tick::Clock;

use super::CircuitBreakerPolicy;
use super::registry::PartitionHealthRegistry;
use super::sweep::SweepTask;
use super::telemetry::BreakerTelemetry;
use crate::constants::{DEFAULT_IDLE_EVICTION, DEFAULT_SWEEP_INTERVAL, DEFAULT_UNAVAILABILITY_DURATION};
use crate::{
    CircuitBreakerConfig, EndpointDirectory, HealthTransition, LocationHealthSnapshot, OperationKind, PartitionKeyRange,
    PartitionScope, RegionEndpoint, RegionNameResolver,
};

/// Partition-level circuit breaker shared by all operations of a client.
///
/// The breaker tracks the health of every region a partition scope was routed to, and answers
/// which regions endpoint selection should skip. Outcomes are reported through
/// [`handle_location_success`][Self::handle_location_success] and
/// [`handle_location_exception`][Self::handle_location_exception]; both are non-blocking,
/// in-memory operations guarded by narrow per-region locks.
///
/// Unavailable regions come back through a periodic sweep: either run
/// [`sweep`][Self::sweep] from your own scheduler, or spawn the background task with
/// [`start`][Self::start].
///
/// The breaker is cheap to clone; clones share the same state.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use partition_breaker::{
///     CircuitBreakerConfig, OperationKind, PartitionCircuitBreaker, PartitionKeyRange, PartitionScope,
///     StaticEndpointDirectory,
/// };
/// use tick::Clock;
///
/// let directory = Arc::new(
///     StaticEndpointDirectory::builder()
///         .read_region("West US", "https://westus.example.com")
///         .read_region("East US", "https://eastus.example.com")
///         .build(),
/// );
///
/// let breaker = PartitionCircuitBreaker::builder(Clock::new_frozen(), directory)
///     .config(CircuitBreakerConfig::default().enabled(true).tolerated_read_exceptions(1))
///     .build();
///
/// let scope = PartitionScope::new("coll", PartitionKeyRange::new("0", "", "FF"));
/// let west = "https://westus.example.com".into();
///
/// breaker.handle_location_exception(&scope, &west, OperationKind::Read);
/// breaker.handle_location_exception(&scope, &west, OperationKind::Read);
///
/// assert_eq!(breaker.unavailable_regions(&scope, OperationKind::Read), vec![west]);
/// ```
#[derive(Clone)]
pub struct PartitionCircuitBreaker {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    registry: PartitionHealthRegistry,
    policy: CircuitBreakerPolicy,
    directory: Arc<dyn EndpointDirectory>,
    resolver: Option<Arc<dyn RegionNameResolver>>,
    clock: Clock,
    sweep_interval: Duration,
    idle_eviction: Duration,
    telemetry: BreakerTelemetry,
    sweep_task: Mutex<Option<SweepTask>>,
}

impl PartitionCircuitBreaker {
    /// Creates a builder for a circuit breaker that reads applicable regions from `directory`.
    #[must_use]
    pub fn builder(clock: Clock, directory: Arc<dyn EndpointDirectory>) -> PartitionCircuitBreakerBuilder {
        PartitionCircuitBreakerBuilder {
            clock,
            directory,
            resolver: None,
            config: CircuitBreakerConfig::default(),
            unavailability_duration: DEFAULT_UNAVAILABILITY_DURATION,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            idle_eviction: DEFAULT_IDLE_EVICTION,
            logs_enabled: false,
        }
    }

    /// Returns `true` if the breaker records outcomes.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.shared.policy.config().is_enabled()
    }

    /// The thresholds the breaker applies.
    #[must_use]
    pub fn policy(&self) -> &CircuitBreakerPolicy {
        &self.shared.policy
    }

    /// Records a successful attempt of an operation of `kind` against `region` for `scope`.
    pub fn handle_location_success(&self, scope: &PartitionScope, region: &RegionEndpoint, kind: OperationKind) -> HealthTransition {
        let shared = &self.shared;

        if !self.is_enabled() {
            return HealthTransition::Unchanged;
        }

        // NOTE: read the clock outside of the context lock.
        let now = shared.clock.instant();
        let transition = shared.registry.record(scope, |partition| {
            partition.get_or_create(region, now).record_success(kind, now, &shared.policy)
        });

        shared.telemetry.report(transition, scope, region, kind);
        transition
    }

    /// Records a regional failure of an operation of `kind` against `region` for `scope`.
    ///
    /// If the failure would make `region` unavailable while every other applicable region of the
    /// scope is unavailable already, the transition is suppressed and
    /// [`HealthTransition::FailOpen`] is returned.
    pub fn handle_location_exception(&self, scope: &PartitionScope, region: &RegionEndpoint, kind: OperationKind) -> HealthTransition {
        let shared = &self.shared;

        if !self.is_enabled() {
            return HealthTransition::Unchanged;
        }

        let now = shared.clock.instant();
        let applicable = shared.directory.applicable_endpoints(kind);
        let transition = shared.registry.record(scope, |partition| {
            partition
                .get_or_create(region, now)
                .record_exception(kind, now, &shared.policy, || partition.try_reserve_unavailable(region, &applicable))
        });

        shared.telemetry.report(transition, scope, region, kind);
        transition
    }

    /// Regions currently unavailable for `scope`, in the directory's preference order.
    ///
    /// Never returns every applicable region: if, at the time of reading, all of them are
    /// unavailable, the result is empty.
    #[must_use]
    pub fn unavailable_regions(&self, scope: &PartitionScope, kind: OperationKind) -> Vec<RegionEndpoint> {
        if !self.is_enabled() {
            return Vec::new();
        }

        let Some(partition) = self.shared.registry.get(scope) else {
            return Vec::new();
        };

        let unavailable = partition.unavailable();
        if unavailable.is_empty() {
            return Vec::new();
        }

        let applicable = self.shared.directory.applicable_endpoints(kind);
        let regions: Vec<_> = applicable.iter().filter(|region| unavailable.contains(*region)).cloned().collect();

        if regions.len() == applicable.len() {
            Vec::new()
        } else {
            regions
        }
    }

    /// Names of the regions currently unavailable for the given partition key range, as reported
    /// by the region name resolver. Endpoints without a known name are reported by address.
    #[must_use]
    pub fn unavailable_region_names(&self, collection_rid: &str, range: &PartitionKeyRange, kind: OperationKind) -> Vec<String> {
        let scope = PartitionScope::new(collection_rid, range.clone());

        self.unavailable_regions(&scope, kind)
            .into_iter()
            .map(|region| {
                self.shared
                    .resolver
                    .as_ref()
                    .and_then(|resolver| resolver.region_name(&region))
                    .unwrap_or_else(|| region.to_string())
            })
            .collect()
    }

    /// Filters `preferred` down to the regions available for `scope`, preserving its order.
    ///
    /// Returns `preferred` unfiltered when filtering would leave nothing.
    #[must_use]
    pub fn applicable_endpoints(&self, preferred: &[RegionEndpoint], scope: &PartitionScope, kind: OperationKind) -> Vec<RegionEndpoint> {
        let unavailable = self.unavailable_regions(scope, kind);
        if unavailable.is_empty() {
            return preferred.to_vec();
        }

        let available: Vec<_> = preferred.iter().filter(|region| !unavailable.contains(*region)).cloned().collect();

        if available.is_empty() { preferred.to_vec() } else { available }
    }

    /// Health of every region tracked for `scope`.
    #[must_use]
    pub fn snapshot(&self, scope: &PartitionScope) -> HashMap<RegionEndpoint, LocationHealthSnapshot> {
        self.shared.registry.snapshot(scope)
    }

    /// Forgets everything recorded for `scope`. Returns `true` if the scope was tracked.
    pub fn remove_partition(&self, scope: &PartitionScope) -> bool {
        self.shared.registry.remove(scope)
    }

    /// Number of partition scopes currently tracked.
    #[must_use]
    pub fn tracked_partitions(&self) -> usize {
        self.shared.registry.len()
    }

    /// Runs one sweep synchronously.
    ///
    /// Unavailable regions whose cool-down elapsed become tentative, and scopes that stayed fully
    /// healthy and untouched for the idle eviction period are forgotten.
    pub fn sweep(&self) -> SweepReport {
        self.shared.sweep()
    }

    /// Spawns the background sweep on `spawner`. Does nothing if it is already running.
    pub fn start(&self, spawner: &Spawner) {
        let mut task = self.shared.sweep_task.lock();

        if task.is_none() {
            *task = Some(SweepTask::spawn(
                spawner,
                Arc::downgrade(&self.shared),
                &self.shared.clock,
                self.shared.sweep_interval,
            ));
        }
    }

    /// Stops the background sweep.
    ///
    /// Returns the handle of the task, which completes once the task exits, or `None` if the sweep
    /// was not running.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        self.shared.sweep_task.lock().take().map(SweepTask::stop)
    }
}

impl Debug for PartitionCircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionCircuitBreaker")
            .field("policy", &self.shared.policy)
            .field("tracked_partitions", &self.shared.registry.len())
            .finish_non_exhaustive()
    }
}

impl Shared {
    pub(crate) fn sweep(&self) -> SweepReport {
        let now = self.clock.instant();
        let idle_since = now.checked_sub(self.idle_eviction);
        let mut report = SweepReport::default();

        for (scope, partition) in self.registry.partitions() {
            for context in partition.contexts() {
                if context.promote_if_expired(now, &self.policy, || partition.release_unavailable(context.endpoint())) {
                    report.promoted += 1;
                    self.telemetry.report_tentative(&scope, context.endpoint());
                }
            }

            if let Some(idle_since) = idle_since
                && self.registry.evict_if_idle(&scope, idle_since)
            {
                report.evicted += 1;
                self.telemetry.report_evicted(&scope);
            }
        }

        report
    }
}

impl Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("registry", &self.registry)
            .field("policy", &self.policy)
            .field("sweep_interval", &self.sweep_interval)
            .field("idle_eviction", &self.idle_eviction)
            .finish_non_exhaustive()
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    promoted: usize,
    evicted: usize,
}

impl SweepReport {
    /// Number of regions moved from `Unavailable` to `HealthyTentative`.
    #[must_use]
    pub const fn promoted(&self) -> usize {
        self.promoted
    }

    /// Number of idle partition scopes forgotten.
    #[must_use]
    pub const fn evicted(&self) -> usize {
        self.evicted
    }
}

/// Builder for [`PartitionCircuitBreaker`].
pub struct PartitionCircuitBreakerBuilder {
    clock: Clock,
    directory: Arc<dyn EndpointDirectory>,
    resolver: Option<Arc<dyn RegionNameResolver>>,
    config: CircuitBreakerConfig,
    unavailability_duration: Duration,
    sweep_interval: Duration,
    idle_eviction: Duration,
    logs_enabled: bool,
}

impl PartitionCircuitBreakerBuilder {
    /// Sets the policy configuration. The default configuration is disabled.
    #[must_use]
    pub fn config(mut self, config: CircuitBreakerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the resolver used to report unavailable regions by name.
    #[must_use]
    pub fn region_name_resolver(mut self, resolver: Arc<dyn RegionNameResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Sets how long a region stays unavailable before the sweep makes it tentative.
    ///
    /// **Default**: 60 seconds
    #[must_use]
    pub fn unavailability_duration(mut self, duration: Duration) -> Self {
        self.unavailability_duration = duration;
        self
    }

    /// Sets the interval of the background sweep started by [`PartitionCircuitBreaker::start`].
    ///
    /// **Default**: 5 seconds
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets how long a fully healthy scope stays tracked without any outcome being reported.
    ///
    /// **Default**: 30 minutes
    #[must_use]
    pub fn idle_eviction(mut self, duration: Duration) -> Self {
        self.idle_eviction = duration;
        self
    }

    /// Enables or disables structured log events for health transitions.
    ///
    /// **Default**: disabled
    #[must_use]
    pub fn enable_logs(mut self, enabled: bool) -> Self {
        self.logs_enabled = enabled;
        self
    }

    /// Builds the circuit breaker.
    #[must_use]
    pub fn build(self) -> PartitionCircuitBreaker {
        PartitionCircuitBreaker {
            shared: Arc::new(Shared {
                registry: PartitionHealthRegistry::default(),
                policy: CircuitBreakerPolicy::new(self.config, self.unavailability_duration),
                directory: self.directory,
                resolver: self.resolver,
                clock: self.clock,
                sweep_interval: self.sweep_interval,
                idle_eviction: self.idle_eviction,
                telemetry: BreakerTelemetry {
                    logs_enabled: self.logs_enabled,
                },
                sweep_task: Mutex::new(None),
            }),
        }
    }
}

impl Debug for PartitionCircuitBreakerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionCircuitBreakerBuilder")
            .field("config", &self.config)
            .field("unavailability_duration", &self.unavailability_duration)
            .field("sweep_interval", &self.sweep_interval)
            .field("idle_eviction", &self.idle_eviction)
            .field("logs_enabled", &self.logs_enabled)
            .finish_non_exhaustive()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use tick::ClockControl;
    use tracing_subscriber::util::SubscriberInitExt;

    use super::*;
    use crate::LocationHealthState;
    use crate::testing::{LogCapture, directory, endpoint, scope};

    static_assertions::assert_impl_all!(PartitionCircuitBreaker: Send, Sync, Clone, Debug);

    fn breaker(control: &ClockControl, regions: &[&str]) -> PartitionCircuitBreaker {
        let directory = Arc::new(directory(regions));

        PartitionCircuitBreaker::builder(control.to_clock(), Arc::<crate::StaticEndpointDirectory>::clone(&directory))
            .region_name_resolver(directory)
            .config(
                CircuitBreakerConfig::default()
                    .enabled(true)
                    .tolerated_read_exceptions(2)
                    .tolerated_write_exceptions(1),
            )
            .build()
    }

    fn fail(breaker: &PartitionCircuitBreaker, scope: &PartitionScope, region: &RegionEndpoint, times: u32) -> HealthTransition {
        let mut last = HealthTransition::Unchanged;
        for _ in 0..times {
            last = breaker.handle_location_exception(scope, region, OperationKind::Read);
        }
        last
    }

    #[test]
    fn disabled_breaker_records_nothing() {
        let control = ClockControl::new();
        let breaker = PartitionCircuitBreaker::builder(control.to_clock(), Arc::new(directory(&["a", "b"]))).build();

        assert!(!breaker.is_enabled());
        assert_eq!(fail(&breaker, &scope("c", "0"), &endpoint("a"), 100), HealthTransition::Unchanged);
        assert_eq!(breaker.tracked_partitions(), 0);
        assert!(breaker.unavailable_regions(&scope("c", "0"), OperationKind::Read).is_empty());
    }

    #[test]
    fn unavailable_region_is_filtered() {
        let control = ClockControl::new();
        let breaker = breaker(&control, &["a", "b", "c"]);
        let scope = scope("c", "0");

        assert_eq!(fail(&breaker, &scope, &endpoint("b"), 3), HealthTransition::MarkedUnavailable);

        assert_eq!(breaker.unavailable_regions(&scope, OperationKind::Read), vec![endpoint("b")]);
        assert_eq!(
            breaker.applicable_endpoints(&[endpoint("c"), endpoint("b"), endpoint("a")], &scope, OperationKind::Read),
            vec![endpoint("c"), endpoint("a")]
        );
        assert_eq!(
            breaker.unavailable_region_names("c", scope.range(), OperationKind::Read),
            vec!["b".to_string()]
        );
    }

    #[test]
    fn applicable_endpoints_never_empty() {
        let control = ClockControl::new();
        let breaker = breaker(&control, &["a", "b"]);
        let scope = scope("c", "0");
        fail(&breaker, &scope, &endpoint("a"), 3);

        let preferred = [endpoint("a")];

        assert_eq!(breaker.applicable_endpoints(&preferred, &scope, OperationKind::Read), preferred.to_vec());
    }

    #[test]
    fn last_available_region_fails_open() {
        let control = ClockControl::new();
        let breaker = breaker(&control, &["a", "b"]);
        let scope = scope("c", "0");

        assert_eq!(fail(&breaker, &scope, &endpoint("a"), 3), HealthTransition::MarkedUnavailable);
        assert_eq!(fail(&breaker, &scope, &endpoint("b"), 3), HealthTransition::FailOpen);

        let snapshot = breaker.snapshot(&scope);
        assert_eq!(snapshot[&endpoint("b")].state(), LocationHealthState::HealthyWithFailures);
        assert_eq!(breaker.unavailable_regions(&scope, OperationKind::Read), vec![endpoint("a")]);
    }

    #[test]
    fn write_thresholds_apply_to_writes() {
        let control = ClockControl::new();
        let breaker = breaker(&control, &["a", "b"]);
        let scope = scope("c", "0");

        assert_eq!(
            breaker.handle_location_exception(&scope, &endpoint("a"), OperationKind::Write),
            HealthTransition::Degraded
        );
        assert_eq!(
            breaker.handle_location_exception(&scope, &endpoint("a"), OperationKind::Write),
            HealthTransition::MarkedUnavailable
        );
        assert_eq!(breaker.unavailable_regions(&scope, OperationKind::Write), vec![endpoint("a")]);
    }

    #[test]
    fn sweep_promotes_after_cool_down() {
        let control = ClockControl::new();
        let breaker = breaker(&control, &["a", "b"]);
        let scope = scope("c", "0");
        fail(&breaker, &scope, &endpoint("a"), 3);

        control.advance(Duration::from_secs(59));
        assert_eq!(breaker.sweep().promoted(), 0);

        control.advance(Duration::from_secs(1));
        assert_eq!(breaker.sweep().promoted(), 1);
        assert_eq!(breaker.snapshot(&scope)[&endpoint("a")].state(), LocationHealthState::HealthyTentative);
        assert!(breaker.unavailable_regions(&scope, OperationKind::Read).is_empty());
    }

    #[test]
    fn sweep_keeps_partitions_with_streaks() {
        let control = ClockControl::new();
        let breaker = breaker(&control, &["a", "b"]);
        let busy = scope("c", "0");
        let idle = scope("c", "1");

        breaker.handle_location_success(&idle, &endpoint("a"), OperationKind::Read);
        fail(&breaker, &busy, &endpoint("a"), 1);

        // a success streak is still information
        control.advance(Duration::from_secs(31 * 60));
        assert_eq!(breaker.sweep().evicted(), 0);

        assert!(breaker.remove_partition(&idle));
        assert_eq!(breaker.tracked_partitions(), 1);
    }

    #[test]
    fn sweep_evicts_untouched_clean_partitions() {
        let control = ClockControl::new();
        let breaker = breaker(&control, &["a", "b"]);
        let scope = scope("c", "0");

        // degrade then recover, leaving clean counters
        fail(&breaker, &scope, &endpoint("a"), 2);
        for _ in 0..2 {
            breaker.handle_location_success(&scope, &endpoint("a"), OperationKind::Read);
        }
        assert_eq!(breaker.snapshot(&scope)[&endpoint("a")].state(), LocationHealthState::Healthy);

        control.advance(Duration::from_secs(29 * 60));
        assert_eq!(breaker.sweep().evicted(), 0);

        control.advance(Duration::from_secs(60));
        assert_eq!(breaker.sweep().evicted(), 1);
        assert_eq!(breaker.tracked_partitions(), 0);
    }

    #[test]
    fn transitions_emit_logs() {
        let log_capture = LogCapture::default();
        let _guard = log_capture.subscriber().set_default();

        let control = ClockControl::new();
        let directory = Arc::new(directory(&["a", "b"]));
        let breaker = PartitionCircuitBreaker::builder(control.to_clock(), directory)
            .config(CircuitBreakerConfig::default().enabled(true).tolerated_read_exceptions(1))
            .enable_logs(true)
            .build();
        let scope = scope("coll", "7");

        fail(&breaker, &scope, &endpoint("a"), 2);
        fail(&breaker, &scope, &endpoint("b"), 2);
        control.advance(Duration::from_secs(60));
        breaker.sweep();

        log_capture.assert_contains("partition_breaker::breaker::telemetry");
        log_capture.assert_contains("healthy_with_failures");
        log_capture.assert_contains("unavailable");
        log_capture.assert_contains("location.fail_open=true");
        log_capture.assert_contains("healthy_tentative");
        log_capture.assert_contains("partition.scope=coll/7");
        log_capture.assert_contains("location.endpoint=https://a.example.com");
    }

    #[test]
    fn logs_disabled_by_default() {
        let log_capture = LogCapture::default();
        let _guard = log_capture.subscriber().set_default();

        let control = ClockControl::new();
        let breaker = breaker(&control, &["a", "b"]);
        fail(&breaker, &scope("c", "0"), &endpoint("a"), 3);

        assert_eq!(log_capture.output(), "");
    }

    #[tokio::test]
    async fn start_and_stop_sweep_task() {
        let control = ClockControl::new();
        let breaker = breaker(&control, &["a", "b"]);
        let spawner = Spawner::new_tokio();

        breaker.start(&spawner);
        breaker.start(&spawner);

        let handle = breaker.stop().unwrap();
        handle.await;

        assert!(breaker.stop().is_none());
    }
}
