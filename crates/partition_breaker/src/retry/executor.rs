// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tick::Clock;

use super::{FailedAttempt, OperationDiagnostics, OperationRetryPolicy, RetryContext, RetryDecision, RetryOptions, RetryPolicy};
use crate::{
    EndpointDirectory, ErrorClass, OperationFailure, OperationKind, PartitionCircuitBreaker, PartitionScope, RegionEndpoint,
    ResponseStatus,
};

/// A logical operation against one partition.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    scope: PartitionScope,
    kind: OperationKind,
    preferred_regions: Option<Vec<RegionEndpoint>>,
}

impl OperationRequest {
    /// Creates a request routed through the regions of the endpoint directory.
    #[must_use]
    pub const fn new(scope: PartitionScope, kind: OperationKind) -> Self {
        Self {
            scope,
            kind,
            preferred_regions: None,
        }
    }

    /// Routes the request through `regions`, in order, instead of the directory's regions.
    #[must_use]
    pub fn preferred_regions(mut self, regions: Vec<RegionEndpoint>) -> Self {
        self.preferred_regions = Some(regions);
        self
    }

    /// The partition the request targets.
    #[must_use]
    pub const fn scope(&self) -> &PartitionScope {
        &self.scope
    }

    /// The kind of the request.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }
}

/// Where and when a single attempt runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptTarget {
    region: Option<RegionEndpoint>,
    index: u32,
    kind: OperationKind,
}

impl AttemptTarget {
    /// The region to contact. `None` when no region is known, in which case the transport uses
    /// the account's default endpoint.
    #[must_use]
    pub const fn region(&self) -> Option<&RegionEndpoint> {
        self.region.as_ref()
    }

    /// Zero-based index of the attempt.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Returns `true` for the first attempt.
    #[must_use]
    pub const fn is_first(&self) -> bool {
        self.index == 0
    }

    /// The kind of the operation.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }
}

/// The successful outcome of an operation, with its retry history.
#[derive(Debug, Clone)]
pub struct OperationResponse<T> {
    value: T,
    diagnostics: OperationDiagnostics,
}

impl<T> OperationResponse<T> {
    /// The response of the successful attempt.
    pub const fn value(&self) -> &T {
        &self.value
    }

    /// The retry history of the operation.
    pub const fn diagnostics(&self) -> &OperationDiagnostics {
        &self.diagnostics
    }

    /// Returns the response, discarding the diagnostics.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Splits the outcome into the response and the diagnostics.
    pub fn into_parts(self) -> (T, OperationDiagnostics) {
        (self.value, self.diagnostics)
    }
}

/// Drives one logical operation through attempts across regions.
///
/// For every attempt the executor picks a region from the applicable regions, minus those the
/// circuit breaker reports unavailable, runs the attempt, records its status in the
/// [`RetryContext`], and reports the outcome to the circuit breaker: successes as successes,
/// regional degradation as exceptions, anything else not at all. It then asks the
/// [`OperationRetryPolicy`] of the operation whether to retry, waits on a non-blocking delay from
/// the [`Clock`], and either retries or surfaces the last error unchanged.
///
/// Dropping the future returned by [`execute`][Self::execute] cancels a pending delay.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use partition_breaker::{
///     OperationKind, OperationRequest, PartitionCircuitBreaker, PartitionKeyRange, PartitionScope, ResponseStatus,
///     RetryExecutor, RetryOptions, StaticEndpointDirectory, StatusCode, SubStatusCode,
/// };
/// use tick::Clock;
///
/// #[derive(Debug)]
/// struct Status(StatusCode);
///
/// impl ResponseStatus for Status {
///     fn status_code(&self) -> StatusCode {
///         self.0
///     }
///
///     fn sub_status_code(&self) -> SubStatusCode {
///         SubStatusCode::NONE
///     }
/// }
///
/// # futures::executor::block_on(async {
/// let clock = Clock::new_frozen();
/// let directory = Arc::new(StaticEndpointDirectory::builder().read_region("West US", "https://westus").build());
/// let breaker = PartitionCircuitBreaker::builder(clock.clone(), directory.clone()).build();
/// let executor = RetryExecutor::new(breaker, directory, clock, RetryOptions::default());
///
/// let request = OperationRequest::new(
///     PartitionScope::new("coll", PartitionKeyRange::new("0", "", "FF")),
///     OperationKind::Read,
/// );
///
/// let response = executor
///     .execute(&request, |_target| async { Ok::<_, Status>(Status(StatusCode::OK)) })
///     .await?;
///
/// assert_eq!(response.diagnostics().retry_context().attempts(), 1);
/// # Ok::<(), partition_breaker::OperationFailure<Status>>(())
/// # }).unwrap();
/// ```
#[derive(Clone)]
pub struct RetryExecutor {
    breaker: PartitionCircuitBreaker,
    directory: Arc<dyn EndpointDirectory>,
    clock: Clock,
    options: RetryOptions,
}

impl RetryExecutor {
    /// Creates an executor that reports outcomes to `breaker` and routes through the regions of
    /// `directory`.
    #[must_use]
    pub fn new(breaker: PartitionCircuitBreaker, directory: Arc<dyn EndpointDirectory>, clock: Clock, options: RetryOptions) -> Self {
        Self {
            breaker,
            directory,
            clock,
            options,
        }
    }

    /// The circuit breaker outcomes are reported to.
    #[must_use]
    pub const fn breaker(&self) -> &PartitionCircuitBreaker {
        &self.breaker
    }

    /// Runs `operation` until it succeeds, fails with an error that is not retried, or exhausts
    /// the retry budget for its error.
    ///
    /// # Errors
    ///
    /// Returns the last error of the operation, with the retry history attached.
    pub async fn execute<T, E, F, Fut>(&self, request: &OperationRequest, mut operation: F) -> Result<OperationResponse<T>, OperationFailure<E>>
    where
        T: ResponseStatus,
        E: ResponseStatus,
        F: FnMut(AttemptTarget) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let stopwatch = self.clock.stopwatch();
        let mut policy = OperationRetryPolicy::new(&self.options);
        let mut run = Run::default();

        loop {
            let preferred = self.preferred_regions(request);
            let regions = self.breaker.applicable_endpoints(&preferred, &request.scope, request.kind);
            let region = select_region(&preferred, &regions, run.current.as_ref(), run.next);

            if let Some(region) = &region
                && !run.contacted.contains(region)
            {
                run.contacted.push(region.clone());
            }

            let target = AttemptTarget {
                region: region.clone(),
                index: run.attempt,
                kind: request.kind,
            };
            run.current = region;

            let outcome = operation(target.clone()).await;

            match self.evaluate(request, &target, outcome, &mut run.context, &mut policy, regions.len(), stopwatch.elapsed()) {
                ControlFlow::Continue(decision) => {
                    run.next = match decision {
                        RetryDecision::RetryNextRegion { .. } => NextRegion::Following,
                        _ => NextRegion::Same,
                    };

                    if let Some(delay) = decision.delay()
                        && !delay.is_zero()
                    {
                        self.clock.delay(delay).await;
                    }

                    run.attempt = run.attempt.saturating_add(1);
                }
                ControlFlow::Break(result) => {
                    let diagnostics = OperationDiagnostics::new(run.context, run.contacted, stopwatch.elapsed());

                    return match result {
                        Ok(value) => Ok(OperationResponse { value, diagnostics }),
                        Err(error) => Err(OperationFailure::new(error, diagnostics)),
                    };
                }
            }
        }
    }

    fn preferred_regions(&self, request: &OperationRequest) -> Vec<RegionEndpoint> {
        match &request.preferred_regions {
            Some(preferred) => preferred.clone(),
            None => self.directory.applicable_endpoints(request.kind),
        }
    }

    #[expect(clippy::too_many_arguments, reason = "internal helper of the retry loop")]
    fn evaluate<T: ResponseStatus, E: ResponseStatus>(
        &self,
        request: &OperationRequest,
        target: &AttemptTarget,
        outcome: Result<T, E>,
        context: &mut RetryContext,
        policy: &mut OperationRetryPolicy,
        regions: usize,
        elapsed: Duration,
    ) -> ControlFlow<Result<T, E>, RetryDecision> {
        let error = match outcome {
            Ok(value) => {
                context.record(value.status_code(), value.sub_status_code());

                if let Some(region) = target.region() {
                    self.breaker.handle_location_success(&request.scope, region, request.kind);
                }

                return ControlFlow::Break(Ok(value));
            }
            Err(error) => error,
        };

        context.record(error.status_code(), error.sub_status_code());
        let class = ErrorClass::of(&error);

        if let Some(region) = target.region()
            && class.is_regional_degradation()
        {
            self.breaker.handle_location_exception(&request.scope, region, request.kind);
        }

        let decision = policy.should_retry(&FailedAttempt::new(class, error.retry_after(), regions));

        let Some(delay) = decision.delay() else {
            if class != ErrorClass::NonRetryable {
                self.emit_exhausted(request, target, &error, class);
            }
            return ControlFlow::Break(Err(error));
        };

        if let Some(timeout) = self.options.timeout()
            && elapsed.saturating_add(delay) >= timeout
        {
            self.emit_exhausted(request, target, &error, class);
            return ControlFlow::Break(Err(error));
        }

        self.emit_retry(request, target, &error, decision, delay);
        ControlFlow::Continue(decision)
    }

    fn emit_retry(&self, request: &OperationRequest, target: &AttemptTarget, error: &impl ResponseStatus, decision: RetryDecision, delay: Duration) {
        if self.options.logs_enabled() {
            tracing::event!(
                name: "partition_breaker.retry",
                tracing::Level::INFO,
                partition.scope = %request.scope,
                operation.kind = request.kind.as_str(),
                location.endpoint = target.region().map(RegionEndpoint::as_str),
                retry.attempt = target.index(),
                retry.status = error.status_code().as_u16(),
                retry.sub_status = error.sub_status_code().as_u32(),
                retry.delay = delay.as_secs_f32(),
                retry.next_region = matches!(decision, RetryDecision::RetryNextRegion { .. }),
            );
        }
    }

    fn emit_exhausted(&self, request: &OperationRequest, target: &AttemptTarget, error: &impl ResponseStatus, class: ErrorClass) {
        if self.options.logs_enabled() {
            tracing::event!(
                name: "partition_breaker.retry.exhausted",
                tracing::Level::WARN,
                partition.scope = %request.scope,
                operation.kind = request.kind.as_str(),
                location.endpoint = target.region().map(RegionEndpoint::as_str),
                retry.attempt = target.index(),
                retry.status = error.status_code().as_u16(),
                retry.sub_status = error.sub_status_code().as_u32(),
                retry.error_class = class.as_str(),
            );
        }
    }
}

impl Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("breaker", &self.breaker)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Mutable state of one execution.
#[derive(Debug, Default)]
struct Run {
    context: RetryContext,
    contacted: Vec<RegionEndpoint>,
    current: Option<RegionEndpoint>,
    next: NextRegion,
    attempt: u32,
}

/// Where the next attempt goes, relative to the region of the previous one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum NextRegion {
    #[default]
    First,
    Same,
    Following,
}

/// Picks the region of the next attempt.
///
/// A same-region retry stays on `current` even if the breaker has taken it out in the meantime.
/// A failover walks `preferred` cyclically from `current` and takes the first region that is
/// still in `applicable`. Without a usable `current`, the first applicable region is used.
fn select_region(
    preferred: &[RegionEndpoint],
    applicable: &[RegionEndpoint],
    current: Option<&RegionEndpoint>,
    next: NextRegion,
) -> Option<RegionEndpoint> {
    let first = || applicable.first().cloned();

    let Some(current) = current else {
        return first();
    };

    match next {
        NextRegion::First => first(),
        NextRegion::Same => Some(current.clone()),
        NextRegion::Following => {
            let Some(position) = preferred.iter().position(|region| region == current) else {
                return first();
            };

            preferred
                .iter()
                .cycle()
                .skip(position + 1)
                .take(preferred.len())
                .find(|region| applicable.contains(region))
                .cloned()
                .or_else(first)
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tick::ClockControl;
    use tracing_subscriber::util::SubscriberInitExt;

    use super::*;
    use crate::testing::{LogCapture, directory, endpoint, scope};
    use crate::{CircuitBreakerConfig, StatusCode, SubStatusCode};

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Status {
        code: StatusCode,
        sub_status: SubStatusCode,
        retry_after: Option<Duration>,
    }

    impl Status {
        fn new(code: u16, sub_status: u32) -> Self {
            Self {
                code: StatusCode::new(code),
                sub_status: SubStatusCode::new(sub_status),
                retry_after: None,
            }
        }
    }

    impl ResponseStatus for Status {
        fn status_code(&self) -> StatusCode {
            self.code
        }

        fn sub_status_code(&self) -> SubStatusCode {
            self.sub_status
        }

        fn retry_after(&self) -> Option<Duration> {
            self.retry_after
        }
    }

    fn executor(control: &ClockControl, regions: &[&str], options: RetryOptions) -> RetryExecutor {
        let directory = Arc::new(directory(regions));
        let clock = control.to_clock();
        let breaker = PartitionCircuitBreaker::builder(clock.clone(), Arc::clone(&directory) as Arc<dyn EndpointDirectory>)
            .config(CircuitBreakerConfig::default().enabled(true))
            .build();

        RetryExecutor::new(breaker, directory, clock, options)
    }

    fn request() -> OperationRequest {
        OperationRequest::new(scope("coll", "0"), OperationKind::Read)
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let control = ClockControl::new();
        let executor = executor(&control, &["a", "b"], RetryOptions::default());

        let response = executor
            .execute(&request(), |target| async move {
                assert!(target.is_first());
                assert_eq!(target.region(), Some(&endpoint("a")));
                Ok::<_, Status>(Status::new(200, 0))
            })
            .await
            .unwrap();

        assert_eq!(response.value(), &Status::new(200, 0));
        assert_eq!(response.diagnostics().retry_context().statuses(), &[(StatusCode::OK, SubStatusCode::NONE)]);
        assert_eq!(response.diagnostics().regions_contacted(), &[endpoint("a")]);
    }

    #[tokio::test]
    async fn non_retryable_error_surfaces_immediately() {
        let control = ClockControl::new();
        let executor = executor(&control, &["a", "b"], RetryOptions::default());
        let mut calls = 0;

        let failure = executor
            .execute(&request(), |_| {
                calls += 1;
                async { Err::<Status, _>(Status::new(400, 0)) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls, 1);
        assert_eq!(failure.error(), &Status::new(400, 0));
        assert_eq!(failure.diagnostics().retry_context().attempts(), 1);
    }

    #[tokio::test]
    async fn regional_failure_moves_to_next_region() {
        let control = ClockControl::new();
        let executor = executor(&control, &["a", "b", "c"], RetryOptions::default());
        let targets = Mutex::new(Vec::new());

        let response = executor
            .execute(&request(), |target| {
                targets.lock().unwrap().push(target.region().cloned());
                async move {
                    if target.index() < 2 {
                        Err(Status::new(503, 0))
                    } else {
                        Ok(Status::new(200, 0))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(
            targets.into_inner().unwrap(),
            vec![Some(endpoint("a")), Some(endpoint("b")), Some(endpoint("c"))]
        );
        assert_eq!(response.diagnostics().retry_context().retry_count(), 2);
        assert_eq!(response.diagnostics().regions_contacted().len(), 3);

        let snapshot = executor.breaker().snapshot(&scope("coll", "0"));
        assert_eq!(snapshot[&endpoint("a")].consecutive_exception_count(OperationKind::Read), 1);
        assert_eq!(snapshot[&endpoint("c")].consecutive_success_count(OperationKind::Read), 1);
    }

    #[tokio::test]
    async fn throttling_waits_for_retry_after() {
        let control = ClockControl::default().auto_advance_timers(true);
        let executor = executor(&control, &["a"], RetryOptions::default());
        let clock = control.to_clock();
        let start = clock.instant();

        let response = executor
            .execute(&request(), |target| async move {
                if target.is_first() {
                    Err(Status {
                        retry_after: Some(Duration::from_secs(2)),
                        ..Status::new(429, 3200)
                    })
                } else {
                    Ok(Status::new(200, 0))
                }
            })
            .await
            .unwrap();

        assert_eq!(clock.instant().duration_since(start), Duration::from_secs(2));
        assert_eq!(response.diagnostics().retry_context().attempts(), 2);

        // throttling never reaches the breaker
        let snapshot = executor.breaker().snapshot(&scope("coll", "0"));
        assert_eq!(snapshot[&endpoint("a")].consecutive_exception_count(OperationKind::Read), 0);
    }

    #[tokio::test]
    async fn end_to_end_timeout_stops_scheduling() {
        let control = ClockControl::default().auto_advance_timers(true);
        let options = RetryOptions::default().end_to_end_timeout(Duration::from_millis(2500));
        let executor = executor(&control, &["a"], options);
        let mut calls = 0;

        let failure = executor
            .execute(&request(), |_| {
                calls += 1;
                async {
                    Err::<Status, _>(Status {
                        retry_after: Some(Duration::from_secs(1)),
                        ..Status::new(429, 0)
                    })
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls, 3);
        assert_eq!(failure.diagnostics().retry_context().attempts(), 3);
        assert_eq!(failure.diagnostics().elapsed(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn no_regions_uses_default_endpoint() {
        let control = ClockControl::new();
        let executor = executor(&control, &[], RetryOptions::default());

        let response = executor
            .execute(&request(), |target| async move {
                assert_eq!(target.region(), None);
                Ok::<_, Status>(Status::new(200, 0))
            })
            .await
            .unwrap();

        assert!(response.diagnostics().regions_contacted().is_empty());
    }

    #[test]
    fn failover_follows_preferred_order_past_removed_regions() {
        let [a, b, c] = [endpoint("a"), endpoint("b"), endpoint("c")];
        let preferred = [a.clone(), b.clone(), c.clone()];

        // "a" was just taken out, the next region is still "b"
        assert_eq!(
            select_region(&preferred, &[b.clone(), c.clone()], Some(&a), NextRegion::Following),
            Some(b.clone())
        );
        assert_eq!(
            select_region(&preferred, &[a.clone(), c.clone()], Some(&a), NextRegion::Following),
            Some(c.clone())
        );
        assert_eq!(
            select_region(&preferred, &[a.clone(), b.clone()], Some(&c), NextRegion::Following),
            Some(a.clone())
        );
        assert_eq!(
            select_region(&[a.clone()], &[a.clone()], Some(&a), NextRegion::Following),
            Some(a.clone())
        );
    }

    #[test]
    fn same_region_retry_ignores_shrinking_list() {
        let [a, b, c] = [endpoint("a"), endpoint("b"), endpoint("c")];
        let preferred = [a.clone(), b.clone(), c.clone()];

        assert_eq!(
            select_region(&preferred, &[b.clone(), c.clone()], Some(&b), NextRegion::Same),
            Some(b.clone())
        );
        assert_eq!(
            select_region(&preferred, &[a.clone(), c.clone()], Some(&b), NextRegion::Same),
            Some(b)
        );
    }

    #[test]
    fn unknown_current_region_falls_back_to_first() {
        let [a, b, c] = [endpoint("a"), endpoint("b"), endpoint("c")];

        assert_eq!(select_region(&[a.clone(), b.clone()], &[b.clone()], None, NextRegion::First), Some(b.clone()));
        assert_eq!(
            select_region(&[a.clone(), b.clone()], &[a.clone(), b.clone()], Some(&c), NextRegion::Following),
            Some(a)
        );
        assert_eq!(select_region(&[], &[], Some(&b), NextRegion::Following), None);
    }

    #[tokio::test]
    async fn retries_emit_logs() {
        let log_capture = LogCapture::default();
        let _guard = log_capture.subscriber().set_default();

        let control = ClockControl::default().auto_advance_timers(true);
        let options = RetryOptions::default().enable_logs(true).max_failovers(1);
        let executor = executor(&control, &["a", "b"], options);

        _ = executor
            .execute(&request(), |_| async { Err::<Status, _>(Status::new(410, 0)) })
            .await
            .unwrap_err();

        log_capture.assert_contains("partition_breaker::retry::executor");
        log_capture.assert_contains("partition.scope=coll/0");
        log_capture.assert_contains("retry.status=410");
        log_capture.assert_contains("retry.next_region=true");
        log_capture.assert_contains("retry.error_class=\"gone\"");
    }
}
