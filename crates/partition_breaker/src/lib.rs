// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Partition-level circuit breaking and region-aware retries for multi-region partitioned
//! databases.
//!
//! A database account replicates every partition to several regions. When one region keeps
//! failing requests for one partition, this crate steers traffic for that partition to the other
//! regions while leaving every other partition untouched.
//!
//! # Core Types
//!
//! - [`PartitionCircuitBreaker`]: tracks the health of every (partition, region) pair and reports
//!   which regions to skip.
//! - [`RetryExecutor`]: drives one logical operation through attempts across regions, feeding the
//!   outcome of every attempt to the circuit breaker.
//! - [`ErrorClass`]: classifies the status and sub-status code of an attempt.
//! - [`CircuitBreakerConfig`] and [`SessionRetryConfig`]: injected configuration values.
//!
//! # Health Tracking
//!
//! Health is tracked per [`PartitionScope`], which is a collection resource id together with a
//! partition key range. A region moves from [`Healthy`][LocationHealthState::Healthy] to
//! [`HealthyWithFailures`][LocationHealthState::HealthyWithFailures] and then to
//! [`Unavailable`][LocationHealthState::Unavailable] as consecutive exceptions pile up. After the
//! cool-down elapses, a background sweep moves it to
//! [`HealthyTentative`][LocationHealthState::HealthyTentative], where a few successes restore it.
//!
//! The breaker fails open: it never reports every applicable region of a scope as unavailable.
//!
//! ```
//! use std::sync::Arc;
//!
//! use partition_breaker::{
//!     CircuitBreakerConfig, OperationKind, PartitionCircuitBreaker, PartitionKeyRange, PartitionScope,
//!     RegionEndpoint, StaticEndpointDirectory,
//! };
//! use tick::Clock;
//!
//! let directory = Arc::new(
//!     StaticEndpointDirectory::builder()
//!         .read_region("West US", "https://westus")
//!         .read_region("East US", "https://eastus")
//!         .build(),
//! );
//!
//! let breaker = PartitionCircuitBreaker::builder(Clock::new_frozen(), directory)
//!     .config(CircuitBreakerConfig::default().enabled(true).tolerated_read_exceptions(2))
//!     .build();
//!
//! let scope = PartitionScope::new("coll", PartitionKeyRange::new("0", "", "FF"));
//! let west = RegionEndpoint::new("https://westus");
//!
//! for _ in 0..3 {
//!     breaker.handle_location_exception(&scope, &west, OperationKind::Read);
//! }
//!
//! assert_eq!(breaker.unavailable_regions(&scope, OperationKind::Read), vec![west]);
//! ```
//!
//! # Retries
//!
//! Each failure class has its own retry budget. Session-token mismatches sweep the applicable
//! regions twice with a short in-region backoff, regional failures move to the next region,
//! throttling waits for the retry-after sent by the service and `449 Retry With` backs off
//! exponentially in the same region. See the [`retry`] module for details.
//!
//! # Logging
//!
//! Both the circuit breaker and the executor emit [`tracing`] events when logs are enabled
//! through [`PartitionCircuitBreakerBuilder::enable_logs`] and [`RetryOptions::enable_logs`].
//! Events carry the partition scope, the region endpoint and the operation kind as fields.

pub mod breaker;
mod config;
mod constants;
mod error;
mod region;
pub mod retry;
mod scope;
mod status;

#[cfg(test)]
mod testing;

pub use breaker::{
    CircuitBreakerPolicy, HealthTransition, LocationHealthSnapshot, LocationHealthState, PartitionCircuitBreaker,
    PartitionCircuitBreakerBuilder, SweepReport,
};
pub use config::{CircuitBreakerConfig, CircuitBreakerType, RegionSwitchHint, SessionRetryConfig};
pub use error::{ConfigError, OperationFailure};
pub use region::{
    EndpointDirectory, OperationKind, RegionEndpoint, RegionNameResolver, StaticEndpointDirectory, StaticEndpointDirectoryBuilder,
};
pub use retry::{
    AttemptTarget, ExponentialBackoff, OperationDiagnostics, OperationRequest, OperationResponse, RetryContext, RetryExecutor,
    RetryOptions, ThrottlingOptions,
};
pub use scope::{PartitionKeyRange, PartitionScope};
pub use status::{ErrorClass, ResponseStatus, StatusCode, SubStatusCode};
