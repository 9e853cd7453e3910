// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-partition, per-region health tracking.
//!
//! Every (partition scope, region) pair moves through four states:
//!
//! ```text
//! Healthy --(allowed exceptions)--> HealthyWithFailures
//! HealthyWithFailures --(successes)--> Healthy
//! HealthyWithFailures --(one more exception)--> Unavailable
//! Unavailable --(cool-down elapsed, sweep)--> HealthyTentative
//! HealthyTentative --(successes)--> Healthy
//! HealthyTentative --(exceptions beyond allowed)--> Unavailable
//! ```
//!
//! Thresholds are kept separately for reads and writes. A region is never marked unavailable if
//! it is the last applicable region left for its scope.

mod health;
mod manager;
mod policy;
mod registry;
mod sweep;
mod telemetry;

pub use health::{HealthTransition, LocationHealthSnapshot, LocationHealthState};
pub use manager::{PartitionCircuitBreaker, PartitionCircuitBreakerBuilder, SweepReport};
pub use policy::CircuitBreakerPolicy;
