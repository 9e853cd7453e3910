// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Region-aware retries of a single logical operation.
//!
//! Failures are classified by status and sub-status code, and each class has its own policy:
//!
//! | Failure                     | Policy                        | Region         |
//! |-----------------------------|-------------------------------|----------------|
//! | `404/1002` session mismatch | [`SessionRetryPolicy`]        | same, then next |
//! | `410`, `503`, `403/3`, `408` | [`RegionalFailoverPolicy`]   | next           |
//! | `429` throttled             | [`ThrottlingPolicy`]          | same           |
//! | `449` retry with            | [`RetryWithPolicy`]           | same           |
//!
//! The [`RetryExecutor`] runs the attempts, feeds their outcomes to the circuit breaker and
//! collects the [`RetryContext`] of the operation.

mod backoff;
mod context;
mod executor;
mod options;
mod policy;
mod regional;
mod retry_with;
mod session;
mod throttling;

pub use backoff::ExponentialBackoff;
pub use context::{OperationDiagnostics, RetryContext};
pub use executor::{AttemptTarget, OperationRequest, OperationResponse, RetryExecutor};
pub use options::{RetryOptions, ThrottlingOptions};
pub use policy::{FailedAttempt, OperationRetryPolicy, RetryDecision, RetryPolicy};
pub use regional::RegionalFailoverPolicy;
pub use retry_with::RetryWithPolicy;
pub use session::SessionRetryPolicy;
pub use throttling::ThrottlingPolicy;
