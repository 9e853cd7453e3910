// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Display;
use std::time::Duration;

/// HTTP-style status code returned by the database service for a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusCode(u16);

impl StatusCode {
    /// `200 OK`.
    pub const OK: Self = Self(200);
    /// `403 Forbidden`; with sub-status [`SubStatusCode::WRITE_FORBIDDEN`] the region rejects writes.
    pub const FORBIDDEN: Self = Self(403);
    /// `404 Not Found`; with sub-status [`SubStatusCode::READ_SESSION_NOT_AVAILABLE`] the
    /// replica has not caught up with the caller's session token.
    pub const NOT_FOUND: Self = Self(404);
    /// `408 Request Timeout`.
    pub const REQUEST_TIMEOUT: Self = Self(408);
    /// `410 Gone`.
    pub const GONE: Self = Self(410);
    /// `429 Too Many Requests`.
    pub const TOO_MANY_REQUESTS: Self = Self(429);
    /// `449 Retry With`, a transient write contention signal.
    pub const RETRY_WITH: Self = Self(449);
    /// `503 Service Unavailable`.
    pub const SERVICE_UNAVAILABLE: Self = Self(503);

    /// Creates a status code from its numeric value.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns `true` for `2xx` codes.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }
}

impl Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u16> for StatusCode {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

/// Service-specific refinement of a [`StatusCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SubStatusCode(u32);

impl SubStatusCode {
    /// No sub-status.
    pub const NONE: Self = Self(0);
    /// Sub-status of `403` when the region does not accept writes.
    pub const WRITE_FORBIDDEN: Self = Self(3);
    /// Sub-status of `404` when the session token cannot be honored by the contacted replica.
    pub const READ_SESSION_NOT_AVAILABLE: Self = Self(1002);

    /// Creates a sub-status code from its numeric value.
    #[must_use]
    pub const fn new(code: u32) -> Self {
        Self(code)
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl Display for SubStatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u32> for SubStatusCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Exposes the status of a response or an error produced by a single attempt.
///
/// The retry executor is generic over the success and error types of an operation; both must
/// implement this trait so that every attempt can be classified and recorded.
///
/// # Examples
///
/// ```
/// use partition_breaker::{ResponseStatus, StatusCode, SubStatusCode};
///
/// struct Response;
///
/// impl ResponseStatus for Response {
///     fn status_code(&self) -> StatusCode {
///         StatusCode::OK
///     }
///
///     fn sub_status_code(&self) -> SubStatusCode {
///         SubStatusCode::NONE
///     }
/// }
/// ```
pub trait ResponseStatus {
    /// The status code of the attempt.
    fn status_code(&self) -> StatusCode;

    /// The sub-status code of the attempt.
    fn sub_status_code(&self) -> SubStatusCode;

    /// The delay the service asked the caller to wait before retrying, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Classification of an attempt outcome by how it is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorClass {
    /// The attempt succeeded.
    Success,
    /// `404/1002`: the replica cannot serve the session token yet.
    SessionNotAvailable,
    /// `410`: the replica or partition moved.
    Gone,
    /// `503`: the region cannot serve the request.
    ServiceUnavailable,
    /// `403/3`: the region does not accept writes.
    WriteForbidden,
    /// `408`: the request timed out in the region.
    RequestTimeout,
    /// `429`: the request was throttled.
    Throttled,
    /// `449`: transient write contention.
    RetryWith,
    /// Anything else; surfaced to the caller without a retry.
    NonRetryable,
}

impl ErrorClass {
    /// Classifies the given status and sub-status pair.
    ///
    /// # Examples
    ///
    /// ```
    /// use partition_breaker::{ErrorClass, StatusCode, SubStatusCode};
    ///
    /// let class = ErrorClass::classify(StatusCode::NOT_FOUND, SubStatusCode::READ_SESSION_NOT_AVAILABLE);
    /// assert_eq!(class, ErrorClass::SessionNotAvailable);
    ///
    /// let class = ErrorClass::classify(StatusCode::NOT_FOUND, SubStatusCode::NONE);
    /// assert_eq!(class, ErrorClass::NonRetryable);
    /// ```
    #[must_use]
    pub fn classify(status: StatusCode, sub_status: SubStatusCode) -> Self {
        match (status, sub_status) {
            (status, _) if status.is_success() => Self::Success,
            (StatusCode::NOT_FOUND, SubStatusCode::READ_SESSION_NOT_AVAILABLE) => Self::SessionNotAvailable,
            (StatusCode::GONE, _) => Self::Gone,
            (StatusCode::SERVICE_UNAVAILABLE, _) => Self::ServiceUnavailable,
            (StatusCode::FORBIDDEN, SubStatusCode::WRITE_FORBIDDEN) => Self::WriteForbidden,
            (StatusCode::REQUEST_TIMEOUT, _) => Self::RequestTimeout,
            (StatusCode::TOO_MANY_REQUESTS, _) => Self::Throttled,
            (StatusCode::RETRY_WITH, _) => Self::RetryWith,
            _ => Self::NonRetryable,
        }
    }

    /// Classifies the status reported by a response or error.
    #[must_use]
    pub fn of(outcome: &impl ResponseStatus) -> Self {
        Self::classify(outcome.status_code(), outcome.sub_status_code())
    }

    /// Returns `true` for outcomes that indicate the region itself is degraded.
    ///
    /// Only these outcomes are reported to the circuit breaker as exceptions.
    #[must_use]
    pub fn is_regional_degradation(self) -> bool {
        matches!(
            self,
            Self::Gone | Self::ServiceUnavailable | Self::WriteForbidden | Self::RequestTimeout
        )
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::SessionNotAvailable => "session_not_available",
            Self::Gone => "gone",
            Self::ServiceUnavailable => "service_unavailable",
            Self::WriteForbidden => "write_forbidden",
            Self::RequestTimeout => "request_timeout",
            Self::Throttled => "throttled",
            Self::RetryWith => "retry_with",
            Self::NonRetryable => "non_retryable",
        }
    }
}
