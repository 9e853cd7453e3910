// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{Debug, Display};
use std::time::Duration;

use crate::retry::OperationDiagnostics;

/// An error raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configuration string is not valid JSON or does not match the expected shape.
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// A threshold is outside of its accepted range.
    #[error("{name} must be at least 1, got {value}")]
    InvalidThreshold {
        /// The configuration key.
        name: &'static str,
        /// The rejected value.
        value: u32,
    },

    /// A backoff definition is inconsistent.
    #[error("invalid backoff for {name}: initial {initial:?} must be non-zero and not exceed maximum {max:?}")]
    InvalidBackoff {
        /// The configuration key.
        name: &'static str,
        /// The initial backoff.
        initial: Duration,
        /// The maximum backoff.
        max: Duration,
    },

    /// The circuit breaker type is not supported.
    #[error("unsupported circuit breaker type {0:?}")]
    UnsupportedBreakerType(String),
}

/// The terminal error of an operation driven by the [`RetryExecutor`][crate::RetryExecutor].
///
/// This is the last error observed by the operation, surfaced unchanged: it displays and
/// reports its source exactly like the inner error. The retry history is attached and
/// available through [`OperationFailure::diagnostics`].
pub struct OperationFailure<E> {
    error: E,
    diagnostics: OperationDiagnostics,
}

impl<E> OperationFailure<E> {
    pub(crate) const fn new(error: E, diagnostics: OperationDiagnostics) -> Self {
        Self { error, diagnostics }
    }

    /// The last error observed by the operation.
    pub const fn error(&self) -> &E {
        &self.error
    }

    /// The retry history of the operation.
    pub const fn diagnostics(&self) -> &OperationDiagnostics {
        &self.diagnostics
    }

    /// Returns the last error, discarding the diagnostics.
    pub fn into_inner(self) -> E {
        self.error
    }

    /// Splits the failure into the last error and the diagnostics.
    pub fn into_parts(self) -> (E, OperationDiagnostics) {
        (self.error, self.diagnostics)
    }
}

impl<E: Debug> Debug for OperationFailure<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationFailure")
            .field("error", &self.error)
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

impl<E: Display> Display for OperationFailure<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.error, f)
    }
}

impl<E: std::error::Error> std::error::Error for OperationFailure<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}
