// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Configuration of the circuit breaker and of session-consistency retries.
//!
//! Both structures are plain values injected at construction time. They are usually built in
//! code, but can also be loaded from the JSON documents the database client accepts, using the
//! same camel-cased keys:
//!
//! ```
//! use partition_breaker::CircuitBreakerConfig;
//!
//! let config = CircuitBreakerConfig::from_json(
//!     r#"{
//!         "isPartitionLevelCircuitBreakerEnabled": true,
//!         "circuitBreakerType": "CONSECUTIVE_EXCEPTION_COUNT_BASED",
//!         "consecutiveExceptionCountToleratedForReads": 10,
//!         "consecutiveExceptionCountToleratedForWrites": 5
//!     }"#,
//! )?;
//!
//! assert!(config.is_enabled());
//! # Ok::<(), partition_breaker::ConfigError>(())
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_MAX_RETRIES_IN_LOCAL_REGION, DEFAULT_SESSION_INITIAL_BACKOFF, DEFAULT_SESSION_MAX_BACKOFF,
    DEFAULT_SESSION_WAIT_TIME, DEFAULT_TOLERATED_READ_EXCEPTIONS, DEFAULT_TOLERATED_WRITE_EXCEPTIONS,
};
use crate::{ConfigError, OperationKind};

const CONSECUTIVE_EXCEPTION_COUNT_BASED: &str = "CONSECUTIVE_EXCEPTION_COUNT_BASED";

/// The algorithm used to decide when a region is degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CircuitBreakerType {
    /// Regions are downgraded after a number of consecutive exceptions.
    #[default]
    ConsecutiveExceptionCountBased,
}

impl CircuitBreakerType {
    /// Returns the configuration name of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConsecutiveExceptionCountBased => CONSECUTIVE_EXCEPTION_COUNT_BASED,
        }
    }
}

impl TryFrom<&str> for CircuitBreakerType {
    type Error = ConfigError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            CONSECUTIVE_EXCEPTION_COUNT_BASED => Ok(Self::ConsecutiveExceptionCountBased),
            other => Err(ConfigError::UnsupportedBreakerType(other.to_string())),
        }
    }
}

/// Policy parameters of the partition-level circuit breaker.
///
/// The default configuration is disabled; a disabled breaker records nothing and never reports a
/// region as unavailable.
///
/// # Examples
///
/// ```
/// use partition_breaker::{CircuitBreakerConfig, OperationKind};
///
/// let config = CircuitBreakerConfig::default()
///     .enabled(true)
///     .tolerated_write_exceptions(3);
///
/// assert_eq!(config.tolerated_exceptions(OperationKind::Read), 10);
/// assert_eq!(config.tolerated_exceptions(OperationKind::Write), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCircuitBreakerConfig", into = "RawCircuitBreakerConfig")]
pub struct CircuitBreakerConfig {
    enabled: bool,
    breaker_type: CircuitBreakerType,
    tolerated_read_exceptions: u32,
    tolerated_write_exceptions: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            breaker_type: CircuitBreakerType::ConsecutiveExceptionCountBased,
            tolerated_read_exceptions: DEFAULT_TOLERATED_READ_EXCEPTIONS,
            tolerated_write_exceptions: DEFAULT_TOLERATED_WRITE_EXCEPTIONS,
        }
    }
}

impl CircuitBreakerConfig {
    /// Parses and validates a JSON configuration document.
    ///
    /// Missing keys take their default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed, names an unsupported breaker type, or sets a
    /// threshold below 1.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawCircuitBreakerConfig = serde_json::from_str(json)?;
        raw.try_into()
    }

    /// Enables or disables the circuit breaker.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the number of consecutive read exceptions tolerated by a region. Values below 1 are
    /// raised to 1.
    #[must_use]
    pub fn tolerated_read_exceptions(mut self, count: u32) -> Self {
        self.tolerated_read_exceptions = count.max(1);
        self
    }

    /// Sets the number of consecutive write exceptions tolerated by a region. Values below 1 are
    /// raised to 1.
    #[must_use]
    pub fn tolerated_write_exceptions(mut self, count: u32) -> Self {
        self.tolerated_write_exceptions = count.max(1);
        self
    }

    /// Returns `true` if the circuit breaker is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The algorithm used to decide when a region is degraded.
    #[must_use]
    pub const fn breaker_type(&self) -> CircuitBreakerType {
        self.breaker_type
    }

    /// The number of consecutive exceptions tolerated for operations of the given kind.
    #[must_use]
    pub const fn tolerated_exceptions(&self, kind: OperationKind) -> u32 {
        match kind {
            OperationKind::Read => self.tolerated_read_exceptions,
            OperationKind::Write => self.tolerated_write_exceptions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawCircuitBreakerConfig {
    is_partition_level_circuit_breaker_enabled: bool,
    circuit_breaker_type: String,
    consecutive_exception_count_tolerated_for_reads: u32,
    consecutive_exception_count_tolerated_for_writes: u32,
}

impl Default for RawCircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfig::default().into()
    }
}

impl TryFrom<RawCircuitBreakerConfig> for CircuitBreakerConfig {
    type Error = ConfigError;

    fn try_from(raw: RawCircuitBreakerConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            enabled: raw.is_partition_level_circuit_breaker_enabled,
            breaker_type: CircuitBreakerType::try_from(raw.circuit_breaker_type.as_str())?,
            tolerated_read_exceptions: validate_threshold(
                "consecutiveExceptionCountToleratedForReads",
                raw.consecutive_exception_count_tolerated_for_reads,
            )?,
            tolerated_write_exceptions: validate_threshold(
                "consecutiveExceptionCountToleratedForWrites",
                raw.consecutive_exception_count_tolerated_for_writes,
            )?,
        })
    }
}

impl From<CircuitBreakerConfig> for RawCircuitBreakerConfig {
    fn from(config: CircuitBreakerConfig) -> Self {
        Self {
            is_partition_level_circuit_breaker_enabled: config.enabled,
            circuit_breaker_type: config.breaker_type.as_str().to_string(),
            consecutive_exception_count_tolerated_for_reads: config.tolerated_read_exceptions,
            consecutive_exception_count_tolerated_for_writes: config.tolerated_write_exceptions,
        }
    }
}

const fn validate_threshold(name: &'static str, value: u32) -> Result<u32, ConfigError> {
    if value == 0 {
        Err(ConfigError::InvalidThreshold { name, value })
    } else {
        Ok(value)
    }
}

/// Whether session-consistency retries exhaust the current region before moving on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegionSwitchHint {
    /// Keep retrying in the current region for the full exponential backoff budget before
    /// switching to the next region.
    #[default]
    LocalRegionPreferred,
    /// Switch to the next region after a small, fixed number of in-region retries.
    RemoteRegionPreferred,
}

/// Tuning of retries for session-token mismatches (`404/1002`).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use partition_breaker::{RegionSwitchHint, SessionRetryConfig};
///
/// let config = SessionRetryConfig::default()
///     .region_switch_hint(RegionSwitchHint::RemoteRegionPreferred)
///     .max_retries_in_local_region(2);
///
/// assert_eq!(config.max_retries_in_local_region_when_remote_region_preferred(), 2);
/// assert_eq!(config.wait_time(), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSessionRetryConfig", into = "RawSessionRetryConfig")]
pub struct SessionRetryConfig {
    region_switch_hint: RegionSwitchHint,
    max_retries_in_local_region: u32,
    wait_time: Duration,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Default for SessionRetryConfig {
    fn default() -> Self {
        Self {
            region_switch_hint: RegionSwitchHint::LocalRegionPreferred,
            max_retries_in_local_region: DEFAULT_MAX_RETRIES_IN_LOCAL_REGION,
            wait_time: DEFAULT_SESSION_WAIT_TIME,
            initial_backoff: DEFAULT_SESSION_INITIAL_BACKOFF,
            max_backoff: DEFAULT_SESSION_MAX_BACKOFF,
        }
    }
}

impl SessionRetryConfig {
    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or the backoff is inconsistent.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawSessionRetryConfig = serde_json::from_str(json)?;
        raw.try_into()
    }

    /// Sets the region switch hint.
    #[must_use]
    pub const fn region_switch_hint(mut self, hint: RegionSwitchHint) -> Self {
        self.region_switch_hint = hint;
        self
    }

    /// Sets the number of in-region retries when remote regions are preferred.
    #[must_use]
    pub const fn max_retries_in_local_region(mut self, retries: u32) -> Self {
        self.max_retries_in_local_region = retries;
        self
    }

    /// Sets the exponential backoff of in-region session retries.
    ///
    /// # Errors
    ///
    /// Returns an error if `initial` is zero or greater than `max`.
    pub fn backoff(mut self, initial: Duration, max: Duration, wait_time: Duration) -> Result<Self, ConfigError> {
        validate_backoff(initial, max)?;
        self.initial_backoff = initial;
        self.max_backoff = max;
        self.wait_time = wait_time;
        Ok(self)
    }

    /// The configured region switch hint.
    #[must_use]
    pub const fn hint(&self) -> RegionSwitchHint {
        self.region_switch_hint
    }

    /// The number of in-region retries when remote regions are preferred.
    #[must_use]
    pub const fn max_retries_in_local_region_when_remote_region_preferred(&self) -> u32 {
        self.max_retries_in_local_region
    }

    /// The total wait window of the in-region exponential backoff.
    #[must_use]
    pub const fn wait_time(&self) -> Duration {
        self.wait_time
    }

    /// The first in-region backoff.
    #[must_use]
    pub const fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// The cap of the in-region backoff.
    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        self.max_backoff
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawSessionRetryConfig {
    region_switch_hint: RegionSwitchHint,
    max_retries_in_local_region_when_remote_region_preferred: u32,
    session_token_mismatch_wait_time_ms: u64,
    session_token_mismatch_initial_backoff_ms: u64,
    session_token_mismatch_max_backoff_ms: u64,
}

impl Default for RawSessionRetryConfig {
    fn default() -> Self {
        SessionRetryConfig::default().into()
    }
}

impl TryFrom<RawSessionRetryConfig> for SessionRetryConfig {
    type Error = ConfigError;

    fn try_from(raw: RawSessionRetryConfig) -> Result<Self, Self::Error> {
        let initial_backoff = Duration::from_millis(raw.session_token_mismatch_initial_backoff_ms);
        let max_backoff = Duration::from_millis(raw.session_token_mismatch_max_backoff_ms);
        validate_backoff(initial_backoff, max_backoff)?;

        Ok(Self {
            region_switch_hint: raw.region_switch_hint,
            max_retries_in_local_region: raw.max_retries_in_local_region_when_remote_region_preferred,
            wait_time: Duration::from_millis(raw.session_token_mismatch_wait_time_ms),
            initial_backoff,
            max_backoff,
        })
    }
}

impl From<SessionRetryConfig> for RawSessionRetryConfig {
    fn from(config: SessionRetryConfig) -> Self {
        Self {
            region_switch_hint: config.region_switch_hint,
            max_retries_in_local_region_when_remote_region_preferred: config.max_retries_in_local_region,
            session_token_mismatch_wait_time_ms: duration_to_millis(config.wait_time),
            session_token_mismatch_initial_backoff_ms: duration_to_millis(config.initial_backoff),
            session_token_mismatch_max_backoff_ms: duration_to_millis(config.max_backoff),
        }
    }
}

fn validate_backoff(initial: Duration, max: Duration) -> Result<(), ConfigError> {
    if initial.is_zero() || initial > max {
        return Err(ConfigError::InvalidBackoff {
            name: "sessionTokenMismatchInitialBackoffMs",
            initial,
            max,
        });
    }

    Ok(())
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
