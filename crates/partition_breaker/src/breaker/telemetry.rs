// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::{HealthTransition, LocationHealthState, OperationKind, PartitionScope, RegionEndpoint};

/// Emits structured events for health transitions of the circuit breaker.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BreakerTelemetry {
    pub logs_enabled: bool,
}

impl BreakerTelemetry {
    pub fn report(
        self,
        transition: HealthTransition,
        scope: &PartitionScope,
        endpoint: &RegionEndpoint,
        kind: OperationKind,
    ) {
        if !self.logs_enabled {
            return;
        }

        match transition {
            HealthTransition::Degraded => {
                tracing::event!(
                    name: "partition_breaker.location.degraded",
                    tracing::Level::WARN,
                    partition.scope = %scope,
                    location.endpoint = %endpoint,
                    location.state = LocationHealthState::HealthyWithFailures.as_str(),
                    operation.kind = kind.as_str(),
                );
            }
            HealthTransition::MarkedUnavailable => {
                tracing::event!(
                    name: "partition_breaker.location.unavailable",
                    tracing::Level::WARN,
                    partition.scope = %scope,
                    location.endpoint = %endpoint,
                    location.state = LocationHealthState::Unavailable.as_str(),
                    operation.kind = kind.as_str(),
                );
            }
            HealthTransition::FailOpen => {
                tracing::event!(
                    name: "partition_breaker.location.fail_open",
                    tracing::Level::WARN,
                    partition.scope = %scope,
                    location.endpoint = %endpoint,
                    location.fail_open = true,
                    operation.kind = kind.as_str(),
                );
            }
            HealthTransition::Recovered => {
                tracing::event!(
                    name: "partition_breaker.location.recovered",
                    tracing::Level::INFO,
                    partition.scope = %scope,
                    location.endpoint = %endpoint,
                    location.state = LocationHealthState::Healthy.as_str(),
                    operation.kind = kind.as_str(),
                );
            }
            HealthTransition::Unchanged | HealthTransition::Ignored => {}
        }
    }

    pub fn report_tentative(self, scope: &PartitionScope, endpoint: &RegionEndpoint) {
        if self.logs_enabled {
            tracing::event!(
                name: "partition_breaker.location.tentative",
                tracing::Level::INFO,
                partition.scope = %scope,
                location.endpoint = %endpoint,
                location.state = LocationHealthState::HealthyTentative.as_str(),
            );
        }
    }

    pub fn report_evicted(self, scope: &PartitionScope) {
        if self.logs_enabled {
            tracing::event!(
                name: "partition_breaker.partition.evicted",
                tracing::Level::DEBUG,
                partition.scope = %scope,
            );
        }
    }
}
