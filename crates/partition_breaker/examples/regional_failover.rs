// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Wires a circuit breaker and a retry executor in front of a simulated transport.
//!
//! One region keeps failing requests for one partition. The executor fails over to the next
//! region, and once the breaker takes the failing region out, later requests for that partition
//! skip it while other partitions keep using it.

use std::sync::Arc;

use anyspawn::Spawner;
use partition_breaker::{
    AttemptTarget, CircuitBreakerConfig, EndpointDirectory, OperationKind, OperationRequest, PartitionCircuitBreaker,
    PartitionKeyRange, PartitionScope, RegionEndpoint, ResponseStatus, RetryExecutor, RetryOptions, StaticEndpointDirectory,
    StatusCode, SubStatusCode,
};
use tick::Clock;

const WEST: &str = "https://westus.example.com";
const EAST: &str = "https://eastus.example.com";

#[derive(Debug)]
struct Response(StatusCode);

impl ResponseStatus for Response {
    fn status_code(&self) -> StatusCode {
        self.0
    }

    fn sub_status_code(&self) -> SubStatusCode {
        SubStatusCode::NONE
    }
}

/// West US cannot serve partition "0".
async fn send(scope: &PartitionScope, target: AttemptTarget) -> Result<Response, Response> {
    let failing = scope.range().id() == "0" && target.region().map(RegionEndpoint::as_str) == Some(WEST);

    if failing {
        Err(Response(StatusCode::SERVICE_UNAVAILABLE))
    } else {
        Ok(Response(StatusCode::OK))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let clock = Clock::new_tokio();
    let directory: Arc<dyn EndpointDirectory> = Arc::new(
        StaticEndpointDirectory::builder()
            .read_region("West US", WEST)
            .read_region("East US", EAST)
            .build(),
    );

    let breaker = PartitionCircuitBreaker::builder(clock.clone(), Arc::clone(&directory))
        .config(CircuitBreakerConfig::default().enabled(true).tolerated_read_exceptions(2))
        .enable_logs(true)
        .build();
    breaker.start(&Spawner::new_tokio());

    let executor = RetryExecutor::new(breaker.clone(), directory, clock, RetryOptions::default().enable_logs(true));

    for range in ["0", "0", "0", "0", "1"] {
        let scope = PartitionScope::new("orders", PartitionKeyRange::new(range, "", "FF"));
        let request = OperationRequest::new(scope.clone(), OperationKind::Read);

        match executor.execute(&request, |target| send(&scope, target)).await {
            Ok(response) => println!(
                "range {range}: {} after {} attempt(s) through {:?}",
                response.value().0.as_u16(),
                response.diagnostics().retry_context().attempts(),
                response.diagnostics().regions_contacted()
            ),
            Err(failure) => println!("range {range}: failed with {}", failure.error().0.as_u16()),
        }
    }

    let scope = PartitionScope::new("orders", PartitionKeyRange::new("0", "", "FF"));
    println!("unavailable for range 0: {:?}", breaker.unavailable_regions(&scope, OperationKind::Read));

    if let Some(sweep) = breaker.stop() {
        sweep.await;
    }
}
