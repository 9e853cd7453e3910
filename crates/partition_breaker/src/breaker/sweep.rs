// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Weak;
use std::time::Duration;

use anyspawn::{JoinHandle, Spawner};
use futures_channel::oneshot;
use futures_util::StreamExt;
use tick::{Clock, PeriodicTimer};

use super::manager::Shared;

/// Handle of the running background sweep.
#[derive(Debug)]
pub(crate) struct SweepTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl SweepTask {
    /// Spawns the periodic sweep. The task ends when stopped, when this handle is dropped, or when
    /// the circuit breaker itself is dropped.
    pub fn spawn(spawner: &Spawner, shared: Weak<Shared>, clock: &Clock, interval: Duration) -> Self {
        let (stop, stopped) = oneshot::channel();
        let ticks = PeriodicTimer::new(clock, interval).take_until(stopped);

        let handle = spawner.spawn(run(ticks, shared));

        Self { stop, handle }
    }

    /// Signals the task to stop and returns its handle, which completes once the task exits.
    pub fn stop(self) -> JoinHandle<()> {
        // the task may already be gone if the breaker was dropped
        _ = self.stop.send(());
        self.handle
    }
}

async fn run(mut ticks: impl futures_util::Stream<Item = ()> + Unpin, shared: Weak<Shared>) {
    while ticks.next().await.is_some() {
        let Some(shared) = shared.upgrade() else {
            break;
        };

        shared.sweep();
    }
}
