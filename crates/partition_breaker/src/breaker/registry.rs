// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::breaker::health::LocationHealthContext;
use crate::{LocationHealthSnapshot, PartitionScope, RegionEndpoint};

/// Health of every region tracked for one partition scope.
#[derive(Debug, Default)]
pub(crate) struct PartitionHealth {
    regions: RwLock<Vec<Arc<LocationHealthContext>>>,
    // Mirror of the regions currently unavailable. Only updated while the lock of the context that
    // changes state is held; contexts are always locked before this set.
    unavailable: Mutex<HashSet<RegionEndpoint>>,
    // Set once the scope is removed from the registry; outcomes recorded here afterwards are lost.
    evicted: AtomicBool,
}

impl PartitionHealth {
    pub fn get_or_create(&self, endpoint: &RegionEndpoint, now: Instant) -> Arc<LocationHealthContext> {
        if let Some(context) = self.find(endpoint) {
            return context;
        }

        let mut regions = self.regions.write();

        // another caller may have won the race between the two locks
        if let Some(context) = regions.iter().find(|c| c.endpoint() == endpoint) {
            return Arc::clone(context);
        }

        let context = Arc::new(LocationHealthContext::new(endpoint.clone(), now));
        regions.push(Arc::clone(&context));
        context
    }

    pub fn find(&self, endpoint: &RegionEndpoint) -> Option<Arc<LocationHealthContext>> {
        self.regions.read().iter().find(|c| c.endpoint() == endpoint).map(Arc::clone)
    }

    pub fn contexts(&self) -> Vec<Arc<LocationHealthContext>> {
        self.regions.read().clone()
    }

    /// Adds `endpoint` to the unavailable set unless that leaves none of `applicable` available.
    pub fn try_reserve_unavailable(&self, endpoint: &RegionEndpoint, applicable: &[RegionEndpoint]) -> bool {
        let mut unavailable = self.unavailable.lock();

        let remaining = applicable
            .iter()
            .filter(|candidate| *candidate != endpoint && !unavailable.contains(*candidate))
            .count();

        if remaining == 0 {
            return false;
        }

        unavailable.insert(endpoint.clone());
        true
    }

    pub fn release_unavailable(&self, endpoint: &RegionEndpoint) {
        self.unavailable.lock().remove(endpoint);
    }

    pub fn unavailable(&self) -> HashSet<RegionEndpoint> {
        self.unavailable.lock().clone()
    }

    pub fn snapshot(&self) -> HashMap<RegionEndpoint, LocationHealthSnapshot> {
        self.regions
            .read()
            .iter()
            .map(|context| (context.endpoint().clone(), context.snapshot()))
            .collect()
    }

    fn is_idle(&self, idle_since: Instant) -> bool {
        self.regions.read().iter().all(|context| context.is_idle(idle_since))
    }

    fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::Acquire)
    }
}

/// Concurrent registry of partition scopes and the health of their regions.
///
/// Scopes are sharded across the map so unrelated partitions never contend on the same lock.
#[derive(Debug, Default)]
pub(crate) struct PartitionHealthRegistry {
    partitions: DashMap<PartitionScope, Arc<PartitionHealth>>,
}

impl PartitionHealthRegistry {
    pub fn partition(&self, scope: &PartitionScope) -> Arc<PartitionHealth> {
        if let Some(partition) = self.partitions.get(scope) {
            return Arc::clone(partition.value());
        }

        Arc::clone(self.partitions.entry(scope.clone()).or_default().value())
    }

    #[cfg(test)]
    pub fn get_or_create(&self, scope: &PartitionScope, endpoint: &RegionEndpoint, now: Instant) -> Arc<LocationHealthContext> {
        self.partition(scope).get_or_create(endpoint, now)
    }

    /// Runs `record` against the partition of `scope`.
    ///
    /// If the scope was evicted between the lookup and `record`, the outcome landed in a partition
    /// nobody reads anymore, so it is recorded again in the partition now registered for the
    /// scope. A recorded outcome makes the partition non-idle, so a partition that is still
    /// registered after `record` returns cannot lose it.
    pub fn record<R>(&self, scope: &PartitionScope, mut record: impl FnMut(&PartitionHealth) -> R) -> R {
        loop {
            let partition = self.partition(scope);
            let result = record(&partition);

            if !partition.is_evicted() {
                return result;
            }
        }
    }

    pub fn get(&self, scope: &PartitionScope) -> Option<Arc<PartitionHealth>> {
        self.partitions.get(scope).map(|partition| Arc::clone(partition.value()))
    }

    pub fn remove(&self, scope: &PartitionScope) -> bool {
        self.partitions.remove(scope).is_some()
    }

    pub fn snapshot(&self, scope: &PartitionScope) -> HashMap<RegionEndpoint, LocationHealthSnapshot> {
        self.get(scope).map(|partition| partition.snapshot()).unwrap_or_default()
    }

    pub fn partitions(&self) -> Vec<(PartitionScope, Arc<PartitionHealth>)> {
        self.partitions
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    /// Removes the scope if none of its regions changed since `idle_since` and all are healthy.
    pub fn evict_if_idle(&self, scope: &PartitionScope, idle_since: Instant) -> bool {
        self.partitions
            .remove_if(scope, |_, partition| {
                let idle = partition.is_idle(idle_since);
                if idle {
                    partition.evicted.store(true, Ordering::Release);
                }
                idle
            })
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }
}
