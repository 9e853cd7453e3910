// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Display;
use std::sync::Arc;

/// Address of a regional endpoint of the database account.
///
/// Endpoints are compared by their full address; the region name is resolved separately
/// through [`RegionNameResolver`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionEndpoint(Arc<str>);

impl RegionEndpoint {
    /// Creates an endpoint from its address.
    #[must_use]
    pub fn new(address: impl Into<Arc<str>>) -> Self {
        Self(address.into())
    }

    /// The address of the endpoint.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RegionEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionEndpoint {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for RegionEndpoint {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

/// Kind of an operation. Reads and writes have independent thresholds and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Point reads, queries and other operations that do not mutate data.
    Read,
    /// Creates, replaces, upserts, deletes and other mutating operations.
    Write,
}

impl OperationKind {
    /// Returns `true` for [`OperationKind::Read`].
    #[must_use]
    pub const fn is_read(self) -> bool {
        matches!(self, Self::Read)
    }

    /// Returns a static string for telemetry.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of the ordered list of regions an operation may be routed to.
///
/// The order is the account's preference order. The circuit breaker and the retry executor
/// re-query the directory whenever they need the list so account topology changes are picked
/// up without a restart.
pub trait EndpointDirectory: Send + Sync {
    /// Endpoints that may serve reads, in preference order.
    fn applicable_read_endpoints(&self) -> Vec<RegionEndpoint>;

    /// Endpoints that may serve writes, in preference order.
    fn applicable_write_endpoints(&self) -> Vec<RegionEndpoint>;

    /// Endpoints that may serve an operation of the given kind, in preference order.
    fn applicable_endpoints(&self, kind: OperationKind) -> Vec<RegionEndpoint> {
        match kind {
            OperationKind::Read => self.applicable_read_endpoints(),
            OperationKind::Write => self.applicable_write_endpoints(),
        }
    }
}

/// Maps endpoints to human-readable region names.
pub trait RegionNameResolver: Send + Sync {
    /// Returns the region name of the endpoint, or `None` when the endpoint is unknown.
    fn region_name(&self, endpoint: &RegionEndpoint) -> Option<String>;
}

/// Fixed account topology backed by ordered `(region name, endpoint)` lists.
///
/// # Examples
///
/// ```
/// use partition_breaker::{EndpointDirectory, RegionNameResolver, StaticEndpointDirectory};
///
/// let directory = StaticEndpointDirectory::builder()
///     .read_region("West US", "https://westus.example.com")
///     .read_region("East US", "https://eastus.example.com")
///     .write_region("West US", "https://westus.example.com")
///     .build();
///
/// let reads = directory.applicable_read_endpoints();
/// assert_eq!(reads.len(), 2);
/// assert_eq!(directory.region_name(&reads[1]).as_deref(), Some("East US"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticEndpointDirectory {
    read: Vec<(String, RegionEndpoint)>,
    write: Vec<(String, RegionEndpoint)>,
}

impl StaticEndpointDirectory {
    /// Creates a builder for a static directory.
    #[must_use]
    pub fn builder() -> StaticEndpointDirectoryBuilder {
        StaticEndpointDirectoryBuilder::default()
    }
}

impl EndpointDirectory for StaticEndpointDirectory {
    fn applicable_read_endpoints(&self) -> Vec<RegionEndpoint> {
        self.read.iter().map(|(_, endpoint)| endpoint.clone()).collect()
    }

    fn applicable_write_endpoints(&self) -> Vec<RegionEndpoint> {
        self.write.iter().map(|(_, endpoint)| endpoint.clone()).collect()
    }
}

impl RegionNameResolver for StaticEndpointDirectory {
    fn region_name(&self, endpoint: &RegionEndpoint) -> Option<String> {
        self.read
            .iter()
            .chain(self.write.iter())
            .find(|(_, candidate)| candidate == endpoint)
            .map(|(name, _)| name.clone())
    }
}

/// Builder for [`StaticEndpointDirectory`].
#[derive(Debug, Default)]
pub struct StaticEndpointDirectoryBuilder {
    inner: StaticEndpointDirectory,
}

impl StaticEndpointDirectoryBuilder {
    /// Appends a region that serves reads.
    #[must_use]
    pub fn read_region(mut self, name: impl Into<String>, endpoint: impl Into<RegionEndpoint>) -> Self {
        self.inner.read.push((name.into(), endpoint.into()));
        self
    }

    /// Appends a region that serves writes.
    #[must_use]
    pub fn write_region(mut self, name: impl Into<String>, endpoint: impl Into<RegionEndpoint>) -> Self {
        self.inner.write.push((name.into(), endpoint.into()));
        self
    }

    /// Builds the directory.
    #[must_use]
    pub fn build(self) -> StaticEndpointDirectory {
        self.inner
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_impl_all!(RegionEndpoint: Send, Sync, Clone, std::hash::Hash, Eq);
    static_assertions::assert_impl_all!(StaticEndpointDirectory: EndpointDirectory, RegionNameResolver);

    fn directory() -> StaticEndpointDirectory {
        StaticEndpointDirectory::builder()
            .read_region("r1", "https://r1")
            .read_region("r2", "https://r2")
            .write_region("w1", "https://w1")
            .build()
    }

    #[test]
    fn applicable_endpoints_by_kind() {
        let directory = directory();

        assert_eq!(
            directory.applicable_endpoints(OperationKind::Read),
            vec![RegionEndpoint::from("https://r1"), RegionEndpoint::from("https://r2")]
        );
        assert_eq!(
            directory.applicable_endpoints(OperationKind::Write),
            vec![RegionEndpoint::from("https://w1")]
        );
    }

    #[test]
    fn region_name_lookup() {
        let directory = directory();

        assert_eq!(directory.region_name(&"https://w1".into()).as_deref(), Some("w1"));
        assert_eq!(directory.region_name(&"https://r2".into()).as_deref(), Some("r2"));
        assert_eq!(directory.region_name(&"https://unknown".into()), None);
    }

    #[test]
    fn operation_kind_as_str() {
        assert_eq!(OperationKind::Read.as_str(), "read");
        assert_eq!(OperationKind::Write.to_string(), "write");
        assert!(OperationKind::Read.is_read());
        assert!(!OperationKind::Write.is_read());
    }
}
