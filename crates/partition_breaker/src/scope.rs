// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Display;
use std::sync::Arc;

/// Contiguous slice of a collection's partition key space.
///
/// The range is identified by its `id`; the boundaries are informational and do not take part
/// in equality beyond being carried along with the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKeyRange {
    id: Arc<str>,
    min_inclusive: Arc<str>,
    max_exclusive: Arc<str>,
}

impl PartitionKeyRange {
    /// Creates a new partition key range.
    ///
    /// # Examples
    ///
    /// ```
    /// use partition_breaker::PartitionKeyRange;
    ///
    /// let range = PartitionKeyRange::new("0", "", "FF");
    /// assert_eq!(range.id(), "0");
    /// ```
    pub fn new(id: impl Into<Arc<str>>, min_inclusive: impl Into<Arc<str>>, max_exclusive: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            min_inclusive: min_inclusive.into(),
            max_exclusive: max_exclusive.into(),
        }
    }

    /// The identifier of the range within its collection.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The inclusive lower boundary of the range.
    #[must_use]
    pub fn min_inclusive(&self) -> &str {
        &self.min_inclusive
    }

    /// The exclusive upper boundary of the range.
    #[must_use]
    pub fn max_exclusive(&self) -> &str {
        &self.max_exclusive
    }
}

/// Key that identifies the unit of circuit breaking: a partition key range within a collection.
///
/// Two collections can have ranges with identical ids and boundaries, so the collection's
/// resource id is part of the key. Health recorded for one collection never affects another.
///
/// # Telemetry
///
/// The scope is included in emitted events. Make sure the collection resource id and range
/// boundaries do not carry sensitive data.
///
/// # Examples
///
/// ```
/// use partition_breaker::{PartitionKeyRange, PartitionScope};
///
/// let range = PartitionKeyRange::new("0", "", "FF");
/// let a = PartitionScope::new("coll-a", range.clone());
/// let b = PartitionScope::new("coll-b", range);
///
/// assert_ne!(a, b);
/// assert_eq!(a.to_string(), "coll-a/0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionScope {
    collection_rid: Arc<str>,
    range: PartitionKeyRange,
}

impl PartitionScope {
    /// Creates a scope for the given collection and partition key range.
    pub fn new(collection_rid: impl Into<Arc<str>>, range: PartitionKeyRange) -> Self {
        Self {
            collection_rid: collection_rid.into(),
            range,
        }
    }

    /// The resource id of the collection.
    #[must_use]
    pub fn collection_rid(&self) -> &str {
        &self.collection_rid
    }

    /// The partition key range.
    #[must_use]
    pub fn range(&self) -> &PartitionKeyRange {
        &self.range
    }
}

impl Display for PartitionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection_rid, self.range.id)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    static_assertions::assert_impl_all!(PartitionScope: Send, Sync, Clone, std::hash::Hash, Eq);
    static_assertions::assert_impl_all!(PartitionKeyRange: Send, Sync, Clone, std::hash::Hash, Eq);

    #[test]
    fn same_range_in_different_collections_is_distinct() {
        let range = PartitionKeyRange::new("1", "00", "7F");
        let mut set = HashSet::new();

        set.insert(PartitionScope::new("a", range.clone()));
        set.insert(PartitionScope::new("b", range.clone()));
        set.insert(PartitionScope::new("a", range));

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn accessors() {
        let scope = PartitionScope::new("coll", PartitionKeyRange::new("3", "10", "20"));

        assert_eq!(scope.collection_rid(), "coll");
        assert_eq!(scope.range().id(), "3");
        assert_eq!(scope.range().min_inclusive(), "10");
        assert_eq!(scope.range().max_exclusive(), "20");
        assert_eq!(scope.to_string(), "coll/3");
    }
}
