// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;

use crate::{PartitionKeyRange, PartitionScope, RegionEndpoint, StaticEndpointDirectory};

/// Collects the formatted events of a thread-local subscriber.
#[derive(Debug, Clone, Default)]
pub(crate) struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn assert_contains(&self, expected: &str) {
        let output = self.output();
        assert!(output.contains(expected), "missing '{expected}' in:\n{output}");
    }

    pub fn subscriber(&self) -> impl tracing::Subscriber {
        tracing_subscriber::registry().with(tracing_subscriber::fmt::layer().with_writer(self.clone()).with_ansi(false))
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub(crate) fn scope(collection: &str, range: &str) -> PartitionScope {
    PartitionScope::new(collection, PartitionKeyRange::new(range, "", "FF"))
}

pub(crate) fn endpoint(name: &str) -> RegionEndpoint {
    RegionEndpoint::from(format!("https://{name}.example.com"))
}

/// Directory with the given regions serving both reads and writes.
pub(crate) fn directory(regions: &[&str]) -> StaticEndpointDirectory {
    regions
        .iter()
        .fold(StaticEndpointDirectory::builder(), |builder, name| {
            builder.read_region(*name, endpoint(name)).write_region(*name, endpoint(name))
        })
        .build()
}
