//! Test doubles for the pipeline seams: download client, release sink and
//! IRC wire.

mod mock_download_client;
mod mock_wire;

pub use mock_download_client::{MockDownloadClient, RecordedAdd};
pub use mock_wire::{MockConnector, MockWire, MockWireHandle};

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;

use crate::release::{Release, ReleaseSink};

/// Sink that just collects delivered releases for assertions.
#[derive(Default)]
pub struct CollectingSink {
    releases: StdMutex<Vec<Release>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<Release> {
        self.releases.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReleaseSink for CollectingSink {
    async fn deliver(&self, release: Release) {
        self.releases.lock().unwrap().push(release);
    }
}
