//! Mock download client for testing.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::download_client::{AddRequest, DownloadClient, DownloadClientError};

/// A recorded push for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedAdd {
    pub request: AddRequest,
    pub timestamp: DateTime<Utc>,
}

/// Mock implementation of the DownloadClient trait.
///
/// Records every add for assertions and pops scripted errors so tests can
/// exercise retry behavior (e.g. one transient failure, then success).
#[derive(Debug, Default)]
pub struct MockDownloadClient {
    added: Arc<RwLock<Vec<RecordedAdd>>>,
    next_errors: Arc<RwLock<VecDeque<DownloadClientError>>>,
}

impl MockDownloadClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded add calls.
    pub async fn added(&self) -> Vec<RecordedAdd> {
        self.added.read().await.clone()
    }

    /// Queue an error; each queued error fails exactly one add call.
    pub async fn push_error(&self, error: DownloadClientError) {
        self.next_errors.write().await.push_back(error);
    }
}

#[async_trait]
impl DownloadClient for MockDownloadClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn test(&self) -> Result<(), DownloadClientError> {
        Ok(())
    }

    async fn add(&self, request: AddRequest) -> Result<(), DownloadClientError> {
        if let Some(error) = self.next_errors.write().await.pop_front() {
            return Err(error);
        }

        self.added.write().await.push(RecordedAdd {
            request,
            timestamp: Utc::now(),
        });
        Ok(())
    }
}
