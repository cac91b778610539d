use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by download client drivers.
#[derive(Debug, Error)]
pub enum DownloadClientError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The client accepted the request but refused the torrent.
    #[error("Rejected by client: {0}")]
    Rejected(String),

    #[error("HTTP error {0}")]
    Http(u16),

    #[error("API error: {0}")]
    ApiError(String),
}

impl DownloadClientError {
    /// Whether the pipeline should retry the push. Auth failures and
    /// client-side 4xx responses are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            DownloadClientError::Timeout | DownloadClientError::ConnectionFailed(_) => true,
            DownloadClientError::Http(status) => *status >= 500,
            DownloadClientError::AuthenticationFailed(_)
            | DownloadClientError::Rejected(_)
            | DownloadClientError::ApiError(_) => false,
        }
    }
}

/// A push request: the composed download URL plus the matched filter's
/// action parameters.
#[derive(Debug, Clone, Default)]
pub struct AddRequest {
    pub url: String,
    pub label: Option<String>,
    pub category: Option<String>,
    pub save_path: Option<String>,
    pub paused: bool,
}

/// One download client backend.
#[async_trait]
pub trait DownloadClient: Send + Sync {
    /// Backend name for logging ("qbittorrent", "mock", ...).
    fn name(&self) -> &str;

    /// Connectivity/credentials probe.
    async fn test(&self) -> Result<(), DownloadClientError>;

    /// Submit one release by its download URL.
    async fn add(&self, request: AddRequest) -> Result<(), DownloadClientError>;
}

/// Configured download clients, looked up by filter actions.
#[derive(Default)]
pub struct DownloadClientPool {
    clients: HashMap<String, Arc<dyn DownloadClient>>,
}

impl DownloadClientPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, client: Arc<dyn DownloadClient>) {
        self.clients.insert(name.into(), client);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DownloadClient>> {
        self.clients.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(DownloadClientError::Timeout.is_transient());
        assert!(DownloadClientError::ConnectionFailed("refused".into()).is_transient());
        assert!(DownloadClientError::Http(502).is_transient());
    }

    #[test]
    fn test_permanent_errors() {
        assert!(!DownloadClientError::Http(404).is_transient());
        assert!(!DownloadClientError::AuthenticationFailed("bad".into()).is_transient());
        assert!(!DownloadClientError::Rejected("dupe".into()).is_transient());
        assert!(!DownloadClientError::ApiError("parse".into()).is_transient());
    }
}
