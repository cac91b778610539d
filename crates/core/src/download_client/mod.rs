//! Download client abstraction.
//!
//! This module provides a `DownloadClient` trait for pushing matched
//! releases to various backends (qBittorrent today), and a pool mapping
//! configured client names to live drivers.

mod qbittorrent;
mod types;

pub use qbittorrent::QBittorrentClient;
pub use types::*;

use std::sync::Arc;

use crate::config::{DownloadClientBackend, DownloadClientConfig};

/// Build the pool from configuration.
pub fn build_pool(configs: &[DownloadClientConfig]) -> Result<DownloadClientPool, DownloadClientError> {
    let mut pool = DownloadClientPool::new();

    for config in configs {
        match config.backend {
            DownloadClientBackend::Qbittorrent => {
                let qbit_config = config.qbittorrent.clone().ok_or_else(|| {
                    DownloadClientError::ApiError(format!(
                        "download client {:?} has no qbittorrent section",
                        config.name
                    ))
                })?;
                let client = QBittorrentClient::new(qbit_config)?;
                pool.insert(config.name.clone(), Arc::new(client));
            }
        }
    }

    Ok(pool)
}
