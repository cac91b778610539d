//! Persistence facade consumed by the supervisor and the release pipeline.

mod sqlite;

pub use sqlite::SqliteRepo;

use std::time::Duration;

use thiserror::Error;

use crate::domain::{IrcChannel, IrcNetwork};
use crate::filter::Filter;
use crate::release::{Release, ReleaseActionStatus, ReleaseStatus};

/// Errors surfaced by repository implementations.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found")]
    NotFound,
}

impl From<rusqlite::Error> for RepoError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => RepoError::NotFound,
            other => RepoError::Database(other.to_string()),
        }
    }
}

/// Network and channel persistence.
pub trait NetworkRepo: Send + Sync {
    fn find_active_networks(&self) -> Result<Vec<IrcNetwork>, RepoError>;
    fn list_networks(&self) -> Result<Vec<IrcNetwork>, RepoError>;
    fn get_network_by_id(&self, id: i64) -> Result<Option<IrcNetwork>, RepoError>;
    /// Insert a new network (with channels); assigns ids.
    fn store_network(&self, network: &mut IrcNetwork) -> Result<(), RepoError>;
    fn update_network(&self, network: &IrcNetwork) -> Result<(), RepoError>;
    fn delete_network(&self, id: i64) -> Result<(), RepoError>;
    /// Find a stored network with the same (server, nickserv account).
    fn check_existing_network(&self, network: &IrcNetwork)
        -> Result<Option<IrcNetwork>, RepoError>;
    fn list_channels(&self, network_id: i64) -> Result<Vec<IrcChannel>, RepoError>;
    fn store_channel(&self, network_id: i64, channel: &mut IrcChannel) -> Result<(), RepoError>;
    /// Replace the channel set of a network.
    fn store_network_channels(
        &self,
        network_id: i64,
        channels: &[IrcChannel],
    ) -> Result<(), RepoError>;
}

/// Filter persistence.
pub trait FilterRepo: Send + Sync {
    /// Enabled-first is not implied; filters come back highest priority
    /// first, then by name, which is the evaluation order.
    fn list_filters(&self) -> Result<Vec<Filter>, RepoError>;
    fn get_filter(&self, id: i64) -> Result<Option<Filter>, RepoError>;
    fn store_filter(&self, filter: &mut Filter) -> Result<(), RepoError>;
    fn update_filter(&self, filter: &Filter) -> Result<(), RepoError>;
    fn delete_filter(&self, id: i64) -> Result<(), RepoError>;
}

/// Pagination and predicates for the release history query.
#[derive(Debug, Clone, Default)]
pub struct ReleaseQuery {
    pub offset: u64,
    pub limit: u64,
    pub indexer: Option<String>,
    pub action_status: Option<ReleaseStatus>,
}

/// Release and status-event persistence.
pub trait ReleaseRepo: Send + Sync {
    /// Persist a release, returning its assigned id.
    fn store_release(&self, release: &Release) -> Result<i64, RepoError>;
    fn append_status(
        &self,
        release_id: i64,
        status: ReleaseStatus,
        filter: Option<&str>,
        client: Option<&str>,
        rejections: &[String],
    ) -> Result<(), RepoError>;
    fn list_statuses(&self, release_id: i64) -> Result<Vec<ReleaseActionStatus>, RepoError>;
    /// Whether a release with the same (indexer, name) reached a terminal
    /// status within `window` of now.
    fn has_recent_terminal_status(
        &self,
        indexer: &str,
        torrent_name: &str,
        window: Duration,
    ) -> Result<bool, RepoError>;
    fn query_releases(&self, query: &ReleaseQuery) -> Result<Vec<Release>, RepoError>;
    fn count_releases(&self, query: &ReleaseQuery) -> Result<u64, RepoError>;
}
