//! Core of the trawler announce pipeline: IRC network supervision,
//! announce parsing, filter matching and release dispatch.

pub mod announce;
pub mod config;
pub mod domain;
pub mod download_client;
pub mod filter;
pub mod humanize;
pub mod indexer;
pub mod irc;
pub mod release;
pub mod repo;
pub mod testing;

pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use domain::{HandlerKey, IrcChannel, IrcNetwork, NetworkWithHealth, NickServ};
pub use download_client::{build_pool, DownloadClient, DownloadClientPool};
pub use filter::Filter;
pub use indexer::{IndexerDefinition, IndexerRegistry};
pub use irc::{IrcSupervisor, SupervisorError, TcpConnector};
pub use release::{Release, ReleasePipeline, ReleaseSink, ReleaseStatus};
pub use repo::{
    FilterRepo, NetworkRepo, ReleaseQuery, ReleaseRepo, RepoError, SqliteRepo,
};
