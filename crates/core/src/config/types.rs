use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub irc: IrcConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Download clients keyed by name; filter actions reference these.
    #[serde(default)]
    pub download_clients: Vec<DownloadClientConfig>,
    /// Per-indexer user settings (passkey, authkey, torrent_pass, ...).
    #[serde(default)]
    pub indexers: Vec<IndexerUserConfig>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL path prefix, used for cookie scoping.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: default_base_url(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    7337
}

fn default_base_url() -> String {
    "/".to_string()
}

/// Single-operator credentials for the control plane.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("trawler.db")
}

/// IRC session tuning shared by every handler.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IrcConfig {
    /// First reconnect delay after a transport error.
    #[serde(default = "default_reconnect_initial_secs")]
    pub reconnect_initial_secs: u64,
    /// Reconnect delay ceiling.
    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_secs: u64,
    /// How long to wait for the NickServ success notice.
    #[serde(default = "default_nickserv_timeout_secs")]
    pub nickserv_timeout_secs: u64,
    /// Identify attempts before the session is torn down.
    #[serde(default = "default_nickserv_attempts")]
    pub nickserv_attempts: u32,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            reconnect_initial_secs: default_reconnect_initial_secs(),
            reconnect_max_secs: default_reconnect_max_secs(),
            nickserv_timeout_secs: default_nickserv_timeout_secs(),
            nickserv_attempts: default_nickserv_attempts(),
        }
    }
}

fn default_reconnect_initial_secs() -> u64 {
    15
}

fn default_reconnect_max_secs() -> u64 {
    600
}

fn default_nickserv_timeout_secs() -> u64 {
    10
}

fn default_nickserv_attempts() -> u32 {
    3
}

/// Release pipeline tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// A release with the same (indexer, name) and a terminal status inside
    /// this window is marked DUPLICATE instead of being pushed again.
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    /// Push retries for transient download-client errors.
    #[serde(default = "default_push_retries")]
    pub push_retries: u32,
    #[serde(default = "default_push_retry_backoff_ms")]
    pub push_retry_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: default_dedup_window_secs(),
            push_retries: default_push_retries(),
            push_retry_backoff_ms: default_push_retry_backoff_ms(),
        }
    }
}

fn default_dedup_window_secs() -> u64 {
    3600
}

fn default_push_retries() -> u32 {
    3
}

fn default_push_retry_backoff_ms() -> u64 {
    1000
}

/// A configured download client target.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadClientConfig {
    /// Name referenced by filter actions.
    pub name: String,
    pub backend: DownloadClientBackend,
    #[serde(default)]
    pub qbittorrent: Option<QBittorrentConfig>,
}

/// Available download client backends
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DownloadClientBackend {
    Qbittorrent,
    // Future: Deluge, Transmission
}

/// qBittorrent backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QBittorrentConfig {
    /// WebUI URL (e.g., "http://localhost:8080")
    pub url: String,
    pub username: String,
    pub password: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_timeout() -> u32 {
    30
}

/// User-supplied secrets for one indexer, merged into the parser's
/// variable dictionary during URL templating.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexerUserConfig {
    pub identifier: String,
    #[serde(default)]
    pub settings: HashMap<String, String>,
}
