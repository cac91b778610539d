//! qBittorrent download client implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::QBittorrentConfig;

use super::{AddRequest, DownloadClient, DownloadClientError};

/// qBittorrent WebUI client.
pub struct QBittorrentClient {
    client: Client,
    config: QBittorrentConfig,
    /// Session marker (cookie itself lives in the jar); cleared on 403.
    session: Arc<RwLock<Option<String>>>,
}

impl QBittorrentClient {
    pub fn new(config: QBittorrentConfig) -> Result<Self, DownloadClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .cookie_store(true)
            .build()
            .map_err(|e| DownloadClientError::ApiError(e.to_string()))?;

        Ok(Self {
            client,
            config,
            session: Arc::new(RwLock::new(None)),
        })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Login and store session cookie.
    async fn login(&self) -> Result<(), DownloadClientError> {
        let url = format!("{}/api/v2/auth/login", self.base_url());

        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if body.contains("Ok.") {
            debug!("qBittorrent login successful");
            let mut session = self.session.write().await;
            *session = Some("authenticated".to_string());
            Ok(())
        } else if body.contains("Fails.") || status.as_u16() == 403 {
            Err(DownloadClientError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ))
        } else {
            Err(DownloadClientError::AuthenticationFailed(format!(
                "Unexpected response: {}",
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    /// Ensure we have a valid session, logging in if needed.
    async fn ensure_authenticated(&self) -> Result<(), DownloadClientError> {
        let session = self.session.read().await;
        if session.is_some() {
            return Ok(());
        }
        drop(session);
        self.login().await
    }

    /// Make an authenticated POST request with form data, re-logging-in
    /// once if the session expired.
    async fn post_form(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<String, DownloadClientError> {
        self.ensure_authenticated().await?;

        let url = format!("{}{}", self.base_url(), endpoint);
        let response = self
            .client
            .post(&url)
            .form(params)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status.as_u16() == 403 {
            warn!("qBittorrent session expired, re-authenticating");
            {
                let mut session = self.session.write().await;
                *session = None;
            }
            self.login().await?;

            let response = self
                .client
                .post(&url)
                .form(params)
                .send()
                .await
                .map_err(map_reqwest_error)?;

            if !response.status().is_success() {
                return Err(DownloadClientError::Http(response.status().as_u16()));
            }

            return response
                .text()
                .await
                .map_err(|e| DownloadClientError::ApiError(e.to_string()));
        }

        if !status.is_success() {
            return Err(DownloadClientError::Http(status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| DownloadClientError::ApiError(e.to_string()))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> DownloadClientError {
    if e.is_timeout() {
        DownloadClientError::Timeout
    } else if e.is_connect() {
        DownloadClientError::ConnectionFailed(e.to_string())
    } else {
        DownloadClientError::ApiError(e.to_string())
    }
}

#[async_trait]
impl DownloadClient for QBittorrentClient {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    async fn test(&self) -> Result<(), DownloadClientError> {
        self.login().await
    }

    async fn add(&self, request: AddRequest) -> Result<(), DownloadClientError> {
        let mut params: Vec<(&str, &str)> = vec![("urls", request.url.as_str())];

        if let Some(category) = request.category.as_deref() {
            params.push(("category", category));
        }
        if let Some(label) = request.label.as_deref() {
            params.push(("tags", label));
        }
        if let Some(save_path) = request.save_path.as_deref() {
            params.push(("savepath", save_path));
        }
        if request.paused {
            params.push(("paused", "true"));
        }

        let body = self.post_form("/api/v2/torrents/add", &params).await?;

        // The WebUI answers 200 with "Fails." when it refuses a torrent.
        if body.contains("Fails.") {
            return Err(DownloadClientError::Rejected(
                "qBittorrent refused the torrent".to_string(),
            ));
        }

        debug!(url = %request.url, "pushed release to qBittorrent");
        Ok(())
    }
}
