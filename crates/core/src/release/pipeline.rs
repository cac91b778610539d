use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::types::{Release, ReleaseStatus};
use crate::config::PipelineConfig;
use crate::download_client::{AddRequest, DownloadClientPool};
use crate::filter::{self, Filter, MatchResult};
use crate::repo::{FilterRepo, ReleaseRepo, RepoError};

/// Where handlers drop parsed releases. Broken out as its own trait so a
/// handler never holds the full pipeline (or the supervisor) and stays
/// testable in isolation.
#[async_trait]
pub trait ReleaseSink: Send + Sync {
    async fn deliver(&self, release: Release);
}

/// The release pipeline: persist, dedup, filter, push.
#[derive(Clone)]
pub struct ReleasePipeline {
    release_repo: Arc<dyn ReleaseRepo>,
    filter_repo: Arc<dyn FilterRepo>,
    clients: Arc<DownloadClientPool>,
    config: PipelineConfig,
}

impl ReleasePipeline {
    pub fn new(
        release_repo: Arc<dyn ReleaseRepo>,
        filter_repo: Arc<dyn FilterRepo>,
        clients: Arc<DownloadClientPool>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            release_repo,
            filter_repo,
            clients,
            config,
        }
    }

    /// Run one release through the pipeline to a terminal status.
    ///
    /// Duplicate detection is best-effort: an identical release racing this
    /// one is detected and marked, not prevented.
    pub async fn process(&self, mut release: Release) -> Result<(), RepoError> {
        let id = self.release_repo.store_release(&release)?;
        release.id = id;
        self.release_repo
            .append_status(id, ReleaseStatus::Pending, None, None, &[])?;

        let window = Duration::from_secs(self.config.dedup_window_secs);
        if self.release_repo.has_recent_terminal_status(
            &release.indexer,
            &release.torrent_name,
            window,
        )? {
            debug!(
                indexer = %release.indexer,
                name = %release.torrent_name,
                "duplicate release inside dedup window"
            );
            self.release_repo
                .append_status(id, ReleaseStatus::Duplicate, None, None, &[])?;
            return Ok(());
        }

        let filters = self.filter_repo.list_filters()?;
        match filter::find_match(&release, &filters) {
            MatchResult::Rejected(rejections) => {
                debug!(
                    name = %release.torrent_name,
                    rejections = rejections.len(),
                    "release rejected by all filters"
                );
                let reasons: Vec<String> = rejections
                    .iter()
                    .map(|r| format!("{}: {}", r.filter, r.reason))
                    .collect();
                self.release_repo.append_status(
                    id,
                    ReleaseStatus::FilterRejected,
                    None,
                    None,
                    &reasons,
                )?;
                Ok(())
            }
            MatchResult::Matched(matched) => {
                info!(
                    name = %release.torrent_name,
                    filter = %matched.name,
                    "release matched filter"
                );
                self.push(release, matched).await
            }
        }
    }

    /// Push a matched release to its filter's download client, retrying
    /// transient errors with exponential backoff.
    async fn push(&self, release: Release, matched: Filter) -> Result<(), RepoError> {
        let action = &matched.action;

        let Some(client) = self.clients.get(&action.client) else {
            warn!(client = %action.client, "filter references unknown download client");
            return self.release_repo.append_status(
                release.id,
                ReleaseStatus::PushError,
                Some(&matched.name),
                Some(&action.client),
                &[format!("unknown download client {:?}", action.client)],
            );
        };

        let request = AddRequest {
            url: release.download_url.clone(),
            label: action.label.clone(),
            category: action.category.clone(),
            save_path: action.save_path.clone(),
            paused: action.paused,
        };

        let mut attempt = 0u32;
        loop {
            match client.add(request.clone()).await {
                Ok(()) => {
                    info!(
                        name = %release.torrent_name,
                        client = %action.client,
                        "push approved"
                    );
                    return self.release_repo.append_status(
                        release.id,
                        ReleaseStatus::PushApproved,
                        Some(&matched.name),
                        Some(&action.client),
                        &[],
                    );
                }
                Err(e) if matches!(e, crate::download_client::DownloadClientError::Rejected(_)) => {
                    warn!(name = %release.torrent_name, error = %e, "push rejected");
                    return self.release_repo.append_status(
                        release.id,
                        ReleaseStatus::PushRejected,
                        Some(&matched.name),
                        Some(&action.client),
                        &[e.to_string()],
                    );
                }
                Err(e) if e.is_transient() && attempt < self.config.push_retries => {
                    attempt += 1;
                    let delay = self.config.push_retry_backoff_ms * 2u64.pow(attempt - 1);
                    warn!(
                        name = %release.torrent_name,
                        error = %e,
                        attempt,
                        delay_ms = delay,
                        "transient push error, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => {
                    error!(name = %release.torrent_name, error = %e, "push failed");
                    return self.release_repo.append_status(
                        release.id,
                        ReleaseStatus::PushError,
                        Some(&matched.name),
                        Some(&action.client),
                        &[e.to_string()],
                    );
                }
            }
        }
    }
}

#[async_trait]
impl ReleaseSink for ReleasePipeline {
    async fn deliver(&self, release: Release) {
        // One task per submission; the IRC read loop never waits on a
        // download client.
        let pipeline = self.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.process(release).await {
                error!("release pipeline error: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download_client::DownloadClientError;
    use crate::filter::FilterAction;
    use crate::repo::SqliteRepo;
    use crate::testing::MockDownloadClient;

    struct Fixture {
        repo: Arc<SqliteRepo>,
        client: Arc<MockDownloadClient>,
        pipeline: ReleasePipeline,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(SqliteRepo::in_memory().unwrap());
        let client = Arc::new(MockDownloadClient::new());

        let mut pool = DownloadClientPool::new();
        pool.insert("mock", client.clone());

        let config = PipelineConfig {
            dedup_window_secs: 3600,
            push_retries: 2,
            push_retry_backoff_ms: 1,
        };

        let pipeline = ReleasePipeline::new(
            repo.clone(),
            repo.clone(),
            Arc::new(pool),
            config,
        );

        Fixture {
            repo,
            client,
            pipeline,
        }
    }

    fn catch_all_filter(repo: &SqliteRepo) {
        let mut filter = Filter {
            name: "catch-all".to_string(),
            enabled: true,
            action: FilterAction {
                client: "mock".to_string(),
                category: Some("music".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        crate::repo::FilterRepo::store_filter(repo, &mut filter).unwrap();
    }

    fn release(name: &str) -> Release {
        Release {
            indexer: "redacted".to_string(),
            torrent_name: name.to_string(),
            download_url: "https://t.example/dl/1".to_string(),
            timestamp: chrono::Utc::now(),
            ..Default::default()
        }
    }

    fn statuses(repo: &SqliteRepo, release_id: i64) -> Vec<ReleaseStatus> {
        crate::repo::ReleaseRepo::list_statuses(repo, release_id)
            .unwrap()
            .into_iter()
            .map(|s| s.status)
            .collect()
    }

    #[tokio::test]
    async fn test_matched_release_is_pushed() {
        let f = fixture();
        catch_all_filter(&f.repo);

        f.pipeline.process(release("A")).await.unwrap();

        let added = f.client.added().await;
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].request.url, "https://t.example/dl/1");
        assert_eq!(added[0].request.category.as_deref(), Some("music"));
        assert_eq!(
            statuses(&f.repo, 1),
            vec![ReleaseStatus::Pending, ReleaseStatus::PushApproved]
        );
    }

    #[tokio::test]
    async fn test_duplicate_inside_window() {
        let f = fixture();
        catch_all_filter(&f.repo);

        f.pipeline.process(release("A")).await.unwrap();
        f.pipeline.process(release("A")).await.unwrap();

        // One push, two persisted releases.
        assert_eq!(f.client.added().await.len(), 1);
        assert_eq!(
            statuses(&f.repo, 1),
            vec![ReleaseStatus::Pending, ReleaseStatus::PushApproved]
        );
        assert_eq!(
            statuses(&f.repo, 2),
            vec![ReleaseStatus::Pending, ReleaseStatus::Duplicate]
        );
    }

    #[tokio::test]
    async fn test_different_names_not_deduped() {
        let f = fixture();
        catch_all_filter(&f.repo);

        f.pipeline.process(release("A")).await.unwrap();
        f.pipeline.process(release("B")).await.unwrap();

        assert_eq!(f.client.added().await.len(), 2);
    }

    #[tokio::test]
    async fn test_no_filters_rejects() {
        let f = fixture();

        f.pipeline.process(release("A")).await.unwrap();

        assert!(f.client.added().await.is_empty());
        assert_eq!(
            statuses(&f.repo, 1),
            vec![ReleaseStatus::Pending, ReleaseStatus::FilterRejected]
        );
    }

    #[tokio::test]
    async fn test_rejection_reasons_recorded() {
        let f = fixture();
        let mut filter = Filter {
            name: "freeleech-only".to_string(),
            enabled: true,
            freeleech: true,
            action: FilterAction {
                client: "mock".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        crate::repo::FilterRepo::store_filter(f.repo.as_ref(), &mut filter).unwrap();

        f.pipeline.process(release("A")).await.unwrap();

        let events = crate::repo::ReleaseRepo::list_statuses(f.repo.as_ref(), 1).unwrap();
        let rejected = &events[1];
        assert_eq!(rejected.status, ReleaseStatus::FilterRejected);
        assert_eq!(rejected.rejections.len(), 1);
        assert!(rejected.rejections[0].contains("freeleech-only"));
    }

    #[tokio::test]
    async fn test_transient_push_error_is_retried() {
        let f = fixture();
        catch_all_filter(&f.repo);
        f.client.push_error(DownloadClientError::Timeout).await;

        f.pipeline.process(release("A")).await.unwrap();

        assert_eq!(f.client.added().await.len(), 1);
        assert_eq!(
            statuses(&f.repo, 1),
            vec![ReleaseStatus::Pending, ReleaseStatus::PushApproved]
        );
    }

    #[tokio::test]
    async fn test_permanent_push_error_not_retried() {
        let f = fixture();
        catch_all_filter(&f.repo);
        f.client
            .push_error(DownloadClientError::AuthenticationFailed("bad".into()))
            .await;

        f.pipeline.process(release("A")).await.unwrap();

        // No retry happened: nothing reached the client's add log.
        assert!(f.client.added().await.is_empty());
        assert_eq!(
            statuses(&f.repo, 1),
            vec![ReleaseStatus::Pending, ReleaseStatus::PushError]
        );
    }

    #[tokio::test]
    async fn test_exhausted_retries_end_in_push_error() {
        let f = fixture();
        catch_all_filter(&f.repo);
        for _ in 0..3 {
            f.client.push_error(DownloadClientError::Timeout).await;
        }

        f.pipeline.process(release("A")).await.unwrap();

        assert_eq!(
            statuses(&f.repo, 1),
            vec![ReleaseStatus::Pending, ReleaseStatus::PushError]
        );
    }

    #[tokio::test]
    async fn test_client_rejection_status() {
        let f = fixture();
        catch_all_filter(&f.repo);
        f.client
            .push_error(DownloadClientError::Rejected("already have it".into()))
            .await;

        f.pipeline.process(release("A")).await.unwrap();

        assert_eq!(
            statuses(&f.repo, 1),
            vec![ReleaseStatus::Pending, ReleaseStatus::PushRejected]
        );
    }

    #[tokio::test]
    async fn test_unknown_client_is_push_error() {
        let f = fixture();
        let mut filter = Filter {
            name: "misconfigured".to_string(),
            enabled: true,
            action: FilterAction {
                client: "nope".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        crate::repo::FilterRepo::store_filter(f.repo.as_ref(), &mut filter).unwrap();

        f.pipeline.process(release("A")).await.unwrap();

        assert_eq!(
            statuses(&f.repo, 1),
            vec![ReleaseStatus::Pending, ReleaseStatus::PushError]
        );
    }
}
