use std::sync::Arc;

use trawler_core::{Config, FilterRepo, IrcSupervisor, ReleaseRepo};

use crate::session::SessionStore;

/// Shared application state
pub struct AppState {
    config: Config,
    supervisor: Arc<IrcSupervisor>,
    filter_repo: Arc<dyn FilterRepo>,
    release_repo: Arc<dyn ReleaseRepo>,
    sessions: SessionStore,
}

impl AppState {
    pub fn new(
        config: Config,
        supervisor: Arc<IrcSupervisor>,
        filter_repo: Arc<dyn FilterRepo>,
        release_repo: Arc<dyn ReleaseRepo>,
    ) -> Self {
        Self {
            config,
            supervisor,
            filter_repo,
            release_repo,
            sessions: SessionStore::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn supervisor(&self) -> &Arc<IrcSupervisor> {
        &self.supervisor
    }

    pub fn filter_repo(&self) -> &Arc<dyn FilterRepo> {
        &self.filter_repo
    }

    pub fn release_repo(&self) -> &Arc<dyn ReleaseRepo> {
        &self.release_repo
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}
