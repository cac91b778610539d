//! Network supervisor: owns the handler set and reconciles it against the
//! persisted configuration.
//!
//! The handlers map is guarded by a plain mutex held only while mutating or
//! snapshotting it; connecting, stopping and every other long operation on
//! a handler happens outside the lock.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::handler::Handler;
use super::transport::Connector;
use crate::config::IrcConfig;
use crate::domain::{ChannelWithHealth, HandlerKey, IrcChannel, IrcNetwork, NetworkWithHealth};
use crate::indexer::IndexerRegistry;
use crate::release::ReleaseSink;
use crate::repo::{NetworkRepo, RepoError};

/// Errors surfaced to the control plane.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error("Network {0} not found")]
    NotFound(i64),
}

struct HandlerEntry {
    handler: Arc<Handler>,
    task: Option<JoinHandle<()>>,
}

/// Owns one handler per enabled (server, nick) pair.
pub struct IrcSupervisor {
    repo: Arc<dyn NetworkRepo>,
    registry: Arc<IndexerRegistry>,
    sink: Arc<dyn ReleaseSink>,
    connector: Arc<dyn Connector>,
    config: IrcConfig,
    handlers: StdMutex<HashMap<HandlerKey, HandlerEntry>>,
}

impl IrcSupervisor {
    pub fn new(
        repo: Arc<dyn NetworkRepo>,
        registry: Arc<IndexerRegistry>,
        sink: Arc<dyn ReleaseSink>,
        connector: Arc<dyn Connector>,
        config: IrcConfig,
    ) -> Self {
        Self {
            repo,
            registry,
            sink,
            connector,
            config,
            handlers: StdMutex::new(HashMap::new()),
        }
    }

    /// Load every enabled network and launch a handler for each.
    pub fn start_handlers(&self) {
        let networks = match self.repo.find_active_networks() {
            Ok(networks) => networks,
            Err(e) => {
                error!("failed to list networks: {}", e);
                return;
            }
        };

        for network in networks {
            if let Err(e) = self.start_network(network) {
                error!("failed to start network: {}", e);
            }
        }
    }

    /// Signal every handler to disconnect and wait for all run loops.
    pub async fn stop_handlers(&self) {
        let entries: Vec<(HandlerKey, Arc<Handler>, Option<JoinHandle<()>>)> = {
            let mut handlers = self.handlers.lock().unwrap();
            handlers
                .drain()
                .map(|(key, entry)| (key, entry.handler, entry.task))
                .collect()
        };

        let mut tasks = Vec::new();
        for (key, handler, task) in entries {
            info!(server = %key.server, "stopping network");
            handler.stop();
            if let Some(task) = task {
                tasks.push(task);
            }
        }

        // Barrier: every run loop has returned before we do.
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                warn!("handler task ended abnormally: {}", e);
            }
        }
        info!("stopped all irc handlers");
    }

    /// Create (or revive) the handler for one network and spawn its run loop.
    fn start_network(&self, mut network: IrcNetwork) -> Result<(), SupervisorError> {
        if !network.enabled {
            return Ok(());
        }

        network.channels = self.repo.list_channels(network.id)?;
        let key = network.handler_key();
        let definitions = self.registry.by_server(&network.server);

        let existing = {
            let handlers = self.handlers.lock().unwrap();
            handlers.get(&key).map(|e| e.handler.clone())
        };

        if let Some(handler) = existing {
            if !handler.connected() {
                debug!(server = %key.server, "nudging existing handler");
                handler.set_network(network);
                handler.init_indexers(definitions);
                handler.restart();
            }
            return Ok(());
        }

        debug!(server = %network.server, name = %network.name, "starting network");
        let handler = Arc::new(Handler::new(
            network,
            definitions,
            self.sink.clone(),
            self.connector.clone(),
            self.config.clone(),
        ));

        {
            let mut handlers = self.handlers.lock().unwrap();
            handlers.insert(
                key.clone(),
                HandlerEntry {
                    handler: handler.clone(),
                    task: None,
                },
            );
        }

        // Launch outside the lock; a start failure leaves the entry in
        // place so the next reconcile can retry.
        let run_handler = handler.clone();
        let server = key.server.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = run_handler.run().await {
                error!(server = %server, "handler exited with error: {}", e);
            }
        });

        let mut handlers = self.handlers.lock().unwrap();
        if let Some(entry) = handlers.get_mut(&key) {
            entry.task = Some(task);
        }

        Ok(())
    }

    /// Align the live handler (if any) with the given network using the
    /// minimal transition.
    async fn reconcile(&self, network: &IrcNetwork) -> Result<(), SupervisorError> {
        let key = network.handler_key();
        // Look up by key, falling back to network id so an identity change
        // (which moves the key) still reaches the live session.
        let found = {
            let handlers = self.handlers.lock().unwrap();
            handlers
                .get(&key)
                .map(|e| (key.clone(), e.handler.clone()))
                .or_else(|| {
                    handlers
                        .iter()
                        .find(|(_, e)| network.id != 0 && e.handler.get_network().id == network.id)
                        .map(|(k, e)| (k.clone(), e.handler.clone()))
                })
        };

        let Some((old_key, handler)) = found else {
            return self.start_network(network.clone());
        };

        if !handler.connected() {
            // Not live: refresh the snapshot, the run loop picks it up.
            handler.set_network(network.clone());
            handler.init_indexers(self.registry.by_server(&network.server));
            handler.restart();
            self.rekey(&old_key, key);
            return Ok(());
        }

        let current = handler.get_network();

        // Transport-affecting fields subsume every other change.
        let restart_needed = current.server != network.server
            || current.port != network.port
            || current.tls != network.tls
            || current.pass != network.pass
            || current.invite_command != network.invite_command;

        if restart_needed {
            info!(server = %network.server, "transport change, restarting network");
            handler.update_network(network.clone());
            handler.init_indexers(self.registry.by_server(&network.server));
            handler.restart();
            self.rekey(&old_key, key);
            return Ok(());
        }

        if current.nickserv.account != network.nickserv.account {
            debug!(nick = %network.nickserv.account, "changing nick");
            if let Err(e) = handler.handle_nick_change(&network.nickserv.account).await {
                error!("failed to change nick: {}", e);
            }
        } else if current.nickserv.password != network.nickserv.password {
            debug!("nickserv password changed, re-identifying");
            let password = network.nickserv.password.as_deref().unwrap_or_default();
            if let Err(e) = handler
                .handle_nickserv_identify(&network.nickserv.account, password)
                .await
            {
                error!("failed to identify with nickserv: {}", e);
            }
        }

        // Channel delta, both sides lowercased. PART goes by name, JOIN
        // takes the full channel so the password rides along.
        let current_names: HashSet<String> = current
            .channels
            .iter()
            .filter(|c| c.enabled)
            .map(|c| c.name.to_lowercase())
            .collect();
        let desired_names: HashSet<String> = network
            .channels
            .iter()
            .filter(|c| c.enabled)
            .map(|c| c.name.to_lowercase())
            .collect();

        for leave in current_names.difference(&desired_names) {
            debug!(server = %network.server, channel = %leave, "part channel");
            if let Err(e) = handler.handle_part_channel(leave).await {
                error!(channel = %leave, "failed to part channel: {}", e);
            }
        }

        for channel in network
            .channels
            .iter()
            .filter(|c| c.enabled && !current_names.contains(&c.name.to_lowercase()))
        {
            debug!(server = %network.server, channel = %channel.name, "join channel");
            if let Err(e) = handler.handle_join_channel(channel).await {
                error!(channel = %channel.name, "failed to join channel: {}", e);
            }
        }

        // Refresh the handler's view last.
        handler.set_network(network.clone());
        handler.init_indexers(self.registry.by_server(&network.server));
        self.rekey(&old_key, key);

        Ok(())
    }

    /// Move a handler entry to a new key after an identity change.
    fn rekey(&self, old_key: &HandlerKey, new_key: HandlerKey) {
        if *old_key == new_key {
            return;
        }
        let mut handlers = self.handlers.lock().unwrap();
        if let Some(entry) = handlers.remove(old_key) {
            handlers.insert(new_key, entry);
        }
    }

    /// Stop the handler for `key`, keeping its entry.
    pub fn stop_network(&self, key: &HandlerKey) {
        let handler = {
            let handlers = self.handlers.lock().unwrap();
            handlers.get(key).map(|e| e.handler.clone())
        };
        if let Some(handler) = handler {
            handler.stop();
            debug!(server = %key.server, "stopped network");
        }
    }

    /// Stop the handler for `key` and drop its entry. Idempotent.
    pub async fn stop_and_remove(&self, key: &HandlerKey) {
        let entry = {
            let mut handlers = self.handlers.lock().unwrap();
            handlers.remove(key)
        };
        if let Some(mut entry) = entry {
            entry.handler.stop();
            if let Some(task) = entry.task.take() {
                if let Err(e) = task.await {
                    warn!("handler task ended abnormally: {}", e);
                }
            }
            debug!(server = %key.server, "stopped and removed network");
        }
    }

    /// Persist a new network (merging into an existing (server, nick) row),
    /// then reconcile.
    pub async fn store_network(&self, network: &mut IrcNetwork) -> Result<(), SupervisorError> {
        let existing = self.repo.check_existing_network(network)?;

        let Some(mut existing) = existing else {
            self.repo.store_network(network)?;
            debug!(name = %network.name, "stored network");
            if network.enabled {
                self.reconcile(network).await?;
            }
            return Ok(());
        };

        // Same (server, nick account): append the new channels to the
        // existing network instead of creating a duplicate session.
        for channel in &mut network.channels {
            self.repo.store_channel(existing.id, channel)?;
            existing.channels.push(channel.clone());
        }

        if existing.enabled {
            self.reconcile(&existing).await?;
        }
        Ok(())
    }

    /// Persist changes to a network, then reconcile or tear down.
    pub async fn update_network(&self, network: &IrcNetwork) -> Result<(), SupervisorError> {
        // Persistence failures abort before the live session is touched.
        self.repo.update_network(network)?;
        self.repo
            .store_network_channels(network.id, &network.channels)?;
        debug!(name = %network.name, "updated network");

        if network.enabled {
            self.reconcile(network).await?;
        } else {
            self.stop_and_remove(&network.handler_key()).await;
        }
        Ok(())
    }

    /// Remove a network: live session first, then the rows.
    pub async fn delete_network(&self, id: i64) -> Result<(), SupervisorError> {
        let network = self
            .repo
            .get_network_by_id(id)?
            .ok_or(SupervisorError::NotFound(id))?;

        debug!(id, "delete network");
        self.stop_and_remove(&network.handler_key()).await;
        self.repo.delete_network(id)?;
        Ok(())
    }

    /// Persist one channel and reconcile the owning network.
    pub async fn store_channel(
        &self,
        network_id: i64,
        channel: &mut IrcChannel,
    ) -> Result<(), SupervisorError> {
        let mut network = self
            .repo
            .get_network_by_id(network_id)?
            .ok_or(SupervisorError::NotFound(network_id))?;
        self.repo.store_channel(network_id, channel)?;

        if network.enabled {
            network.channels.push(channel.clone());
            self.reconcile(&network).await?;
        }
        Ok(())
    }

    pub fn get_network(&self, id: i64) -> Result<IrcNetwork, SupervisorError> {
        self.repo
            .get_network_by_id(id)?
            .ok_or(SupervisorError::NotFound(id))
    }

    pub fn list_networks(&self) -> Result<Vec<IrcNetwork>, SupervisorError> {
        Ok(self.repo.list_networks()?)
    }

    /// Persisted networks joined with live handler health.
    pub fn networks_with_health(&self) -> Result<Vec<NetworkWithHealth>, SupervisorError> {
        let networks = self.repo.list_networks()?;
        let mut result = Vec::with_capacity(networks.len());

        for network in networks {
            let handler = {
                let handlers = self.handlers.lock().unwrap();
                handlers
                    .get(&network.handler_key())
                    .map(|e| e.handler.clone())
            };

            let (connected, connected_since, health) = match &handler {
                Some(handler) if handler.connected() => (
                    true,
                    handler.connected_since(),
                    handler.health_snapshot(),
                ),
                Some(handler) => (false, None, handler.health_snapshot()),
                None => (false, None, HashMap::new()),
            };

            let channels = network
                .channels
                .iter()
                .map(|channel| {
                    let channel_health = health.get(&channel.name.to_lowercase());
                    ChannelWithHealth {
                        id: channel.id,
                        name: channel.name.clone(),
                        enabled: channel.enabled,
                        detached: channel.detached,
                        monitoring: channel_health.map(|h| h.monitoring).unwrap_or(false),
                        monitoring_since: channel_health.and_then(|h| h.monitoring_since),
                        last_announce: channel_health.and_then(|h| h.last_announce),
                    }
                })
                .collect();

            result.push(NetworkWithHealth {
                id: network.id,
                name: network.name.clone(),
                enabled: network.enabled,
                server: network.server.clone(),
                port: network.port,
                tls: network.tls,
                nick: network.nickserv.account.clone(),
                connected,
                connected_since,
                channels,
            });
        }

        Ok(result)
    }

    /// Whether a handler entry exists for `key` (test and health plumbing).
    pub fn has_handler(&self, key: &HandlerKey) -> bool {
        self.handlers.lock().unwrap().contains_key(key)
    }

    /// Live handler for `key`, if any.
    pub fn handler(&self, key: &HandlerKey) -> Option<Arc<Handler>> {
        self.handlers
            .lock()
            .unwrap()
            .get(key)
            .map(|e| e.handler.clone())
    }
}
