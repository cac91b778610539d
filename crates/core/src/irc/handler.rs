//! Per-network IRC session handler.
//!
//! One handler owns one (server, nick) session and drives it through
//! connect, registration, NickServ identification, channel joins and the
//! announce watch loop. Transport errors feed an exponential backoff and
//! the session is rebuilt from the latest network snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::backoff::Backoff;
use super::transport::{Connector, TransportError, Wire, WireRx, WireTx};
use super::wire::Message;
use crate::announce::{AnnounceProcessor, ParseError};
use crate::config::IrcConfig;
use crate::domain::{ChannelHealth, IrcChannel, IrcNetwork};
use crate::indexer::IndexerDefinition;
use crate::release::{Release, ReleaseSink};

/// Errors from handler operations invoked by the supervisor.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Handler is not connected")]
    NotConnected,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Where the session currently is; exposed for health inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Registering,
    Identifying,
    Inviting,
    Joining,
    Active,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Stop,
    Restart,
}

/// How one connection attempt ended.
enum SessionEnd {
    Stopped,
    Restart,
    AuthFailed,
    Transport(TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Registering,
    Identifying,
    Joining,
    Active,
}

struct ConnState {
    session: SessionState,
    connected: bool,
    connected_since: Option<DateTime<Utc>>,
    current_nick: String,
}

pub struct Handler {
    network: RwLock<Arc<IrcNetwork>>,
    definitions: RwLock<Vec<Arc<IndexerDefinition>>>,
    processors: StdMutex<Vec<AnnounceProcessor>>,
    sink: Arc<dyn ReleaseSink>,
    connector: Arc<dyn Connector>,
    config: IrcConfig,
    writer: AsyncMutex<Option<Box<dyn WireTx>>>,
    state: RwLock<ConnState>,
    channel_health: RwLock<HashMap<String, ChannelHealth>>,
    control: broadcast::Sender<Control>,
    stopped: AtomicBool,
}

impl Handler {
    pub fn new(
        network: IrcNetwork,
        definitions: Vec<Arc<IndexerDefinition>>,
        sink: Arc<dyn ReleaseSink>,
        connector: Arc<dyn Connector>,
        config: IrcConfig,
    ) -> Self {
        let (control, _) = broadcast::channel(8);
        let current_nick = network.nickserv.account.clone();

        let handler = Self {
            network: RwLock::new(Arc::new(network)),
            definitions: RwLock::new(Vec::new()),
            processors: StdMutex::new(Vec::new()),
            sink,
            connector,
            config,
            writer: AsyncMutex::new(None),
            state: RwLock::new(ConnState {
                session: SessionState::Disconnected,
                connected: false,
                connected_since: None,
                current_nick,
            }),
            channel_health: RwLock::new(HashMap::new()),
            control,
            stopped: AtomicBool::new(false),
        };
        handler.init_indexers(definitions);
        handler
    }

    /// Drive the session until [`Handler::stop`] or a permanent failure.
    pub async fn run(&self) -> Result<(), HandlerError> {
        let mut backoff = Backoff::new(
            Duration::from_secs(self.config.reconnect_initial_secs),
            Duration::from_secs(self.config.reconnect_max_secs),
        );
        let mut control = self.control.subscribe();

        loop {
            if self.stopped.load(Ordering::SeqCst) {
                self.terminate().await;
                return Ok(());
            }

            let network = self.get_network();
            self.set_session_state(SessionState::Connecting);
            info!(server = %network.server, port = network.port, "connecting");

            match self
                .connector
                .connect(&network.server, network.port, network.tls)
                .await
            {
                Ok(wire) => {
                    match self
                        .drive_session(wire, &network, &mut control, &mut backoff)
                        .await
                    {
                        SessionEnd::Stopped => {
                            self.terminate().await;
                            return Ok(());
                        }
                        SessionEnd::Restart => {
                            info!(server = %network.server, "restarting session");
                            self.mark_disconnected();
                            backoff.reset();
                            continue;
                        }
                        SessionEnd::AuthFailed => {
                            error!(server = %network.server, "nickserv authentication failed");
                            self.mark_disconnected();
                        }
                        SessionEnd::Transport(e) => {
                            warn!(server = %network.server, error = %e, "transport error");
                            self.mark_disconnected();
                        }
                    }
                }
                Err(e) => {
                    warn!(server = %network.server, error = %e, "connect failed");
                    self.mark_disconnected();
                }
            }

            // Backoff sleep, cancellable by Stop/Restart.
            let delay = backoff.next();
            debug!(server = %network.server, delay_secs = delay.as_secs(), "reconnect backoff");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                ctl = control.recv() => match ctl {
                    Ok(Control::Restart) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        backoff.reset();
                    }
                    Ok(Control::Stop) | Err(broadcast::error::RecvError::Closed) => {
                        self.terminate().await;
                        return Ok(());
                    }
                },
            }
        }
    }

    async fn drive_session(
        &self,
        wire: Box<dyn Wire>,
        network: &Arc<IrcNetwork>,
        control: &mut broadcast::Receiver<Control>,
        backoff: &mut Backoff,
    ) -> SessionEnd {
        let (tx, mut rx) = wire.split();
        *self.writer.lock().await = Some(tx);
        self.reset_channel_health(network);

        self.set_session_state(SessionState::Registering);
        let nick = network.nickserv.account.clone();
        {
            let mut state = self.state.write().unwrap();
            state.current_nick = nick.clone();
        }

        if let Some(pass) = network.pass.as_deref().filter(|p| !p.is_empty()) {
            if let Err(e) = self.send(Message::cmd("PASS", &[pass])).await {
                return SessionEnd::Transport(close_error(e));
            }
        }
        if let Err(e) = self.send(Message::cmd("NICK", &[nick.as_str()])).await {
            return SessionEnd::Transport(close_error(e));
        }
        if let Err(e) = self
            .send(Message::cmd("USER", &[nick.as_str(), "0", "*", nick.as_str()]))
            .await
        {
            return SessionEnd::Transport(close_error(e));
        }

        let mut phase = Phase::Registering;
        let mut identify_attempts = 0u32;
        let mut identify_deadline: Option<Instant> = None;

        let end = loop {
            tokio::select! {
                ctl = control.recv() => match ctl {
                    Ok(Control::Restart)
                    | Err(broadcast::error::RecvError::Lagged(_)) => break SessionEnd::Restart,
                    Ok(Control::Stop)
                    | Err(broadcast::error::RecvError::Closed) => break SessionEnd::Stopped,
                },
                _ = deadline_sleep(identify_deadline), if identify_deadline.is_some() => {
                    identify_attempts += 1;
                    if identify_attempts >= self.config.nickserv_attempts {
                        break SessionEnd::AuthFailed;
                    }
                    warn!(attempt = identify_attempts, "nickserv identify timed out, retrying");
                    if let Err(e) = self.send_identify(network).await {
                        break SessionEnd::Transport(close_error(e));
                    }
                    identify_deadline = Some(
                        Instant::now() + Duration::from_secs(self.config.nickserv_timeout_secs),
                    );
                }
                incoming = rx.recv() => {
                    let message = match incoming {
                        None => break SessionEnd::Transport(TransportError::Closed),
                        Some(Err(e)) => break SessionEnd::Transport(e),
                        Some(Ok(message)) => message,
                    };

                    match self
                        .handle_message(
                            message,
                            network,
                            &mut phase,
                            &mut identify_attempts,
                            &mut identify_deadline,
                            backoff,
                        )
                        .await
                    {
                        Ok(None) => {}
                        Ok(Some(end)) => break end,
                        Err(e) => break SessionEnd::Transport(close_error(e)),
                    }
                }
            }
        };

        *self.writer.lock().await = None;
        end
    }

    /// Dispatch one inbound message. Returns `Some(end)` to end the session.
    async fn handle_message(
        &self,
        message: Message,
        network: &Arc<IrcNetwork>,
        phase: &mut Phase,
        identify_attempts: &mut u32,
        identify_deadline: &mut Option<Instant>,
        backoff: &mut Backoff,
    ) -> Result<Option<SessionEnd>, HandlerError> {
        match message.command.as_str() {
            "PING" => {
                let token = message.trailing().unwrap_or_default().to_string();
                self.send(Message::cmd("PONG", &[token.as_str()])).await?;
            }
            // RPL_WELCOME: registration complete.
            "001" => {
                info!(server = %network.server, "registered");
                backoff.reset();
                {
                    let mut state = self.state.write().unwrap();
                    state.connected = true;
                    state.connected_since = Some(Utc::now());
                }

                if network
                    .nickserv
                    .password
                    .as_deref()
                    .is_some_and(|p| !p.is_empty())
                {
                    self.set_session_state(SessionState::Identifying);
                    *phase = Phase::Identifying;
                    *identify_attempts = 0;
                    self.send_identify(network).await?;
                    *identify_deadline = Some(
                        Instant::now() + Duration::from_secs(self.config.nickserv_timeout_secs),
                    );
                } else {
                    self.begin_join(network).await?;
                    *phase = Phase::Joining;
                }
            }
            // ERR_NICKNAMEINUSE: retry with a trailing underscore.
            "433" => {
                let new_nick = {
                    let mut state = self.state.write().unwrap();
                    state.current_nick.push('_');
                    state.current_nick.clone()
                };
                warn!(nick = %new_nick, "nick in use, retrying");
                self.send(Message::cmd("NICK", &[new_nick.as_str()])).await?;
            }
            "NOTICE" => {
                if *phase == Phase::Identifying
                    && message
                        .source_nick()
                        .is_some_and(|n| n.eq_ignore_ascii_case("NickServ"))
                {
                    let text = message.trailing().unwrap_or_default().to_lowercase();
                    if text.contains("you are now identified") || text.contains("password accepted")
                    {
                        info!("nickserv identify confirmed");
                        *identify_deadline = None;
                        self.begin_join(network).await?;
                        *phase = Phase::Joining;
                    } else if text.contains("invalid") || text.contains("incorrect") {
                        *identify_attempts += 1;
                        error!(attempt = *identify_attempts, "nickserv rejected identify");
                        if *identify_attempts >= self.config.nickserv_attempts {
                            return Ok(Some(SessionEnd::AuthFailed));
                        }
                        self.send_identify(network).await?;
                        *identify_deadline = Some(
                            Instant::now()
                                + Duration::from_secs(self.config.nickserv_timeout_secs),
                        );
                    }
                }
            }
            "JOIN" => {
                let ours = message
                    .source_nick()
                    .is_some_and(|n| n.eq_ignore_ascii_case(&self.current_nick()));
                if ours {
                    if let Some(channel) = message.params.first() {
                        self.mark_monitoring(channel);
                        debug!(channel = %channel, "joined");
                    }
                    if *phase == Phase::Joining && self.all_channels_monitored(network) {
                        self.set_session_state(SessionState::Active);
                        *phase = Phase::Active;
                        info!(server = %network.server, "all channels joined");
                    }
                }
            }
            // RPL_ENDOFNAMES also confirms a join.
            "366" => {
                if let Some(channel) = message.params.get(1) {
                    self.mark_monitoring(channel);
                }
                if *phase == Phase::Joining && self.all_channels_monitored(network) {
                    self.set_session_state(SessionState::Active);
                    *phase = Phase::Active;
                }
            }
            "PART" => {
                let ours = message
                    .source_nick()
                    .is_some_and(|n| n.eq_ignore_ascii_case(&self.current_nick()));
                if ours {
                    if let Some(channel) = message.params.first() {
                        self.mark_not_monitoring(channel);
                    }
                }
            }
            "KICK" => {
                let kicked = message.params.get(1).cloned().unwrap_or_default();
                if kicked.eq_ignore_ascii_case(&self.current_nick()) {
                    if let Some(channel) = message.params.first() {
                        warn!(channel = %channel, "kicked from channel");
                        self.mark_not_monitoring(channel);
                    }
                }
            }
            "INVITE" => {
                if let Some(channel) = message.params.get(1).or_else(|| message.params.first()) {
                    let lowered = channel.to_lowercase();
                    if let Some(configured) = network
                        .channels
                        .iter()
                        .find(|c| c.enabled && c.name.to_lowercase() == lowered)
                    {
                        info!(channel = %channel, "invited, joining");
                        self.handle_join_channel(configured).await?;
                    }
                }
            }
            "NICK" => {
                let ours = message
                    .source_nick()
                    .is_some_and(|n| n.eq_ignore_ascii_case(&self.current_nick()));
                if ours {
                    if let Some(new_nick) = message.params.first() {
                        info!(nick = %new_nick, "nick changed");
                        self.state.write().unwrap().current_nick = new_nick.clone();
                        // Re-identify under the new nick.
                        if network
                            .nickserv
                            .password
                            .as_deref()
                            .is_some_and(|p| !p.is_empty())
                        {
                            self.send_identify(network).await?;
                        }
                    }
                }
            }
            "PRIVMSG" => {
                if matches!(*phase, Phase::Joining | Phase::Active) {
                    self.handle_privmsg(&message, network).await;
                }
            }
            _ => {}
        }

        Ok(None)
    }

    /// Invite exchange (when configured) followed by channel joins.
    async fn begin_join(&self, network: &Arc<IrcNetwork>) -> Result<(), HandlerError> {
        if let Some(raw) = network
            .invite_command
            .as_deref()
            .filter(|c| !c.trim().is_empty())
        {
            self.set_session_state(SessionState::Inviting);
            let rendered = crate::announce::template::render(raw, &self.merged_settings());
            if let Some((target, text)) = rendered.trim().split_once(' ') {
                debug!(target = %target, "sending invite command");
                self.send(Message::cmd("PRIVMSG", &[target, text])).await?;
            }
        }

        self.set_session_state(SessionState::Joining);
        for channel in network.channels.iter().filter(|c| c.enabled) {
            self.handle_join_channel(channel).await?;
        }
        Ok(())
    }

    async fn send_identify(&self, network: &Arc<IrcNetwork>) -> Result<(), HandlerError> {
        let account = &network.nickserv.account;
        let password = network.nickserv.password.as_deref().unwrap_or_default();
        let text = format!("IDENTIFY {} {}", account, password);
        self.send(Message::cmd("PRIVMSG", &["NickServ", text.as_str()]))
            .await
    }

    /// Announce dispatch: only lines from a bound indexer's announcers on a
    /// monitored, non-detached channel reach the parser.
    async fn handle_privmsg(&self, message: &Message, network: &Arc<IrcNetwork>) {
        let Some(nick) = message.source_nick() else {
            return;
        };
        let Some(channel) = message.params.first() else {
            return;
        };
        let channel = channel.to_lowercase();
        let text = message.trailing().unwrap_or_default();

        let Some(configured) = network
            .channels
            .iter()
            .find(|c| c.enabled && c.name.to_lowercase() == channel)
        else {
            return;
        };
        if configured.detached {
            return;
        }

        let mut releases: Vec<Release> = Vec::new();
        let mut attempted = false;
        {
            let mut processors = self.processors.lock().unwrap();
            for processor in processors.iter_mut() {
                let def = processor.definition().clone();
                if !def
                    .irc
                    .announcers
                    .iter()
                    .any(|a| a.eq_ignore_ascii_case(nick))
                {
                    continue;
                }
                if !def.irc.channels.iter().any(|c| c.to_lowercase() == channel) {
                    continue;
                }

                attempted = true;
                match processor.handle_line(text) {
                    Ok(Some(release)) => {
                        releases.push(release);
                        break;
                    }
                    Ok(None) => {}
                    Err(ParseError::InvalidRelease(reason)) => {
                        warn!(indexer = %def.identifier, reason = %reason, "invalid release dropped");
                    }
                    Err(e) => {
                        warn!(indexer = %def.identifier, error = %e, "announce parse error");
                    }
                }
            }
        }

        if attempted {
            self.touch_last_announce(&channel);
        }
        for release in releases {
            debug!(name = %release.torrent_name, indexer = %release.indexer, "announce parsed");
            self.sink.deliver(release).await;
        }
    }

    async fn send(&self, message: Message) -> Result<(), HandlerError> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(tx) => tx.send(message).await.map_err(HandlerError::from),
            None => Err(HandlerError::NotConnected),
        }
    }

    // -- operations invoked by the supervisor ---------------------------------

    /// Idempotent; transitions the session to Terminated.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            let _ = self.control.send(Control::Stop);
        }
    }

    /// Force a disconnect + reconnect with the latest network snapshot.
    pub fn restart(&self) {
        let _ = self.control.send(Control::Restart);
    }

    /// Swap the snapshot used by the next (re)connect.
    pub fn update_network(&self, network: IrcNetwork) {
        *self.network.write().unwrap() = Arc::new(network);
    }

    /// Same as [`Handler::update_network`]; kept separate so reconcile call
    /// sites read as intent (refresh after live changes vs. pre-restart).
    pub fn set_network(&self, network: IrcNetwork) {
        self.update_network(network);
    }

    pub fn get_network(&self) -> Arc<IrcNetwork> {
        self.network.read().unwrap().clone()
    }

    /// Rebuild the announce processors for the given definitions.
    pub fn init_indexers(&self, definitions: Vec<Arc<IndexerDefinition>>) {
        let mut processors = Vec::with_capacity(definitions.len());
        for def in &definitions {
            match AnnounceProcessor::new(def.clone()) {
                Ok(processor) => processors.push(processor),
                Err(e) => {
                    error!(indexer = %def.identifier, error = %e, "skipping indexer definition");
                }
            }
        }
        *self.processors.lock().unwrap() = processors;
        *self.definitions.write().unwrap() = definitions;
    }

    /// Send NICK on the live session; re-identify follows the server echo.
    pub async fn handle_nick_change(&self, nick: &str) -> Result<(), HandlerError> {
        self.send(Message::cmd("NICK", &[nick])).await
    }

    pub async fn handle_nickserv_identify(
        &self,
        account: &str,
        password: &str,
    ) -> Result<(), HandlerError> {
        let text = format!("IDENTIFY {} {}", account, password);
        self.send(Message::cmd("PRIVMSG", &["NickServ", text.as_str()]))
            .await
    }

    pub async fn handle_join_channel(&self, channel: &IrcChannel) -> Result<(), HandlerError> {
        match channel.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => {
                self.send(Message::cmd("JOIN", &[channel.name.as_str(), password]))
                    .await
            }
            None => {
                self.send(Message::cmd("JOIN", &[channel.name.as_str()]))
                    .await
            }
        }
    }

    pub async fn handle_part_channel(&self, name: &str) -> Result<(), HandlerError> {
        self.send(Message::cmd("PART", &[name])).await?;
        self.mark_not_monitoring(name);
        Ok(())
    }

    pub fn connected(&self) -> bool {
        self.state.read().unwrap().connected
    }

    pub fn connected_since(&self) -> Option<DateTime<Utc>> {
        self.state.read().unwrap().connected_since
    }

    pub fn session_state(&self) -> SessionState {
        self.state.read().unwrap().session
    }

    /// Channel health keyed by lowercased channel name.
    pub fn health_snapshot(&self) -> HashMap<String, ChannelHealth> {
        self.channel_health.read().unwrap().clone()
    }

    // -- internals ------------------------------------------------------------

    fn current_nick(&self) -> String {
        self.state.read().unwrap().current_nick.clone()
    }

    fn set_session_state(&self, session: SessionState) {
        self.state.write().unwrap().session = session;
    }

    fn merged_settings(&self) -> HashMap<String, String> {
        let mut merged = HashMap::new();
        for def in self.definitions.read().unwrap().iter() {
            merged.extend(def.settings.clone());
        }
        merged
    }

    fn reset_channel_health(&self, network: &Arc<IrcNetwork>) {
        let mut health = self.channel_health.write().unwrap();
        health.clear();
        for channel in network.channels.iter().filter(|c| c.enabled) {
            health.insert(channel.name.to_lowercase(), ChannelHealth::default());
        }
    }

    fn mark_monitoring(&self, channel: &str) {
        let mut health = self.channel_health.write().unwrap();
        let entry = health.entry(channel.to_lowercase()).or_default();
        if !entry.monitoring {
            entry.monitoring = true;
            entry.monitoring_since = Some(Utc::now());
        }
    }

    fn mark_not_monitoring(&self, channel: &str) {
        if let Some(entry) = self
            .channel_health
            .write()
            .unwrap()
            .get_mut(&channel.to_lowercase())
        {
            entry.monitoring = false;
        }
    }

    fn touch_last_announce(&self, channel: &str) {
        if let Some(entry) = self.channel_health.write().unwrap().get_mut(channel) {
            entry.last_announce = Some(Utc::now());
        }
    }

    fn all_channels_monitored(&self, network: &Arc<IrcNetwork>) -> bool {
        let health = self.channel_health.read().unwrap();
        network
            .channels
            .iter()
            .filter(|c| c.enabled)
            .all(|c| {
                health
                    .get(&c.name.to_lowercase())
                    .is_some_and(|h| h.monitoring)
            })
    }

    fn mark_disconnected(&self) {
        {
            let mut state = self.state.write().unwrap();
            state.session = SessionState::Disconnected;
            state.connected = false;
            state.connected_since = None;
        }
        let mut health = self.channel_health.write().unwrap();
        for entry in health.values_mut() {
            entry.monitoring = false;
        }
    }

    async fn terminate(&self) {
        self.mark_disconnected();
        self.set_session_state(SessionState::Terminated);
        *self.writer.lock().await = None;
    }
}

fn close_error(e: HandlerError) -> TransportError {
    match e {
        HandlerError::Transport(t) => t,
        HandlerError::NotConnected => TransportError::Closed,
    }
}

async fn deadline_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
