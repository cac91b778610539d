//! Core data model shared across the announce pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// NickServ identity used for registration and identification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NickServ {
    pub account: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// A configured IRC network. One live handler exists per enabled network,
/// keyed by (server, nickserv account).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IrcNetwork {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    pub server: String,
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    /// Server password (PASS), not the NickServ password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
    /// Raw invite command template, rendered with indexer settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_command: Option<String>,
    pub nickserv: NickServ,
    #[serde(default)]
    pub channels: Vec<IrcChannel>,
}

impl IrcNetwork {
    pub fn handler_key(&self) -> HandlerKey {
        HandlerKey {
            server: self.server.clone(),
            account: self.nickserv.account.clone(),
        }
    }
}

/// A channel on a network. Names are matched lowercased everywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrcChannel {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Joined but muted: lines from a detached channel are not parsed.
    #[serde(default)]
    pub detached: bool,
}

/// Handlers are keyed by (server, nickserv account) so one physical server
/// can host several logical sessions under different identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerKey {
    pub server: String,
    pub account: String,
}

/// Per-channel runtime record, owned exclusively by the handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelHealth {
    pub monitoring: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring_since: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_announce: Option<DateTime<Utc>>,
}

/// Channel row joined with live handler health for the control plane.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelWithHealth {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    pub detached: bool,
    pub monitoring: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring_since: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_announce: Option<DateTime<Utc>>,
}

/// Network row joined with live connection state for the control plane.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkWithHealth {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    pub server: String,
    pub port: u16,
    pub tls: bool,
    pub nick: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_since: Option<DateTime<Utc>>,
    pub channels: Vec<ChannelWithHealth>,
}
