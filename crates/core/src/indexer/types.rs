use serde::Deserialize;
use std::collections::HashMap;

/// One declarative indexer definition.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexerDefinition {
    pub identifier: String,
    pub name: String,
    pub irc: IndexerIrc,
    pub parse: ParseRules,
    #[serde(rename = "match")]
    pub match_rules: MatchRules,
    /// User-supplied values for the declared settings, merged in by the
    /// registry. Not part of the definition document itself.
    #[serde(skip)]
    pub settings: HashMap<String, String>,
}

/// IRC presence of an indexer: where it announces and who posts.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexerIrc {
    pub network: String,
    pub server: String,
    #[serde(default = "default_irc_port")]
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    pub channels: Vec<String>,
    pub announcers: Vec<String>,
    /// Declared user settings (passkey, authkey, ...).
    #[serde(default)]
    pub settings: Vec<SettingDescriptor>,
}

fn default_irc_port() -> u16 {
    6667
}

/// Descriptor for one user-supplied setting.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingDescriptor {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub secret: bool,
}

/// Announcement format: one regex rule per announcement line.
#[derive(Debug, Clone, Deserialize)]
pub struct ParseRules {
    #[serde(rename = "type")]
    pub parse_type: ParseType,
    /// Variable names whose captured values form the buffering key for
    /// multi-line announcements.
    #[serde(default)]
    pub multi_key: Vec<String>,
    pub lines: Vec<ParseLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseType {
    /// Every announcement fits one line; parse immediately.
    Single,
    /// Announcements span several lines; buffer until the terminal line.
    Multi,
}

/// One announcement line: a pattern with positionally-bound variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ParseLine {
    pub pattern: String,
    pub vars: Vec<String>,
    /// Optional per-variable value translations, applied after capture.
    #[serde(default)]
    pub mappings: Option<HashMap<String, HashMap<String, String>>>,
}

/// Release composition rules.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchRules {
    /// Template producing the final download URL, `{{ .var }}` syntax.
    #[serde(rename = "torrenturl")]
    pub torrent_url: String,
}
