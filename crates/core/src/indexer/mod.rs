//! Indexer definition registry.
//!
//! Definitions are declarative per-indexer documents: which IRC network the
//! tracker announces on, which bot nicks post the announcements, the regex
//! rules that turn an announcement line into a release, and the template
//! that composes the final download URL. They are loaded once at startup
//! and immutable afterwards; user-supplied secrets from the configuration
//! are merged in at registry construction.

mod types;

pub use types::*;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::config::IndexerUserConfig;

/// Errors produced while building the registry.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Failed to parse indexer definition: {0}")]
    ParseError(String),

    #[error("Duplicate indexer identifier: {0}")]
    DuplicateIdentifier(String),

    #[error("Indexer {indexer} is missing required setting {setting:?}")]
    MissingSetting { indexer: String, setting: String },
}

/// Immutable set of indexer definitions, queried by the supervisor when it
/// binds definitions to a handler.
pub struct IndexerRegistry {
    definitions: Vec<Arc<IndexerDefinition>>,
}

impl IndexerRegistry {
    /// Build a registry from parsed definitions and per-indexer user
    /// settings. Settings declared required by a definition must be present.
    pub fn new(
        definitions: Vec<IndexerDefinition>,
        user_configs: &[IndexerUserConfig],
    ) -> Result<Self, IndexerError> {
        let user_settings: HashMap<&str, &HashMap<String, String>> = user_configs
            .iter()
            .map(|c| (c.identifier.as_str(), &c.settings))
            .collect();

        let mut seen: HashMap<String, ()> = HashMap::new();
        let mut merged = Vec::with_capacity(definitions.len());

        for mut def in definitions {
            if seen.insert(def.identifier.clone(), ()).is_some() {
                return Err(IndexerError::DuplicateIdentifier(def.identifier));
            }

            if let Some(settings) = user_settings.get(def.identifier.as_str()) {
                def.settings = (*settings).clone();
            }

            for descriptor in &def.irc.settings {
                if descriptor.required && !def.settings.contains_key(&descriptor.name) {
                    return Err(IndexerError::MissingSetting {
                        indexer: def.identifier.clone(),
                        setting: descriptor.name.clone(),
                    });
                }
            }

            merged.push(Arc::new(def));
        }

        Ok(Self {
            definitions: merged,
        })
    }

    /// Parse a single definition from its TOML document.
    pub fn parse_definition(toml_str: &str) -> Result<IndexerDefinition, IndexerError> {
        toml::from_str(toml_str).map_err(|e| IndexerError::ParseError(e.to_string()))
    }

    /// Definitions announcing on the given IRC server.
    pub fn by_server(&self, server: &str) -> Vec<Arc<IndexerDefinition>> {
        self.definitions
            .iter()
            .filter(|d| d.irc.server.eq_ignore_ascii_case(server))
            .cloned()
            .collect()
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<IndexerDefinition>> {
        self.definitions
            .iter()
            .find(|d| d.identifier == identifier)
            .cloned()
    }

    pub fn all(&self) -> &[Arc<IndexerDefinition>] {
        &self.definitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(identifier: &str, server: &str) -> IndexerDefinition {
        IndexerDefinition {
            identifier: identifier.to_string(),
            name: identifier.to_string(),
            irc: IndexerIrc {
                network: "ExampleNet".to_string(),
                server: server.to_string(),
                port: 6697,
                tls: true,
                channels: vec!["#announce".to_string()],
                announcers: vec!["AnnounceBot".to_string()],
                settings: vec![],
            },
            parse: ParseRules {
                parse_type: ParseType::Single,
                multi_key: vec![],
                lines: vec![ParseLine {
                    pattern: "^(.*)$".to_string(),
                    vars: vec!["torrentName".to_string()],
                    mappings: None,
                }],
            },
            match_rules: MatchRules {
                torrent_url: "https://example.org/dl/{{ .torrentId }}".to_string(),
            },
            settings: HashMap::new(),
        }
    }

    #[test]
    fn test_by_server_case_insensitive() {
        let registry = IndexerRegistry::new(
            vec![
                definition("alpha", "irc.alpha.org"),
                definition("beta", "irc.beta.org"),
            ],
            &[],
        )
        .unwrap();

        let found = registry.by_server("IRC.ALPHA.ORG");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].identifier, "alpha");
    }

    #[test]
    fn test_duplicate_identifier_rejected() {
        let result = IndexerRegistry::new(
            vec![
                definition("alpha", "irc.alpha.org"),
                definition("alpha", "irc.other.org"),
            ],
            &[],
        );
        assert!(matches!(result, Err(IndexerError::DuplicateIdentifier(_))));
    }

    #[test]
    fn test_user_settings_merged() {
        let user = IndexerUserConfig {
            identifier: "alpha".to_string(),
            settings: HashMap::from([("passkey".to_string(), "PK".to_string())]),
        };
        let registry = IndexerRegistry::new(vec![definition("alpha", "irc.alpha.org")], &[user])
            .unwrap();

        let def = registry.get("alpha").unwrap();
        assert_eq!(def.settings.get("passkey").map(String::as_str), Some("PK"));
    }

    #[test]
    fn test_missing_required_setting_rejected() {
        let mut def = definition("alpha", "irc.alpha.org");
        def.irc.settings.push(SettingDescriptor {
            name: "passkey".to_string(),
            label: None,
            required: true,
            secret: true,
        });

        let result = IndexerRegistry::new(vec![def], &[]);
        assert!(matches!(result, Err(IndexerError::MissingSetting { .. })));
    }

    #[test]
    fn test_parse_definition_toml() {
        let def = IndexerRegistry::parse_definition(
            r##"
identifier = "example"
name = "Example"

[irc]
network = "ExampleNet"
server = "irc.example.org"
port = 6697
tls = true
channels = ["#example-announce"]
announcers = ["ExampleBot"]

[[irc.settings]]
name = "passkey"
required = true
secret = true

[parse]
type = "single"

[[parse.lines]]
pattern = 'New Torrent: (.*) Freeleech: (.*) Size: (.*) - (https?://.*)/details\.php\?id=(\d+)'
vars = ["torrentName", "freeleech", "torrentSize", "baseUrl", "torrentId"]

[match]
torrenturl = "{{ .baseUrl }}/download.php?id={{ .torrentId }}&passkey={{ .passkey }}"
"##,
        )
        .unwrap();

        assert_eq!(def.identifier, "example");
        assert_eq!(def.parse.parse_type, ParseType::Single);
        assert_eq!(def.parse.lines.len(), 1);
        assert_eq!(def.parse.lines[0].vars.len(), 5);
        assert!(def.match_rules.torrent_url.contains("{{ .passkey }}"));
        assert!(def.irc.settings[0].required);
    }
}
