use std::collections::HashMap;
use std::sync::Arc;

use regex_lite::Regex;

use super::multiline::MultiLineBuffer;
use super::{template, ParseError};
use crate::humanize::parse_size;
use crate::indexer::{IndexerDefinition, ParseLine, ParseType};
use crate::release::Release;

/// Rule engine for one indexer's announcement format.
///
/// Stateless for `single` definitions; `multi` definitions buffer bindings
/// per join key until the terminal line arrives.
pub struct AnnounceProcessor {
    def: Arc<IndexerDefinition>,
    patterns: Vec<Regex>,
    buffer: MultiLineBuffer,
}

impl AnnounceProcessor {
    pub fn new(def: Arc<IndexerDefinition>) -> Result<Self, ParseError> {
        let patterns = def
            .parse
            .lines
            .iter()
            .map(|line| {
                Regex::new(&line.pattern).map_err(|e| ParseError::InvalidPattern {
                    pattern: line.pattern.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            def,
            patterns,
            buffer: MultiLineBuffer::default(),
        })
    }

    pub fn definition(&self) -> &Arc<IndexerDefinition> {
        &self.def
    }

    /// Feed one announcement line.
    ///
    /// `Ok(None)` means the line is not applicable to this indexer (or a
    /// multi-line announcement is still incomplete); other indexers on the
    /// same channel get their turn. `Err(InvalidRelease)` means the line
    /// matched but the composed release is unusable.
    pub fn handle_line(&mut self, line: &str) -> Result<Option<Release>, ParseError> {
        let terminal_idx = self.patterns.len().saturating_sub(1);

        for (idx, regex) in self.patterns.iter().enumerate() {
            let Some(captures) = regex.captures(line) else {
                continue;
            };

            let rule = &self.def.parse.lines[idx];
            let bound = bind_captures(rule, &captures);

            match self.def.parse.parse_type {
                ParseType::Single => return self.finalize(bound).map(Some),
                ParseType::Multi => {
                    let key = self.join_key(&bound);
                    if idx == terminal_idx {
                        let mut merged = self.buffer.take(&key).unwrap_or_default();
                        merged.extend(bound);
                        return self.finalize(merged).map(Some);
                    }
                    self.buffer.accumulate(&key, bound);
                    return Ok(None);
                }
            }
        }

        Ok(None)
    }

    fn join_key(&self, bound: &HashMap<String, String>) -> String {
        self.def
            .parse
            .multi_key
            .iter()
            .map(|name| bound.get(name).map(String::as_str).unwrap_or(""))
            .collect::<Vec<_>>()
            .join(":")
    }

    fn finalize(&self, bound: HashMap<String, String>) -> Result<Release, ParseError> {
        // Binding dictionary: user settings overlaid with captured vars, so
        // a capture wins any name collision.
        let mut vars = self.def.settings.clone();
        vars.extend(bound);

        let url = template::render(&self.def.match_rules.torrent_url, &vars);
        if url.is_empty() || !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ParseError::InvalidRelease(format!(
                "composed download url {:?} has no scheme",
                url
            )));
        }

        let torrent_name = vars.get("torrentName").cloned().unwrap_or_default();
        if torrent_name.is_empty() {
            return Err(ParseError::InvalidRelease(
                "announcement bound no torrentName".to_string(),
            ));
        }

        Ok(Release {
            id: 0,
            indexer: self.def.identifier.clone(),
            torrent_name,
            category: non_empty(&vars, "category"),
            year: non_empty(&vars, "year"),
            tags: non_empty(&vars, "tags"),
            size_bytes: vars.get("torrentSize").and_then(|s| parse_size(s)),
            freeleech: vars.get("freeleech").map(|v| truthy(v)).unwrap_or(false),
            download_url: url,
            vars,
            timestamp: chrono::Utc::now(),
        })
    }
}

fn bind_captures(rule: &ParseLine, captures: &regex_lite::Captures) -> HashMap<String, String> {
    let mut bound = HashMap::with_capacity(rule.vars.len());

    for (i, name) in rule.vars.iter().enumerate() {
        let value = captures
            .get(i + 1)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();

        let value = match rule.mappings.as_ref().and_then(|m| m.get(name)) {
            // A mapped variable is replaced by the lookup; unknown keys map
            // to the empty string.
            Some(table) => table.get(&value).cloned().unwrap_or_default(),
            None => value,
        };

        bound.insert(name.clone(), value);
    }

    bound
}

fn non_empty(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name).filter(|v| !v.is_empty()).cloned()
}

fn truthy(v: &str) -> bool {
    !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false")
}
