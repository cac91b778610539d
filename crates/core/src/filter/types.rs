use serde::{Deserialize, Serialize};

/// A named predicate over release attributes with a target action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    /// Filters are evaluated highest priority first.
    #[serde(default)]
    pub priority: i32,
    /// Indexer whitelist; empty matches any indexer.
    #[serde(default)]
    pub indexers: Vec<String>,
    /// Include regexes against the release name; any hit passes.
    #[serde(default)]
    pub match_releases: Vec<String>,
    /// Exclude regexes against the release name; any hit rejects.
    #[serde(default)]
    pub except_releases: Vec<String>,
    /// Accepted categories; empty matches any.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Required tags; every listed tag must be announced.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
    /// Video predicates, matched against the release name.
    #[serde(default)]
    pub resolutions: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub codecs: Vec<String>,
    /// Require the announce to be freeleech.
    #[serde(default)]
    pub freeleech: bool,
    pub action: FilterAction,
}

/// What to do with a matched release.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterAction {
    /// Name of the configured download client.
    pub client: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    #[serde(default)]
    pub paused: bool,
}

/// Why one filter turned a release down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterRejection {
    pub filter: String,
    pub reason: String,
}

/// Outcome of evaluating a release against the filter chain.
#[derive(Debug, Clone)]
pub enum MatchResult {
    /// First filter whose predicates all passed.
    Matched(Filter),
    /// Every evaluated filter rejected; reasons for the operator.
    Rejected(Vec<FilterRejection>),
}
