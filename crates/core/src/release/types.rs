use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A structured record parsed from one announcement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Release {
    /// Assigned by the release store; 0 until persisted.
    #[serde(default)]
    pub id: i64,
    /// Identifier of the indexer that announced it.
    pub indexer: String,
    pub torrent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    /// Raw tag string as announced, e.g. "hip.hop,rhythm.and.blues,2000s".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub freeleech: bool,
    /// Fully-composed download URL. Never empty for a valid release.
    pub download_url: String,
    /// Every bound variable verbatim, for filter predicates.
    #[serde(default)]
    pub vars: HashMap<String, String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Release {
    /// Variable lookup falling back to the empty string.
    pub fn var(&self, name: &str) -> &str {
        self.vars.get(name).map(String::as_str).unwrap_or("")
    }
}

/// Lifecycle status of a release inside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseStatus {
    Pending,
    Duplicate,
    FilterRejected,
    PushApproved,
    PushRejected,
    PushError,
}

impl ReleaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseStatus::Pending => "PENDING",
            ReleaseStatus::Duplicate => "DUPLICATE",
            ReleaseStatus::FilterRejected => "FILTER_REJECTED",
            ReleaseStatus::PushApproved => "PUSH_APPROVED",
            ReleaseStatus::PushRejected => "PUSH_REJECTED",
            ReleaseStatus::PushError => "PUSH_ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ReleaseStatus::Pending),
            "DUPLICATE" => Some(ReleaseStatus::Duplicate),
            "FILTER_REJECTED" => Some(ReleaseStatus::FilterRejected),
            "PUSH_APPROVED" => Some(ReleaseStatus::PushApproved),
            "PUSH_REJECTED" => Some(ReleaseStatus::PushRejected),
            "PUSH_ERROR" => Some(ReleaseStatus::PushError),
            _ => None,
        }
    }

    /// Terminal statuses end the dedup window debate: an identical release
    /// arriving while one of these is on record becomes DUPLICATE.
    /// PUSH_ERROR is deliberately not terminal so a re-announce can retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReleaseStatus::PushApproved
                | ReleaseStatus::PushRejected
                | ReleaseStatus::FilterRejected
        )
    }
}

/// One status event in a release's ordered history.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseActionStatus {
    pub id: i64,
    pub release_id: i64,
    pub status: ReleaseStatus,
    /// Filter that matched (or none for pre-filter statuses).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Download client the release was pushed to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    /// Rejection reasons, one per rejecting filter or push failure.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejections: Vec<String>,
    pub timestamp: DateTime<Utc>,
}
