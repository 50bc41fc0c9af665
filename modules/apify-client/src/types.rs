use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input for the apify/instagram-post-scraper actor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstagramScraperInput {
    pub username: Vec<String>,
    pub results_limit: u32,
}

/// Input for the apify/instagram-comment-scraper actor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstagramCommentScraperInput {
    pub direct_urls: Vec<String>,
    pub results_limit: u32,
}

/// Every Apify v2 object endpoint wraps its payload in `{"data": ...}`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

/// Lifecycle state of an actor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum RunStatus {
    Ready,
    Running,
    Succeeded,
    Failed,
    TimingOut,
    TimedOut,
    Aborting,
    Aborted,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Failed, timed out or aborted. `Unknown` is treated as still running.
    pub fn is_failure(self) -> bool {
        matches!(self, RunStatus::Failed | RunStatus::TimedOut | RunStatus::Aborted)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Ready => "READY",
            RunStatus::Running => "RUNNING",
            RunStatus::Succeeded => "SUCCEEDED",
            RunStatus::Failed => "FAILED",
            RunStatus::TimingOut => "TIMING-OUT",
            RunStatus::TimedOut => "TIMED-OUT",
            RunStatus::Aborting => "ABORTING",
            RunStatus::Aborted => "ABORTED",
            RunStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Metadata for an actor run.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunData {
    pub id: String,
    pub status: RunStatus,
    pub default_dataset_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_parse_from_apify_spelling() {
        let run: RunData = serde_json::from_value(serde_json::json!({
            "id": "r", "status": "TIMED-OUT", "defaultDatasetId": "d"
        }))
        .unwrap();
        assert_eq!(run.status, RunStatus::TimedOut);
        assert!(run.status.is_failure());
        assert_eq!(run.status.to_string(), "TIMED-OUT");
    }

    #[test]
    fn unrecognised_status_is_not_a_failure() {
        let status: RunStatus = serde_json::from_value(serde_json::json!("PAUSED")).unwrap();
        assert_eq!(status, RunStatus::Unknown);
        assert!(!status.is_failure());
    }
}
