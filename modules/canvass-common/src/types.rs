use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }

    /// Anything outside the three known labels collapses to neutral.
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "positive" => Self::Positive,
            "negative" => Self::Negative,
            _ => Self::Neutral,
        }
    }
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapingStatus {
    Running,
    Success,
    Failed,
    Partial,
}

impl ScrapingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapingStatus::Running => "running",
            ScrapingStatus::Success => "success",
            ScrapingStatus::Failed => "failed",
            ScrapingStatus::Partial => "partial",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "partial" => Some(Self::Partial),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScrapingStatus::Running)
    }
}

impl std::fmt::Display for ScrapingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeCategory {
    Saude,
    Seguranca,
    Educacao,
    Economia,
    Infraestrutura,
    Corrupcao,
    Emprego,
    MeioAmbiente,
    Outros,
}

impl ThemeCategory {
    pub const ALL: [ThemeCategory; 9] = [
        ThemeCategory::Saude,
        ThemeCategory::Seguranca,
        ThemeCategory::Educacao,
        ThemeCategory::Economia,
        ThemeCategory::Infraestrutura,
        ThemeCategory::Corrupcao,
        ThemeCategory::Emprego,
        ThemeCategory::MeioAmbiente,
        ThemeCategory::Outros,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeCategory::Saude => "saude",
            ThemeCategory::Seguranca => "seguranca",
            ThemeCategory::Educacao => "educacao",
            ThemeCategory::Economia => "economia",
            ThemeCategory::Infraestrutura => "infraestrutura",
            ThemeCategory::Corrupcao => "corrupcao",
            ThemeCategory::Emprego => "emprego",
            ThemeCategory::MeioAmbiente => "meio_ambiente",
            ThemeCategory::Outros => "outros",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .unwrap_or(ThemeCategory::Outros)
    }
}

impl std::fmt::Display for ThemeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMethod {
    Keyword,
    Llm,
}

impl AnalysisMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMethod::Keyword => "keyword",
            AnalysisMethod::Llm => "llm",
        }
    }
}

impl std::fmt::Display for AnalysisMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
    Carousel,
    Unknown,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Carousel => "carousel",
            MediaType::Unknown => "unknown",
        }
    }

    /// Map an Instagram media type name (`Image`, `Video`, `Sidecar`, ...).
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "image" => Self::Image,
            "video" => Self::Video,
            "carousel" | "sidecar" => Self::Carousel,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What started a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Scheduler,
    Manual,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Scheduler => "scheduler",
            Trigger::Manual => "manual",
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Rows ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub is_active: bool,
}

impl Candidate {
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub instagram_id: String,
    pub url: String,
    pub shortcode: Option<String>,
    pub caption: Option<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub media_type: MediaType,
    pub posted_at: Option<DateTime<Utc>>,
}

/// Insert-or-refresh payload for a post, keyed by `instagram_id`.
#[derive(Debug, Clone)]
pub struct PostUpsert {
    pub candidate_id: Uuid,
    pub scraping_run_id: Uuid,
    pub instagram_id: String,
    pub url: String,
    pub shortcode: Option<String>,
    pub caption: Option<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub media_type: MediaType,
    pub is_sponsored: bool,
    pub video_view_count: Option<i64>,
    pub posted_at: Option<DateTime<Utc>>,
    pub raw_data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub text: String,
    pub author_username: Option<String>,
    pub like_count: i64,
}

/// Insert-or-refresh payload for a comment, keyed by `instagram_id`.
#[derive(Debug, Clone)]
pub struct CommentUpsert {
    pub post_id: Uuid,
    pub scraping_run_id: Uuid,
    pub instagram_id: String,
    pub text: String,
    pub author_username: Option<String>,
    pub like_count: i64,
    pub reply_count: i64,
    pub commented_at: Option<DateTime<Utc>>,
    pub raw_data: serde_json::Value,
}

/// One entry in a run's error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    pub candidate: String,
    pub phase: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<Uuid>,
}

impl RunError {
    pub fn new(candidate: impl Into<String>, phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            phase: phase.into(),
            message: message.into(),
            timestamp: Utc::now(),
            post_url: None,
            post_id: None,
        }
    }

    pub fn with_post(mut self, post_id: Uuid, post_url: impl Into<String>) -> Self {
        self.post_id = Some(post_id);
        self.post_url = Some(post_url.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ScrapingStatus,
    pub posts_scraped: i64,
    pub comments_scraped: i64,
    pub duration_seconds: Option<f64>,
    pub errors: Vec<RunError>,
    pub metadata: serde_json::Value,
}

/// Baseline score for a comment that has not been scored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSentimentScore {
    pub comment_id: Uuid,
    pub vader_compound: f64,
    pub vader_positive: f64,
    pub vader_negative: f64,
    pub vader_neutral: f64,
    pub vader_label: SentimentLabel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentScore {
    pub id: Uuid,
    pub comment_id: Uuid,
    pub vader_compound: f64,
    pub vader_positive: f64,
    pub vader_negative: f64,
    pub vader_neutral: f64,
    pub vader_label: SentimentLabel,
    pub llm_label: Option<SentimentLabel>,
    pub llm_confidence: Option<f64>,
    pub llm_model: Option<String>,
    pub final_label: SentimentLabel,
}

/// A scored comment joined with its text, as fed to the ambiguity gate.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredComment {
    pub comment_id: Uuid,
    pub text: String,
    pub vader_compound: f64,
    pub vader_label: SentimentLabel,
    pub llm_label: Option<SentimentLabel>,
}

/// Outcome of the secondary classifier, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub comment_id: Uuid,
    pub llm_label: SentimentLabel,
    pub llm_confidence: f64,
    pub llm_model: String,
    pub final_label: SentimentLabel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTheme {
    pub comment_id: Uuid,
    pub theme: ThemeCategory,
    pub confidence: f64,
    pub method: AnalysisMethod,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sentiment_labels_collapse_to_neutral() {
        assert_eq!(SentimentLabel::from_str_loose("Positive"), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::from_str_loose(" negative "), SentimentLabel::Negative);
        assert_eq!(SentimentLabel::from_str_loose("mixed"), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_str_loose(""), SentimentLabel::Neutral);
    }

    #[test]
    fn media_type_maps_instagram_names() {
        assert_eq!(MediaType::from_str_loose("Image"), MediaType::Image);
        assert_eq!(MediaType::from_str_loose("VIDEO"), MediaType::Video);
        assert_eq!(MediaType::from_str_loose("Sidecar"), MediaType::Carousel);
        assert_eq!(MediaType::from_str_loose("carousel"), MediaType::Carousel);
        assert_eq!(MediaType::from_str_loose("reel"), MediaType::Unknown);
    }

    #[test]
    fn only_running_is_non_terminal() {
        assert!(!ScrapingStatus::Running.is_terminal());
        assert!(ScrapingStatus::Success.is_terminal());
        assert!(ScrapingStatus::Failed.is_terminal());
        assert!(ScrapingStatus::Partial.is_terminal());
        assert_eq!(ScrapingStatus::parse("partial"), Some(ScrapingStatus::Partial));
        assert_eq!(ScrapingStatus::parse("done"), None);
    }

    #[test]
    fn theme_names_match_storage_values() {
        assert_eq!(ThemeCategory::MeioAmbiente.as_str(), "meio_ambiente");
        assert_eq!(ThemeCategory::from_str_loose("corrupcao"), ThemeCategory::Corrupcao);
        assert_eq!(ThemeCategory::from_str_loose("esporte"), ThemeCategory::Outros);
        let json = serde_json::to_string(&ThemeCategory::MeioAmbiente).unwrap();
        assert_eq!(json, "\"meio_ambiente\"");
    }

    #[test]
    fn run_error_omits_absent_post_fields() {
        let err = RunError::new("candidata", "post_scraping", "boom");
        let json = serde_json::to_value(&err).unwrap();
        assert!(json.get("post_url").is_none());
        assert_eq!(json["phase"], "post_scraping");

        let with_post = err.with_post(Uuid::nil(), "https://instagram.com/p/x");
        let json = serde_json::to_value(&with_post).unwrap();
        assert_eq!(json["post_url"], "https://instagram.com/p/x");
    }
}
