// Trait seams for the pipeline's external systems.
//
// CampaignStore: every read/write the pipeline makes against the data store.
// SocialScraper: the scraping actor platform, returning raw dataset items.
// SecondaryClassifier: the LLM used to reconcile ambiguous sentiment.
// ThemeTagger: phase 5 theme assignment.
//
// MockStore, MockScraper and MockClassifier in `testing` implement these
// so the whole pipeline runs in-memory under `cargo test`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use canvass_common::types::{
    Candidate, Comment, CommentUpsert, NewSentimentScore, NewTheme, Post, PostUpsert,
    Reconciliation, RunError, ScoredComment, ScrapingRun, ScrapingStatus, SentimentLabel, Trigger,
};

// ---------------------------------------------------------------------------
// CampaignStore
// ---------------------------------------------------------------------------

/// Result of inserting a baseline score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The comment already had a score row.
    AlreadyScored,
}

#[async_trait]
pub trait CampaignStore: Send + Sync {
    // --- Scraping runs ---

    /// Insert a run with status `running`, tagged with its trigger.
    async fn create_scraping_run(&self, trigger: Trigger) -> Result<ScrapingRun>;

    /// Move a run from `running` to a terminal status. Returns false when the
    /// run was already terminal (or missing) and nothing changed.
    async fn complete_scraping_run(
        &self,
        run_id: Uuid,
        status: ScrapingStatus,
        duration_seconds: f64,
    ) -> Result<bool>;

    async fn get_scraping_run(&self, run_id: Uuid) -> Result<Option<ScrapingRun>>;

    /// Completion time of the newest successful run.
    async fn last_successful_scrape(&self) -> Result<Option<DateTime<Utc>>>;

    async fn add_run_counts(&self, run_id: Uuid, posts: i64, comments: i64) -> Result<()>;

    async fn append_run_error(&self, run_id: Uuid, error: &RunError) -> Result<()>;

    // --- Candidates and content ---

    /// Active candidates in listing order.
    async fn active_candidates(&self) -> Result<Vec<Candidate>>;

    async fn find_candidate_by_username(&self, username: &str) -> Result<Option<Candidate>>;

    async fn get_candidate(&self, candidate_id: Uuid) -> Result<Option<Candidate>>;

    async fn upsert_post(&self, post: &PostUpsert) -> Result<Post>;

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>>;

    /// Every stored post, oldest first.
    async fn all_posts(&self) -> Result<Vec<Post>>;

    async fn upsert_comment(&self, comment: &CommentUpsert) -> Result<Comment>;

    async fn comments_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>>;

    async fn count_comments(&self) -> Result<u64>;

    // --- Sentiment ---

    /// Comments without a sentiment score row.
    async fn unscored_comments(&self) -> Result<Vec<Comment>>;

    async fn insert_sentiment_score(&self, score: &NewSentimentScore) -> Result<InsertOutcome>;

    /// Scored comments with compound strictly inside `(negative, positive)`
    /// and no LLM label yet, joined with their text.
    async fn reconciliation_candidates(&self, negative: f64, positive: f64) -> Result<Vec<ScoredComment>>;

    /// Persist LLM fields and final label. Only applies to rows without an
    /// LLM label; returns false if the row was already reconciled.
    async fn apply_reconciliation(&self, reconciliation: &Reconciliation) -> Result<bool>;

    // --- Themes ---

    /// Comments with no theme row.
    async fn unthemed_comments(&self) -> Result<Vec<Comment>>;

    async fn upsert_theme(&self, theme: &NewTheme) -> Result<()>;

    // --- Health ---

    async fn ping(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SocialScraper
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SocialScraper: Send + Sync {
    /// Latest posts of a profile as raw actor items.
    async fn scrape_posts(&self, username: &str, limit: u32) -> Result<Vec<Value>>;

    /// Comments of one post as raw actor items.
    async fn scrape_comments(&self, post_url: &str, limit: u32) -> Result<Vec<Value>>;
}

#[async_trait]
impl SocialScraper for apify_client::ApifyClient {
    async fn scrape_posts(&self, username: &str, limit: u32) -> Result<Vec<Value>> {
        Ok(self.scrape_instagram_posts(username, limit).await?)
    }

    async fn scrape_comments(&self, post_url: &str, limit: u32) -> Result<Vec<Value>> {
        Ok(self.scrape_instagram_comments(post_url, limit).await?)
    }
}

// ---------------------------------------------------------------------------
// SecondaryClassifier
// ---------------------------------------------------------------------------

/// A label from the secondary classifier. Label is already coerced to a known
/// value and confidence clamped to [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct LlmVerdict {
    pub label: SentimentLabel,
    pub confidence: f64,
    pub model: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    /// Network failure, timeout or non-success HTTP status.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response arrived but could not be interpreted.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ClassifyError {
    pub fn kind(&self) -> &'static str {
        match self {
            ClassifyError::Transport(_) => "transport",
            ClassifyError::Malformed(_) => "malformed",
        }
    }
}

#[async_trait]
pub trait SecondaryClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> std::result::Result<LlmVerdict, ClassifyError>;
}

// ---------------------------------------------------------------------------
// ThemeTagger
// ---------------------------------------------------------------------------

pub trait ThemeTagger: Send + Sync {
    /// Theme rows for one comment. Never empty.
    fn tag(&self, comment: &Comment) -> Vec<NewTheme>;
}
