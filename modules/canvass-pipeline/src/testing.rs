// Test mocks for the canvass pipeline.
//
// Three mocks matching the three external seams:
// - MockStore (CampaignStore): stateful in-memory tables
// - MockScraper (SocialScraper): HashMap-based username/url -> items
// - MockClassifier (SecondaryClassifier): text -> verdict, with failures
//
// Plus JSON builders for raw actor items.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use canvass_common::types::{
    Candidate, Comment, CommentUpsert, NewSentimentScore, NewTheme, Post, PostUpsert,
    Reconciliation, RunError, ScoredComment, ScrapingRun, ScrapingStatus, SentimentLabel,
    SentimentScore, Trigger,
};

use crate::traits::{
    CampaignStore, ClassifyError, InsertOutcome, LlmVerdict, SecondaryClassifier, SocialScraper,
};

// ---------------------------------------------------------------------------
// Raw item builders
// ---------------------------------------------------------------------------

/// A post item shaped like the Instagram post scraper's output.
pub fn post_item(id: &str, url: &str) -> Value {
    json!({
        "id": id,
        "url": url,
        "shortCode": id,
        "caption": format!("Post {id}"),
        "likesCount": 10,
        "commentsCount": 2,
        "type": "Image",
        "timestamp": "2024-09-01T12:00:00.000Z"
    })
}

/// A comment item shaped like the Instagram comment scraper's output.
pub fn comment_item(id: &str, text: &str) -> Value {
    json!({
        "id": id,
        "text": text,
        "ownerUsername": "eleitor",
        "likesCount": 1,
        "replies": [],
        "timestamp": "2024-09-01T13:00:00.000Z"
    })
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

struct StoredPost {
    post: Post,
    scraping_run_id: Uuid,
}

struct StoredComment {
    comment: Comment,
    instagram_id: String,
}

#[derive(Default)]
struct MockStoreInner {
    candidates: Vec<Candidate>,
    runs: Vec<ScrapingRun>,
    posts: Vec<StoredPost>,
    comments: Vec<StoredComment>,
    scores: Vec<SentimentScore>,
    themes: Vec<NewTheme>,
    fail_create_run: bool,
    fail_ping: bool,
    fail_unscored: bool,
    panic_on_themes: bool,
    failing_score_inserts: HashSet<Uuid>,
}

/// In-memory `CampaignStore`. Thread-safe via interior Mutex.
pub struct MockStore {
    inner: Mutex<MockStoreInner>,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MockStoreInner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockStoreInner> {
        self.inner.lock().unwrap()
    }

    pub fn with_candidate(self, username: &str) -> Self {
        self.add_candidate(username, true);
        self
    }

    pub fn with_inactive_candidate(self, username: &str) -> Self {
        self.add_candidate(username, false);
        self
    }

    /// `create_scraping_run` fails, as if the database were down.
    pub fn failing_run_creation(self) -> Self {
        self.lock().fail_create_run = true;
        self
    }

    /// `ping` and `create_scraping_run` fail, as if the database were unreachable.
    pub fn unreachable(self) -> Self {
        {
            let mut inner = self.lock();
            inner.fail_ping = true;
            inner.fail_create_run = true;
        }
        self
    }

    /// `unscored_comments` fails, aborting phase 3.
    pub fn failing_unscored_lookup(self) -> Self {
        self.lock().fail_unscored = true;
        self
    }

    /// `unthemed_comments` panics, blowing up phase 5.
    pub fn panicking_on_themes(self) -> Self {
        self.lock().panic_on_themes = true;
        self
    }

    pub fn fail_score_insert_for(&self, comment_id: Uuid) {
        self.lock().failing_score_inserts.insert(comment_id);
    }

    fn add_candidate(&self, username: &str, is_active: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().candidates.push(Candidate {
            id,
            username: username.to_string(),
            display_name: Some(format!("Candidata {username}")),
            is_active,
        });
        id
    }

    /// Insert a post directly. Returns its id.
    pub fn seed_post(&self, username: &str, caption: &str) -> Uuid {
        let mut inner = self.lock();
        let candidate_id = inner
            .candidates
            .iter()
            .find(|c| c.username == username)
            .map(|c| c.id)
            .expect("seed_post: unknown candidate");
        let id = Uuid::new_v4();
        inner.posts.push(StoredPost {
            post: Post {
                id,
                candidate_id,
                instagram_id: id.to_string(),
                url: format!("https://www.instagram.com/p/{id}/"),
                shortcode: None,
                caption: Some(caption.to_string()),
                like_count: 0,
                comment_count: 0,
                media_type: canvass_common::types::MediaType::Image,
                posted_at: None,
            },
            scraping_run_id: Uuid::nil(),
        });
        id
    }

    /// Insert a comment directly. Returns its id.
    pub fn seed_comment(&self, post_id: Uuid, text: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().comments.push(StoredComment {
            comment: Comment {
                id,
                post_id,
                text: text.to_string(),
                author_username: None,
                like_count: 0,
            },
            instagram_id: id.to_string(),
        });
        id
    }

    /// Insert a comment with a baseline score already recorded.
    pub fn seed_scored_comment(&self, text: &str, compound: f64, label: SentimentLabel) -> Uuid {
        let id = self.seed_comment(Uuid::nil(), text);
        self.lock().scores.push(SentimentScore {
            id: Uuid::new_v4(),
            comment_id: id,
            vader_compound: compound,
            vader_positive: 0.0,
            vader_negative: 0.0,
            vader_neutral: 1.0,
            vader_label: label,
            llm_label: None,
            llm_confidence: None,
            llm_model: None,
            final_label: label,
        });
        id
    }

    // --- Inspection ---

    pub fn run(&self, run_id: Uuid) -> Option<ScrapingRun> {
        self.lock().runs.iter().find(|r| r.id == run_id).cloned()
    }

    pub fn runs(&self) -> Vec<ScrapingRun> {
        self.lock().runs.clone()
    }

    pub fn running_runs(&self) -> usize {
        self.lock()
            .runs
            .iter()
            .filter(|r| r.status == ScrapingStatus::Running)
            .count()
    }

    pub fn post_count(&self) -> usize {
        self.lock().posts.len()
    }

    pub fn posts_for_run(&self, run_id: Uuid) -> usize {
        self.lock()
            .posts
            .iter()
            .filter(|p| p.scraping_run_id == run_id)
            .count()
    }

    pub fn comment_count(&self) -> usize {
        self.lock().comments.len()
    }

    pub fn comment_id_by_text(&self, text: &str) -> Option<Uuid> {
        self.lock()
            .comments
            .iter()
            .find(|c| c.comment.text == text)
            .map(|c| c.comment.id)
    }

    pub fn score_count(&self) -> usize {
        self.lock().scores.len()
    }

    pub fn score_for(&self, comment_id: Uuid) -> Option<SentimentScore> {
        self.lock()
            .scores
            .iter()
            .find(|s| s.comment_id == comment_id)
            .cloned()
    }

    pub fn themes_for(&self, comment_id: Uuid) -> Vec<NewTheme> {
        self.lock()
            .themes
            .iter()
            .filter(|t| t.comment_id == comment_id)
            .cloned()
            .collect()
    }

    pub fn theme_count(&self) -> usize {
        self.lock().themes.len()
    }
}

#[async_trait]
impl CampaignStore for MockStore {
    async fn create_scraping_run(&self, trigger: Trigger) -> Result<ScrapingRun> {
        let mut inner = self.lock();
        if inner.fail_create_run {
            bail!("MockStore: connection refused");
        }
        let run = ScrapingRun {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            completed_at: None,
            status: ScrapingStatus::Running,
            posts_scraped: 0,
            comments_scraped: 0,
            duration_seconds: None,
            errors: Vec::new(),
            metadata: json!({ "trigger": trigger.as_str() }),
        };
        inner.runs.push(run.clone());
        Ok(run)
    }

    async fn complete_scraping_run(
        &self,
        run_id: Uuid,
        status: ScrapingStatus,
        duration_seconds: f64,
    ) -> Result<bool> {
        if !status.is_terminal() {
            bail!("MockStore: non-terminal status {status}");
        }
        let mut inner = self.lock();
        let Some(run) = inner
            .runs
            .iter_mut()
            .find(|r| r.id == run_id && r.status == ScrapingStatus::Running)
        else {
            return Ok(false);
        };
        run.status = status;
        run.completed_at = Some(Utc::now());
        run.duration_seconds = Some(duration_seconds);
        Ok(true)
    }

    async fn get_scraping_run(&self, run_id: Uuid) -> Result<Option<ScrapingRun>> {
        Ok(self.run(run_id))
    }

    async fn last_successful_scrape(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .lock()
            .runs
            .iter()
            .filter(|r| r.status == ScrapingStatus::Success)
            .filter_map(|r| r.completed_at)
            .max())
    }

    async fn add_run_counts(&self, run_id: Uuid, posts: i64, comments: i64) -> Result<()> {
        let mut inner = self.lock();
        if let Some(run) = inner.runs.iter_mut().find(|r| r.id == run_id) {
            run.posts_scraped += posts;
            run.comments_scraped += comments;
        }
        Ok(())
    }

    async fn append_run_error(&self, run_id: Uuid, error: &RunError) -> Result<()> {
        let mut inner = self.lock();
        if let Some(run) = inner.runs.iter_mut().find(|r| r.id == run_id) {
            run.errors.push(error.clone());
        }
        Ok(())
    }

    async fn active_candidates(&self) -> Result<Vec<Candidate>> {
        Ok(self
            .lock()
            .candidates
            .iter()
            .filter(|c| c.is_active)
            .cloned()
            .collect())
    }

    async fn find_candidate_by_username(&self, username: &str) -> Result<Option<Candidate>> {
        Ok(self
            .lock()
            .candidates
            .iter()
            .find(|c| c.username == username)
            .cloned())
    }

    async fn get_candidate(&self, candidate_id: Uuid) -> Result<Option<Candidate>> {
        Ok(self
            .lock()
            .candidates
            .iter()
            .find(|c| c.id == candidate_id)
            .cloned())
    }

    async fn upsert_post(&self, upsert: &PostUpsert) -> Result<Post> {
        let mut inner = self.lock();
        let post = Post {
            id: Uuid::new_v4(),
            candidate_id: upsert.candidate_id,
            instagram_id: upsert.instagram_id.clone(),
            url: upsert.url.clone(),
            shortcode: upsert.shortcode.clone(),
            caption: upsert.caption.clone(),
            like_count: upsert.like_count,
            comment_count: upsert.comment_count,
            media_type: upsert.media_type,
            posted_at: upsert.posted_at,
        };

        if let Some(existing) = inner
            .posts
            .iter_mut()
            .find(|p| p.post.instagram_id == upsert.instagram_id)
        {
            existing.post = Post { id: existing.post.id, ..post };
            existing.scraping_run_id = upsert.scraping_run_id;
            return Ok(existing.post.clone());
        }

        inner.posts.push(StoredPost {
            post: post.clone(),
            scraping_run_id: upsert.scraping_run_id,
        });
        Ok(post)
    }

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>> {
        Ok(self
            .lock()
            .posts
            .iter()
            .find(|p| p.post.id == post_id)
            .map(|p| p.post.clone()))
    }

    async fn all_posts(&self) -> Result<Vec<Post>> {
        Ok(self.lock().posts.iter().map(|p| p.post.clone()).collect())
    }

    async fn upsert_comment(&self, upsert: &CommentUpsert) -> Result<Comment> {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .comments
            .iter_mut()
            .find(|c| c.instagram_id == upsert.instagram_id)
        {
            existing.comment.text = upsert.text.clone();
            existing.comment.like_count = upsert.like_count;
            existing.comment.author_username = upsert.author_username.clone();
            return Ok(existing.comment.clone());
        }

        let comment = Comment {
            id: Uuid::new_v4(),
            post_id: upsert.post_id,
            text: upsert.text.clone(),
            author_username: upsert.author_username.clone(),
            like_count: upsert.like_count,
        };
        inner.comments.push(StoredComment {
            comment: comment.clone(),
            instagram_id: upsert.instagram_id.clone(),
        });
        Ok(comment)
    }

    async fn comments_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        Ok(self
            .lock()
            .comments
            .iter()
            .filter(|c| c.comment.post_id == post_id)
            .map(|c| c.comment.clone())
            .collect())
    }

    async fn count_comments(&self) -> Result<u64> {
        Ok(self.lock().comments.len() as u64)
    }

    async fn unscored_comments(&self) -> Result<Vec<Comment>> {
        let inner = self.lock();
        if inner.fail_unscored {
            bail!("MockStore: unscored lookup failed");
        }
        let scored: HashSet<Uuid> = inner.scores.iter().map(|s| s.comment_id).collect();
        Ok(inner
            .comments
            .iter()
            .filter(|c| !scored.contains(&c.comment.id))
            .map(|c| c.comment.clone())
            .collect())
    }

    async fn insert_sentiment_score(&self, score: &NewSentimentScore) -> Result<InsertOutcome> {
        let mut inner = self.lock();
        if inner.failing_score_inserts.contains(&score.comment_id) {
            bail!("MockStore: insert failed for {}", score.comment_id);
        }
        if inner.scores.iter().any(|s| s.comment_id == score.comment_id) {
            return Ok(InsertOutcome::AlreadyScored);
        }
        inner.scores.push(SentimentScore {
            id: Uuid::new_v4(),
            comment_id: score.comment_id,
            vader_compound: score.vader_compound,
            vader_positive: score.vader_positive,
            vader_negative: score.vader_negative,
            vader_neutral: score.vader_neutral,
            vader_label: score.vader_label,
            llm_label: None,
            llm_confidence: None,
            llm_model: None,
            final_label: score.vader_label,
        });
        Ok(InsertOutcome::Inserted)
    }

    async fn reconciliation_candidates(&self, negative: f64, positive: f64) -> Result<Vec<ScoredComment>> {
        let inner = self.lock();
        let texts: HashMap<Uuid, &str> = inner
            .comments
            .iter()
            .map(|c| (c.comment.id, c.comment.text.as_str()))
            .collect();
        Ok(inner
            .scores
            .iter()
            .filter(|s| s.vader_compound > negative && s.vader_compound < positive && s.llm_label.is_none())
            .filter_map(|s| {
                texts.get(&s.comment_id).map(|text| ScoredComment {
                    comment_id: s.comment_id,
                    text: text.to_string(),
                    vader_compound: s.vader_compound,
                    vader_label: s.vader_label,
                    llm_label: s.llm_label,
                })
            })
            .collect())
    }

    async fn apply_reconciliation(&self, r: &Reconciliation) -> Result<bool> {
        let mut inner = self.lock();
        let Some(score) = inner
            .scores
            .iter_mut()
            .find(|s| s.comment_id == r.comment_id && s.llm_label.is_none())
        else {
            return Ok(false);
        };
        score.llm_label = Some(r.llm_label);
        score.llm_confidence = Some(r.llm_confidence);
        score.llm_model = Some(r.llm_model.clone());
        score.final_label = r.final_label;
        Ok(true)
    }

    async fn unthemed_comments(&self) -> Result<Vec<Comment>> {
        let inner = self.lock();
        if inner.panic_on_themes {
            drop(inner);
            panic!("MockStore: theme table exploded");
        }
        let themed: HashSet<Uuid> = inner.themes.iter().map(|t| t.comment_id).collect();
        Ok(inner
            .comments
            .iter()
            .filter(|c| !themed.contains(&c.comment.id))
            .map(|c| c.comment.clone())
            .collect())
    }

    async fn upsert_theme(&self, theme: &NewTheme) -> Result<()> {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .themes
            .iter_mut()
            .find(|t| t.comment_id == theme.comment_id && t.theme == theme.theme && t.method == theme.method)
        {
            existing.confidence = theme.confidence;
        } else {
            inner.themes.push(theme.clone());
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        if self.lock().fail_ping {
            bail!("MockStore: connection refused");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockScraper
// ---------------------------------------------------------------------------

/// HashMap-based scraper. Unregistered usernames and URLs return no items.
#[derive(Default)]
pub struct MockScraper {
    posts: HashMap<String, Vec<Value>>,
    comments: HashMap<String, Vec<Value>>,
    failing_usernames: HashSet<String>,
    failing_urls: HashSet<String>,
    delay: Option<std::time::Duration>,
    calls: AtomicUsize,
}

impl MockScraper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_posts(mut self, username: &str, items: Vec<Value>) -> Self {
        self.posts.insert(username.to_string(), items);
        self
    }

    pub fn on_comments(mut self, post_url: &str, items: Vec<Value>) -> Self {
        self.comments.insert(post_url.to_string(), items);
        self
    }

    pub fn failing_posts(mut self, username: &str) -> Self {
        self.failing_usernames.insert(username.to_string());
        self
    }

    pub fn failing_comments(mut self, post_url: &str) -> Self {
        self.failing_urls.insert(post_url.to_string());
        self
    }

    /// Sleep this long before answering each post scrape.
    pub fn slow(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SocialScraper for MockScraper {
    async fn scrape_posts(&self, username: &str, _limit: u32) -> Result<Vec<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_usernames.contains(username) {
            bail!("Run failed with status: FAILED");
        }
        Ok(self.posts.get(username).cloned().unwrap_or_default())
    }

    async fn scrape_comments(&self, post_url: &str, _limit: u32) -> Result<Vec<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_urls.contains(post_url) {
            bail!("Run failed with status: TIMED-OUT");
        }
        Ok(self.comments.get(post_url).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MockClassifier
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Scripted {
    Verdict(SentimentLabel, f64),
    Transport,
    Malformed,
}

/// Text-keyed secondary classifier. Unregistered texts get the default verdict.
pub struct MockClassifier {
    default: Scripted,
    by_text: HashMap<String, Scripted>,
    calls: AtomicUsize,
}

pub const MOCK_MODEL: &str = "mock-llm";

impl MockClassifier {
    pub fn returning(label: SentimentLabel, confidence: f64) -> Self {
        Self {
            default: Scripted::Verdict(label, confidence),
            by_text: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails with a transport error.
    pub fn unavailable() -> Self {
        Self {
            default: Scripted::Transport,
            by_text: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn on_text(mut self, text: &str, label: SentimentLabel, confidence: f64) -> Self {
        self.by_text.insert(text.to_string(), Scripted::Verdict(label, confidence));
        self
    }

    pub fn transport_error_on(mut self, text: &str) -> Self {
        self.by_text.insert(text.to_string(), Scripted::Transport);
        self
    }

    pub fn malformed_on(mut self, text: &str) -> Self {
        self.by_text.insert(text.to_string(), Scripted::Malformed);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecondaryClassifier for MockClassifier {
    async fn classify(&self, text: &str) -> std::result::Result<LlmVerdict, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.by_text.get(text).copied().unwrap_or(self.default) {
            Scripted::Verdict(label, confidence) => Ok(LlmVerdict {
                label,
                confidence,
                model: MOCK_MODEL.to_string(),
            }),
            Scripted::Transport => Err(ClassifyError::Transport("connection reset".into())),
            Scripted::Malformed => Err(ClassifyError::Malformed("expected a JSON object".into())),
        }
    }
}
