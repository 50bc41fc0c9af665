//! Post and comment collection (pipeline phases 1 and 2).

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};
use uuid::Uuid;

use canvass_common::types::{Comment, Post, RunError};
use canvass_common::CanvassError;

use crate::mapping::{map_comment, map_post};
use crate::traits::{CampaignStore, SocialScraper};

pub const PHASE_POSTS: &str = "post_scraping";
pub const PHASE_COMMENTS: &str = "comment_scraping";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeLimits {
    pub posts_per_candidate: u32,
    pub comments_per_post: u32,
}

impl Default for ScrapeLimits {
    fn default() -> Self {
        Self {
            posts_per_candidate: 10,
            comments_per_post: 500,
        }
    }
}

pub struct ScrapePhase {
    store: Arc<dyn CampaignStore>,
    scraper: Arc<dyn SocialScraper>,
    limits: ScrapeLimits,
}

impl ScrapePhase {
    pub fn new(store: Arc<dyn CampaignStore>, scraper: Arc<dyn SocialScraper>, limits: ScrapeLimits) -> Self {
        Self { store, scraper, limits }
    }

    /// Scrape and upsert the latest posts of one candidate. Unknown candidates
    /// and scraper failures are recorded on the run and returned as errors.
    pub async fn scrape_posts(&self, username: &str, run_id: Uuid) -> Result<Vec<Post>> {
        info!(candidate_username = username, %run_id, "scrape_posts_started");

        let Some(candidate) = self.store.find_candidate_by_username(username).await? else {
            self.record_error(run_id, RunError::new(username, PHASE_POSTS, format!("Candidate not found: {username}")))
                .await;
            return Err(CanvassError::CandidateNotFound(username.to_string()).into());
        };

        let items = match self
            .scraper
            .scrape_posts(username, self.limits.posts_per_candidate)
            .await
        {
            Ok(items) => items,
            Err(e) => {
                let message = format!("Apify actor failed: {e}");
                error!(candidate_username = username, error = %e, "scrape_posts_apify_failed");
                self.record_error(run_id, RunError::new(username, PHASE_POSTS, message.clone()))
                    .await;
                return Err(CanvassError::Scraping(message).into());
            }
        };

        let mut posts = Vec::with_capacity(items.len());
        for item in &items {
            let upsert = map_post(item, candidate.id, run_id);
            posts.push(self.store.upsert_post(&upsert).await?);
        }

        self.store.add_run_counts(run_id, posts.len() as i64, 0).await?;
        info!(candidate_username = username, posts_count = posts.len(), %run_id, "scrape_posts_completed");
        Ok(posts)
    }

    /// Scrape and upsert the comments of one post. A scraper failure is
    /// recorded on the run and yields no comments.
    pub async fn scrape_comments(&self, post: &Post, run_id: Uuid) -> Result<Vec<Comment>> {
        info!(post_url = %post.url, post_id = %post.id, %run_id, "scrape_comments_started");

        let items = match self
            .scraper
            .scrape_comments(&post.url, self.limits.comments_per_post)
            .await
        {
            Ok(items) => items,
            Err(e) => {
                let message = format!("Apify actor failed for post {}: {e}", post.url);
                error!(post_url = %post.url, post_id = %post.id, error = %e, "scrape_comments_apify_failed");
                self.record_error(
                    run_id,
                    RunError::new("", PHASE_COMMENTS, message).with_post(post.id, post.url.clone()),
                )
                .await;
                return Ok(Vec::new());
            }
        };

        let mut comments = Vec::with_capacity(items.len());
        for item in &items {
            let upsert = map_comment(item, post.id, run_id);
            comments.push(self.store.upsert_comment(&upsert).await?);
        }

        info!(post_id = %post.id, comments_count = comments.len(), %run_id, "scrape_comments_completed");
        Ok(comments)
    }

    /// Scrape comments for every post, continuing past per-post failures.
    /// Returns the total collected and adds it to the run's counter.
    pub async fn scrape_all_comments(&self, posts: &[Post], run_id: Uuid) -> Result<u64> {
        let mut total = 0u64;

        for (idx, post) in posts.iter().enumerate() {
            info!(progress = %format!("{}/{}", idx + 1, posts.len()), post_id = %post.id, "scrape_all_comments_progress");
            match self.scrape_comments(post, run_id).await {
                Ok(comments) => total += comments.len() as u64,
                Err(e) => {
                    error!(post_id = %post.id, error = %e, "scrape_all_comments_unexpected_error");
                }
            }
        }

        self.store.add_run_counts(run_id, 0, total as i64).await?;
        info!(total_comments = total, posts_processed = posts.len(), %run_id, "scrape_all_comments_completed");
        Ok(total)
    }

    async fn record_error(&self, run_id: Uuid, entry: RunError) {
        if let Err(e) = self.store.append_run_error(run_id, &entry).await {
            warn!(%run_id, error = %e, "Failed to append run error");
        }
    }
}
