use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::warn;
use uuid::Uuid;

use canvass_common::types::{
    Candidate, Comment, CommentUpsert, MediaType, NewSentimentScore, NewTheme, Post, PostUpsert,
    Reconciliation, RunError, ScoredComment, ScrapingRun, ScrapingStatus, SentimentLabel, Trigger,
};

use crate::traits::{CampaignStore, InsertOutcome};

const RUN_COLUMNS: &str = "id, started_at, completed_at, status, posts_scraped, comments_scraped, \
                           duration_seconds, errors, metadata";
const POST_COLUMNS: &str = "id, candidate_id, instagram_id, url, shortcode, caption, like_count, \
                            comment_count, media_type, posted_at";
const COMMENT_COLUMNS: &str = "id, post_id, text, author_username, like_count";

/// Postgres-backed `CampaignStore`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("Failed to connect to Postgres")?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn row_to_run(row: &PgRow) -> Result<ScrapingRun> {
    let id: Uuid = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let errors: serde_json::Value = row.try_get("errors")?;
    let errors = serde_json::from_value::<Vec<RunError>>(errors).unwrap_or_else(|e| {
        warn!(run_id = %id, error = %e, "Unreadable run error log");
        Vec::new()
    });

    Ok(ScrapingRun {
        id,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        status: ScrapingStatus::parse(&status).ok_or_else(|| anyhow!("Unknown run status: {status}"))?,
        posts_scraped: row.try_get("posts_scraped")?,
        comments_scraped: row.try_get("comments_scraped")?,
        duration_seconds: row.try_get("duration_seconds")?,
        errors,
        metadata: row.try_get("metadata")?,
    })
}

fn row_to_candidate(row: &PgRow) -> Result<Candidate> {
    Ok(Candidate {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        display_name: row.try_get("display_name")?,
        is_active: row.try_get("is_active")?,
    })
}

fn row_to_post(row: &PgRow) -> Result<Post> {
    let media_type: String = row.try_get("media_type")?;
    Ok(Post {
        id: row.try_get("id")?,
        candidate_id: row.try_get("candidate_id")?,
        instagram_id: row.try_get("instagram_id")?,
        url: row.try_get("url")?,
        shortcode: row.try_get("shortcode")?,
        caption: row.try_get("caption")?,
        like_count: row.try_get("like_count")?,
        comment_count: row.try_get("comment_count")?,
        media_type: MediaType::from_str_loose(&media_type),
        posted_at: row.try_get("posted_at")?,
    })
}

fn row_to_comment(row: &PgRow) -> Result<Comment> {
    Ok(Comment {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        text: row.try_get("text")?,
        author_username: row.try_get("author_username")?,
        like_count: row.try_get("like_count")?,
    })
}

fn row_to_scored(row: &PgRow) -> Result<ScoredComment> {
    let vader_label: String = row.try_get("vader_label")?;
    let llm_label: Option<String> = row.try_get("llm_label")?;
    Ok(ScoredComment {
        comment_id: row.try_get("comment_id")?,
        text: row.try_get("text")?,
        vader_compound: row.try_get("vader_compound")?,
        vader_label: SentimentLabel::from_str_loose(&vader_label),
        llm_label: llm_label.as_deref().map(SentimentLabel::from_str_loose),
    })
}

// ---------------------------------------------------------------------------
// CampaignStore
// ---------------------------------------------------------------------------

#[async_trait]
impl CampaignStore for PgStore {
    async fn create_scraping_run(&self, trigger: Trigger) -> Result<ScrapingRun> {
        let row = sqlx::query(&format!(
            "INSERT INTO scraping_runs (id, status, metadata) VALUES ($1, 'running', $2) RETURNING {RUN_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(serde_json::json!({ "trigger": trigger.as_str() }))
        .fetch_one(&self.pool)
        .await?;

        row_to_run(&row)
    }

    async fn complete_scraping_run(
        &self,
        run_id: Uuid,
        status: ScrapingStatus,
        duration_seconds: f64,
    ) -> Result<bool> {
        if !status.is_terminal() {
            bail!("Cannot complete run {run_id} with non-terminal status {status}");
        }

        let result = sqlx::query(
            r#"
            UPDATE scraping_runs
            SET status = $2, completed_at = now(), duration_seconds = $3
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(run_id)
        .bind(status.as_str())
        .bind((duration_seconds * 100.0).round() / 100.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_scraping_run(&self, run_id: Uuid) -> Result<Option<ScrapingRun>> {
        let row = sqlx::query(&format!("SELECT {RUN_COLUMNS} FROM scraping_runs WHERE id = $1"))
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_run).transpose()
    }

    async fn last_successful_scrape(&self) -> Result<Option<DateTime<Utc>>> {
        let last = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT max(completed_at) FROM scraping_runs WHERE status = 'success'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(last)
    }

    async fn add_run_counts(&self, run_id: Uuid, posts: i64, comments: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scraping_runs
            SET posts_scraped = posts_scraped + $2, comments_scraped = comments_scraped + $3
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(posts)
        .bind(comments)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_run_error(&self, run_id: Uuid, error: &RunError) -> Result<()> {
        sqlx::query("UPDATE scraping_runs SET errors = errors || jsonb_build_array($2::jsonb) WHERE id = $1")
            .bind(run_id)
            .bind(serde_json::to_value(error)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn active_candidates(&self) -> Result<Vec<Candidate>> {
        let rows = sqlx::query(
            r#"
            SELECT id, username, display_name, is_active
            FROM candidates
            WHERE is_active
            ORDER BY created_at, username
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_candidate).collect()
    }

    async fn find_candidate_by_username(&self, username: &str) -> Result<Option<Candidate>> {
        let row = sqlx::query("SELECT id, username, display_name, is_active FROM candidates WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_candidate).transpose()
    }

    async fn get_candidate(&self, candidate_id: Uuid) -> Result<Option<Candidate>> {
        let row = sqlx::query("SELECT id, username, display_name, is_active FROM candidates WHERE id = $1")
            .bind(candidate_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_candidate).transpose()
    }

    async fn upsert_post(&self, post: &PostUpsert) -> Result<Post> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO posts
                (id, candidate_id, scraping_run_id, instagram_id, url, shortcode, caption,
                 like_count, comment_count, media_type, is_sponsored, video_view_count,
                 posted_at, raw_data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (instagram_id) DO UPDATE SET
                scraping_run_id = EXCLUDED.scraping_run_id,
                url = EXCLUDED.url,
                shortcode = EXCLUDED.shortcode,
                caption = EXCLUDED.caption,
                like_count = EXCLUDED.like_count,
                comment_count = EXCLUDED.comment_count,
                media_type = EXCLUDED.media_type,
                is_sponsored = EXCLUDED.is_sponsored,
                video_view_count = EXCLUDED.video_view_count,
                posted_at = EXCLUDED.posted_at,
                raw_data = EXCLUDED.raw_data,
                updated_at = now()
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(post.candidate_id)
        .bind(post.scraping_run_id)
        .bind(&post.instagram_id)
        .bind(&post.url)
        .bind(&post.shortcode)
        .bind(&post.caption)
        .bind(post.like_count)
        .bind(post.comment_count)
        .bind(post.media_type.as_str())
        .bind(post.is_sponsored)
        .bind(post.video_view_count)
        .bind(post.posted_at)
        .bind(&post.raw_data)
        .fetch_one(&self.pool)
        .await?;

        row_to_post(&row)
    }

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_post).transpose()
    }

    async fn all_posts(&self) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM posts ORDER BY created_at, id"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_post).collect()
    }

    async fn upsert_comment(&self, comment: &CommentUpsert) -> Result<Comment> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO comments
                (id, post_id, scraping_run_id, instagram_id, text, author_username,
                 like_count, reply_count, commented_at, raw_data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (instagram_id) DO UPDATE SET
                scraping_run_id = EXCLUDED.scraping_run_id,
                text = EXCLUDED.text,
                author_username = EXCLUDED.author_username,
                like_count = EXCLUDED.like_count,
                reply_count = EXCLUDED.reply_count,
                commented_at = EXCLUDED.commented_at,
                raw_data = EXCLUDED.raw_data,
                updated_at = now()
            RETURNING {COMMENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(comment.post_id)
        .bind(comment.scraping_run_id)
        .bind(&comment.instagram_id)
        .bind(&comment.text)
        .bind(&comment.author_username)
        .bind(comment.like_count)
        .bind(comment.reply_count)
        .bind(comment.commented_at)
        .bind(&comment.raw_data)
        .fetch_one(&self.pool)
        .await?;

        row_to_comment(&row)
    }

    async fn comments_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE post_id = $1 ORDER BY commented_at NULLS LAST, created_at"
        ))
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_comment).collect()
    }

    async fn count_comments(&self) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM comments")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn unscored_comments(&self) -> Result<Vec<Comment>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.post_id, c.text, c.author_username, c.like_count
            FROM comments c
            WHERE NOT EXISTS (SELECT 1 FROM sentiment_scores s WHERE s.comment_id = c.id)
            ORDER BY c.created_at, c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_comment).collect()
    }

    async fn insert_sentiment_score(&self, score: &NewSentimentScore) -> Result<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO sentiment_scores
                (id, comment_id, vader_compound, vader_positive, vader_negative, vader_neutral,
                 vader_label, final_label)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            ON CONFLICT (comment_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(score.comment_id)
        .bind(score.vader_compound)
        .bind(score.vader_positive)
        .bind(score.vader_negative)
        .bind(score.vader_neutral)
        .bind(score.vader_label.as_str())
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() == 0 {
            InsertOutcome::AlreadyScored
        } else {
            InsertOutcome::Inserted
        })
    }

    async fn reconciliation_candidates(&self, negative: f64, positive: f64) -> Result<Vec<ScoredComment>> {
        let rows = sqlx::query(
            r#"
            SELECT s.comment_id, c.text, s.vader_compound, s.vader_label, s.llm_label
            FROM sentiment_scores s
            JOIN comments c ON c.id = s.comment_id
            WHERE s.vader_compound > $1
              AND s.vader_compound < $2
              AND s.llm_label IS NULL
            ORDER BY s.created_at, s.comment_id
            "#,
        )
        .bind(negative)
        .bind(positive)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_scored).collect()
    }

    async fn apply_reconciliation(&self, r: &Reconciliation) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sentiment_scores
            SET llm_label = $2, llm_confidence = $3, llm_model = $4, final_label = $5, updated_at = now()
            WHERE comment_id = $1 AND llm_label IS NULL
            "#,
        )
        .bind(r.comment_id)
        .bind(r.llm_label.as_str())
        .bind(r.llm_confidence)
        .bind(&r.llm_model)
        .bind(r.final_label.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn unthemed_comments(&self) -> Result<Vec<Comment>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.post_id, c.text, c.author_username, c.like_count
            FROM comments c
            WHERE NOT EXISTS (SELECT 1 FROM themes t WHERE t.comment_id = c.id)
            ORDER BY c.created_at, c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_comment).collect()
    }

    async fn upsert_theme(&self, theme: &NewTheme) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO themes (id, comment_id, theme, confidence, method)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (comment_id, theme, method) DO UPDATE SET confidence = EXCLUDED.confidence
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(theme.comment_id)
        .bind(theme.theme.as_str())
        .bind(theme.confidence)
        .bind(theme.method.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
