//! Minimal Apify v2 client for the two Instagram actors the pipeline uses.
//!
//! A scrape is three calls: start the actor run, long-poll the run until it
//! is terminal, then read the run's default dataset. Items come back as raw
//! JSON; field mapping is the caller's job.

pub mod error;
pub mod types;

pub use error::{ApifyError, Result};
pub use types::{InstagramCommentScraperInput, InstagramScraperInput, RunData, RunStatus};

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use types::Envelope;

const BASE_URL: &str = "https://api.apify.com/v2";

pub const INSTAGRAM_POST_SCRAPER: &str = "apify/instagram-post-scraper";
pub const INSTAGRAM_COMMENT_SCRAPER: &str = "apify/instagram-comment-scraper";

/// Server-side long-poll window for run status, in seconds.
const WAIT_FOR_FINISH_SECS: u64 = 60;

/// Socket timeout per request. Must exceed the long-poll window.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(WAIT_FOR_FINISH_SECS * 2);

pub struct ApifyClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
    post_actor: String,
    comment_actor: String,
}

impl ApifyClient {
    /// Fails only if the TLS backend cannot be initialised.
    pub fn new(token: String) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            token,
            base_url: BASE_URL.to_string(),
            post_actor: INSTAGRAM_POST_SCRAPER.to_string(),
            comment_actor: INSTAGRAM_COMMENT_SCRAPER.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_post_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.post_actor = actor_id.into();
        self
    }

    pub fn with_comment_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.comment_actor = actor_id.into();
        self
    }

    pub fn post_actor(&self) -> &str {
        &self.post_actor
    }

    pub fn comment_actor(&self) -> &str {
        &self.comment_actor
    }

    /// Send an authenticated request and decode a success body.
    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let resp = req.bearer_auth(&self.token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(resp.json().await?)
    }

    /// Start an actor run. Returns as soon as Apify accepts it.
    pub async fn start_run<I: Serialize + ?Sized>(&self, actor_id: &str, input: &I) -> Result<RunData> {
        let url = format!("{}/acts/{}/runs", self.base_url, actor_path(actor_id));
        let envelope: Envelope<RunData> = self.send(self.http.post(url).json(input)).await?;
        Ok(envelope.data)
    }

    /// Long-poll a run until it succeeds or reaches a failure state.
    pub async fn wait_for_run(&self, run_id: &str) -> Result<RunData> {
        let url = format!("{}/actor-runs/{}", self.base_url, run_id);
        loop {
            let req = self
                .http
                .get(&url)
                .query(&[("waitForFinish", WAIT_FOR_FINISH_SECS)]);
            let run = self.send::<Envelope<RunData>>(req).await?.data;

            match run.status {
                RunStatus::Succeeded => return Ok(run),
                status if status.is_failure() => {
                    return Err(ApifyError::RunFailed { run_id: run.id, status });
                }
                status => tracing::debug!(run_id, %status, "Actor run not finished yet"),
            }
        }
    }

    pub async fn get_dataset_items<T: DeserializeOwned>(&self, dataset_id: &str) -> Result<Vec<T>> {
        let url = format!("{}/datasets/{}/items", self.base_url, dataset_id);
        self.send(self.http.get(url).query(&[("format", "json")])).await
    }

    /// Start, wait for, and read the dataset of one actor run.
    pub async fn run_actor<I: Serialize + ?Sized>(&self, actor_id: &str, input: &I) -> Result<Vec<Value>> {
        let started = self.start_run(actor_id, input).await?;
        tracing::info!(actor_id, run_id = %started.id, "Apify run started");

        let finished = self.wait_for_run(&started.id).await?;
        let items: Vec<Value> = self.get_dataset_items(&finished.default_dataset_id).await?;
        tracing::info!(
            actor_id,
            run_id = %finished.id,
            dataset_id = %finished.default_dataset_id,
            items = items.len(),
            "Apify run finished"
        );
        Ok(items)
    }

    /// Latest posts of an Instagram profile.
    pub async fn scrape_instagram_posts(&self, username: &str, limit: u32) -> Result<Vec<Value>> {
        let input = InstagramScraperInput {
            username: vec![username.to_string()],
            results_limit: limit,
        };
        self.run_actor(&self.post_actor, &input).await
    }

    /// Comments of a single Instagram post, addressed by its URL.
    pub async fn scrape_instagram_comments(&self, post_url: &str, limit: u32) -> Result<Vec<Value>> {
        let input = InstagramCommentScraperInput {
            direct_urls: vec![post_url.to_string()],
            results_limit: limit,
        };
        self.run_actor(&self.comment_actor, &input).await
    }
}

/// Apify addresses `owner/name` actors as `owner~name` in URL paths.
fn actor_path(actor_id: &str) -> String {
    actor_id.replace('/', "~")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_path_uses_tilde_separator() {
        assert_eq!(actor_path("apify/instagram-post-scraper"), "apify~instagram-post-scraper");
        assert_eq!(actor_path("nH2AHrwxeTRJoN5hX"), "nH2AHrwxeTRJoN5hX");
    }

    #[test]
    fn defaults_to_public_instagram_actors() -> Result<()> {
        let client = ApifyClient::new("token".into())?;
        assert_eq!(client.post_actor(), INSTAGRAM_POST_SCRAPER);
        assert_eq!(client.comment_actor(), INSTAGRAM_COMMENT_SCRAPER);
        Ok(())
    }
}
