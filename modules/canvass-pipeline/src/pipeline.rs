//! Five-phase pipeline behind the single-flight lock.
//!
//! `begin` creates the run record and takes the lock; `execute` runs the
//! phases and always persists a terminal status. Splitting the two lets the
//! HTTP layer answer with the run id before any scraping starts.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use futures::FutureExt;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use canvass_common::types::{Post, ScrapingRun, ScrapingStatus, Trigger};

use crate::lock::{HeldPipelineLock, PipelineLock};
use crate::reconcile::Reconciler;
use crate::scraping::{ScrapeLimits, ScrapePhase, PHASE_COMMENTS, PHASE_POSTS};
use crate::sentiment::{SentimentClassifier, SentimentSettings};
use crate::themes::{self, KeywordThemeTagger};
use crate::traits::{CampaignStore, SecondaryClassifier, SocialScraper, ThemeTagger};

pub const PHASE_VADER: &str = "vader";
pub const PHASE_LLM: &str = "llm";
pub const PHASE_THEMES: &str = "themes";

/// Result of a completed (or failed) pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSummary {
    pub run_id: Uuid,
    pub status: ScrapingStatus,
    pub posts_scraped: u64,
    pub comments_scraped: u64,
    pub vader_analyzed: u64,
    pub llm_reclassified: u64,
    pub themes_classified: u64,
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl fmt::Display for PipelineSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run={} status={} posts={} comments={} vader={} llm={} themes={} duration={:.2}s",
            self.run_id,
            self.status,
            self.posts_scraped,
            self.comments_scraped,
            self.vader_analyzed,
            self.llm_reclassified,
            self.themes_classified,
            self.duration_seconds,
        )?;
        if let Some(ref e) = self.error {
            write!(f, " error={e}")?;
        }
        Ok(())
    }
}

/// A created run that holds the pipeline lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct ActiveRun {
    run: ScrapingRun,
    trigger: Trigger,
    guard: HeldPipelineLock,
}

impl ActiveRun {
    pub fn run_id(&self) -> Uuid {
        self.guard.run_id()
    }

    pub fn run(&self) -> &ScrapingRun {
        &self.run
    }
}

#[derive(Debug)]
pub enum BeginOutcome {
    Started(ActiveRun),
    /// The lock was held. The created run has been marked failed.
    Skipped { run_id: Uuid, holder: Option<Uuid> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Completed(PipelineSummary),
    Skipped { run_id: Uuid, holder: Option<Uuid> },
}

/// Result of running a single scraping phase as its own run.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutcome<T> {
    Completed(T),
    Skipped { run_id: Uuid, holder: Option<Uuid> },
    /// No active candidates (posts) or no stored posts (comments). No run is created.
    NothingToScrape,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostScrapeSummary {
    pub run_id: Uuid,
    pub status: ScrapingStatus,
    pub candidates: Vec<String>,
    pub posts_scraped: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentScrapeSummary {
    pub run_id: Uuid,
    pub status: ScrapingStatus,
    pub posts_queued: u64,
    pub comments_scraped: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct Finished<T> {
    status: ScrapingStatus,
    duration: f64,
    result: std::result::Result<T, String>,
}

#[derive(Debug, Default)]
struct PhaseCounts {
    posts: u64,
    comments: u64,
    vader: u64,
    llm: u64,
    themes: u64,
    has_errors: bool,
}

/// Logs `phase_start` on creation and `phase_complete` with timing on completion.
struct PhaseTimer {
    run_id: Uuid,
    phase: &'static str,
    started: Instant,
}

impl PhaseTimer {
    fn start(run_id: Uuid, phase: &'static str) -> Self {
        info!(%run_id, phase, "phase_start");
        Self {
            run_id,
            phase,
            started: Instant::now(),
        }
    }

    fn complete(self, count: u64) {
        info!(
            run_id = %self.run_id,
            phase = self.phase,
            count,
            duration_ms = self.started.elapsed().as_millis() as u64,
            "phase_complete"
        );
    }
}

pub struct Pipeline {
    store: Arc<dyn CampaignStore>,
    scraper: Arc<dyn SocialScraper>,
    classifier: Arc<dyn SecondaryClassifier>,
    tagger: Arc<dyn ThemeTagger>,
    sentiment: SentimentClassifier,
    limits: ScrapeLimits,
    lock: PipelineLock,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        scraper: Arc<dyn SocialScraper>,
        classifier: Arc<dyn SecondaryClassifier>,
        lock: PipelineLock,
    ) -> Self {
        Self {
            store,
            scraper,
            classifier,
            tagger: Arc::new(KeywordThemeTagger),
            sentiment: SentimentClassifier::default(),
            limits: ScrapeLimits::default(),
            lock,
        }
    }

    pub fn with_settings(mut self, settings: SentimentSettings) -> Self {
        self.sentiment = SentimentClassifier::new(settings);
        self
    }

    pub fn with_limits(mut self, limits: ScrapeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_tagger(mut self, tagger: Arc<dyn ThemeTagger>) -> Self {
        self.tagger = tagger;
        self
    }

    pub fn lock(&self) -> &PipelineLock {
        &self.lock
    }

    pub fn store(&self) -> &Arc<dyn CampaignStore> {
        &self.store
    }

    pub fn sentiment(&self) -> &SentimentClassifier {
        &self.sentiment
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.store.clone(), self.classifier.clone(), *self.sentiment.settings())
    }

    fn scrape_phase(&self) -> ScrapePhase {
        ScrapePhase::new(self.store.clone(), self.scraper.clone(), self.limits)
    }

    /// Create + lock + execute.
    pub async fn run_full_pipeline(&self, trigger: Trigger) -> Result<PipelineOutcome> {
        match self.begin(trigger).await? {
            BeginOutcome::Started(active) => Ok(PipelineOutcome::Completed(self.execute(active).await)),
            BeginOutcome::Skipped { run_id, holder } => Ok(PipelineOutcome::Skipped { run_id, holder }),
        }
    }

    /// Create the run record and try to take the lock. A run that loses the
    /// lock is immediately marked failed with zero duration.
    pub async fn begin(&self, trigger: Trigger) -> Result<BeginOutcome> {
        let run = self.store.create_scraping_run(trigger).await?;

        let Some(guard) = self.lock.try_hold(run.id) else {
            let holder = self.lock.current_holder();
            warn!(
                run_id = %run.id,
                trigger = %trigger,
                holder = ?holder,
                "Pipeline already running, skipping trigger"
            );
            self.finish(run.id, ScrapingStatus::Failed, 0.0).await;
            return Ok(BeginOutcome::Skipped { run_id: run.id, holder });
        };

        Ok(BeginOutcome::Started(ActiveRun { run, trigger, guard }))
    }

    /// Run all phases for a locked run. Never returns an error: failures and
    /// panics become a `failed` summary. The lock is released on return.
    pub async fn execute(&self, active: ActiveRun) -> PipelineSummary {
        let run_id = active.run_id();
        let finished = self
            .run_locked(active, async {
                let counts = self.run_phases(run_id).await?;
                let has_errors = counts.has_errors;
                Ok::<_, anyhow::Error>((counts, has_errors))
            })
            .await;

        match finished.result {
            Ok(counts) => {
                info!(
                    %run_id,
                    posts_scraped = counts.posts,
                    comments_scraped = counts.comments,
                    duration_seconds = finished.duration,
                    status = %finished.status,
                    "pipeline_complete"
                );
                summarize(run_id, finished.status, &counts, finished.duration, None)
            }
            Err(e) => summarize(run_id, finished.status, &PhaseCounts::default(), finished.duration, Some(e)),
        }
    }

    /// Phase 1 alone, as its own run: scrape posts for every active candidate.
    pub async fn scrape_posts_only(&self, trigger: Trigger) -> Result<PhaseOutcome<PostScrapeSummary>> {
        let candidates = self.store.active_candidates().await?;
        if candidates.is_empty() {
            return Ok(PhaseOutcome::NothingToScrape);
        }
        let active = match self.begin(trigger).await? {
            BeginOutcome::Started(active) => active,
            BeginOutcome::Skipped { run_id, holder } => return Ok(PhaseOutcome::Skipped { run_id, holder }),
        };
        let run_id = active.run_id();
        let usernames: Vec<String> = candidates.iter().map(|c| c.username.clone()).collect();

        let finished = self
            .run_locked(active, async {
                let scrape = self.scrape_phase();
                let timer = PhaseTimer::start(run_id, PHASE_POSTS);
                let (mut posts, mut has_errors) = (0u64, false);
                for username in &usernames {
                    match scrape.scrape_posts(username, run_id).await {
                        Ok(found) => posts += found.len() as u64,
                        Err(e) => {
                            has_errors = true;
                            error!(%run_id, phase = PHASE_POSTS, candidate = %username, error = %e, "pipeline_error");
                        }
                    }
                }
                timer.complete(posts);
                Ok::<_, anyhow::Error>((posts, has_errors))
            })
            .await;

        let (posts_scraped, error) = split(finished.result);
        Ok(PhaseOutcome::Completed(PostScrapeSummary {
            run_id,
            status: finished.status,
            candidates: usernames,
            posts_scraped,
            error,
        }))
    }

    /// Phase 2 alone, as its own run: scrape comments for every stored post.
    pub async fn scrape_comments_only(&self, trigger: Trigger) -> Result<PhaseOutcome<CommentScrapeSummary>> {
        let posts = self.store.all_posts().await?;
        if posts.is_empty() {
            return Ok(PhaseOutcome::NothingToScrape);
        }
        let active = match self.begin(trigger).await? {
            BeginOutcome::Started(active) => active,
            BeginOutcome::Skipped { run_id, holder } => return Ok(PhaseOutcome::Skipped { run_id, holder }),
        };
        let run_id = active.run_id();

        let finished = self
            .run_locked(active, async {
                let timer = PhaseTimer::start(run_id, PHASE_COMMENTS);
                let comments = self.scrape_phase().scrape_all_comments(&posts, run_id).await?;
                timer.complete(comments);
                Ok::<_, anyhow::Error>((comments, false))
            })
            .await;

        let (comments_scraped, error) = split(finished.result);
        Ok(PhaseOutcome::Completed(CommentScrapeSummary {
            run_id,
            status: finished.status,
            posts_queued: posts.len() as u64,
            comments_scraped,
            error,
        }))
    }

    /// Drive `work` for a locked run and persist exactly one terminal status.
    /// `work` yields its value and whether anything was recorded as an error;
    /// an `Err` or a panic marks the run failed. The lock is released on return.
    async fn run_locked<T, F>(&self, active: ActiveRun, work: F) -> Finished<T>
    where
        F: Future<Output = Result<(T, bool)>>,
    {
        let ActiveRun { run, trigger, guard } = active;
        let run_id = run.id;
        let started = Instant::now();
        info!(%run_id, trigger = %trigger, "pipeline_start");

        let outcome = AssertUnwindSafe(work).catch_unwind().await;
        let duration = started.elapsed().as_secs_f64();

        let (status, result) = match outcome {
            Ok(Ok((value, has_errors))) => {
                let status = if has_errors {
                    ScrapingStatus::Partial
                } else {
                    ScrapingStatus::Success
                };
                (status, Ok(value))
            }
            Ok(Err(e)) => {
                error!(%run_id, phase = "unknown", error = %e, "pipeline_error");
                (ScrapingStatus::Failed, Err(format!("{e:#}")))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(%run_id, phase = "unknown", error = %message, "pipeline_panic");
                (ScrapingStatus::Failed, Err(message))
            }
        };

        self.finish(run_id, status, duration).await;
        drop(guard);
        Finished {
            status,
            duration,
            result,
        }
    }

    async fn run_phases(&self, run_id: Uuid) -> Result<PhaseCounts> {
        let mut counts = PhaseCounts::default();
        let scrape = self.scrape_phase();

        // Phase 1: posts per active candidate
        let timer = PhaseTimer::start(run_id, PHASE_POSTS);
        let candidates = self.store.active_candidates().await?;
        let mut posts: Vec<Post> = Vec::new();
        for candidate in &candidates {
            match scrape.scrape_posts(&candidate.username, run_id).await {
                Ok(found) => {
                    counts.posts += found.len() as u64;
                    posts.extend(found);
                }
                Err(e) => {
                    counts.has_errors = true;
                    error!(
                        %run_id,
                        phase = PHASE_POSTS,
                        candidate = %candidate.username,
                        error = %e,
                        "pipeline_error"
                    );
                }
            }
        }
        timer.complete(counts.posts);

        // Phase 2: comments for every post collected above
        let timer = PhaseTimer::start(run_id, PHASE_COMMENTS);
        if !posts.is_empty() {
            counts.comments = scrape.scrape_all_comments(&posts, run_id).await?;
        }
        timer.complete(counts.comments);

        // Phase 3: baseline sentiment
        let timer = PhaseTimer::start(run_id, PHASE_VADER);
        let unscored = self.store.unscored_comments().await?;
        counts.vader = self.sentiment.analyze_batch(self.store.as_ref(), &unscored).await.len() as u64;
        timer.complete(counts.vader);

        // Phase 4: LLM reconciliation
        let timer = PhaseTimer::start(run_id, PHASE_LLM);
        let stats = self.reconciler().reconcile_all().await?;
        counts.llm = stats.reclassified;
        timer.complete(counts.llm);

        // Phase 5: themes
        let timer = PhaseTimer::start(run_id, PHASE_THEMES);
        counts.themes = themes::tag_unthemed(self.store.as_ref(), self.tagger.as_ref()).await?;
        timer.complete(counts.themes);

        Ok(counts)
    }

    async fn finish(&self, run_id: Uuid, status: ScrapingStatus, duration: f64) {
        match self.store.complete_scraping_run(run_id, status, duration).await {
            Ok(true) => {}
            Ok(false) => warn!(%run_id, status = %status, "Run was already terminal"),
            Err(e) => error!(%run_id, status = %status, error = %e, "Failed to persist run status"),
        }
    }
}

fn summarize(
    run_id: Uuid,
    status: ScrapingStatus,
    counts: &PhaseCounts,
    duration: f64,
    error: Option<String>,
) -> PipelineSummary {
    PipelineSummary {
        run_id,
        status,
        posts_scraped: counts.posts,
        comments_scraped: counts.comments,
        vader_analyzed: counts.vader,
        llm_reclassified: counts.llm,
        themes_classified: counts.themes,
        duration_seconds: (duration * 100.0).round() / 100.0,
        error,
    }
}

fn split(result: std::result::Result<u64, String>) -> (u64, Option<String>) {
    match result {
        Ok(count) => (count, None),
        Err(e) => (0, Some(e)),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "pipeline panicked".to_string()
    }
}
