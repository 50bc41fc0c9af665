//! Lexical baseline sentiment (VADER) and the thresholds shared by the
//! ambiguity gate and reconciliation.

use anyhow::Result;
use tracing::{info, warn};
use vader_sentiment::SentimentIntensityAnalyzer;

use canvass_common::types::{Comment, NewSentimentScore, SentimentLabel};

use crate::traits::{CampaignStore, InsertOutcome};

/// Compound at or above this is positive.
pub const POSITIVE_THRESHOLD: f64 = 0.05;
/// Compound at or below this is negative.
pub const NEGATIVE_THRESHOLD: f64 = -0.05;
/// LLM confidence needed to override the baseline label.
pub const LLM_CONFIDENCE_THRESHOLD: f64 = 0.7;
/// Comments must be strictly longer than this (in chars) to reach the LLM.
pub const MIN_AMBIGUOUS_TEXT_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentSettings {
    pub positive_threshold: f64,
    pub negative_threshold: f64,
    pub confidence_threshold: f64,
    pub min_text_len: usize,
}

impl Default for SentimentSettings {
    fn default() -> Self {
        Self {
            positive_threshold: POSITIVE_THRESHOLD,
            negative_threshold: NEGATIVE_THRESHOLD,
            confidence_threshold: LLM_CONFIDENCE_THRESHOLD,
            min_text_len: MIN_AMBIGUOUS_TEXT_LEN,
        }
    }
}

impl SentimentSettings {
    /// Inclusive at both boundaries.
    pub fn label_for(&self, compound: f64) -> SentimentLabel {
        if compound >= self.positive_threshold {
            SentimentLabel::Positive
        } else if compound <= self.negative_threshold {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    /// Strictly between the thresholds.
    pub fn is_ambiguous(&self, compound: f64) -> bool {
        self.negative_threshold < compound && compound < self.positive_threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VaderScore {
    pub compound: f64,
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
    pub label: SentimentLabel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BaselineStats {
    pub analyzed_count: u64,
    pub skipped_count: u64,
}

impl std::fmt::Display for BaselineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "analyzed={} skipped={}", self.analyzed_count, self.skipped_count)
    }
}

/// Baseline classifier. Holds one analyzer for the life of the pipeline.
pub struct SentimentClassifier {
    analyzer: SentimentIntensityAnalyzer<'static>,
    settings: SentimentSettings,
}

impl SentimentClassifier {
    pub fn new(settings: SentimentSettings) -> Self {
        Self {
            analyzer: SentimentIntensityAnalyzer::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &SentimentSettings {
        &self.settings
    }

    /// Score one text. Empty or whitespace-only text is neutral with all
    /// components zero.
    pub fn score(&self, text: &str) -> VaderScore {
        if text.trim().is_empty() {
            return VaderScore {
                compound: 0.0,
                positive: 0.0,
                negative: 0.0,
                neutral: 0.0,
                label: SentimentLabel::Neutral,
            };
        }

        let scores = self.analyzer.polarity_scores(text);
        let get = |key: &str| scores.get(key).copied().unwrap_or(0.0);
        let compound = get("compound").clamp(-1.0, 1.0);

        VaderScore {
            compound,
            positive: get("pos"),
            negative: get("neg"),
            neutral: get("neu"),
            label: self.settings.label_for(compound),
        }
    }

    /// Score and persist each comment. Conflicts and per-item store errors
    /// are logged and skipped. Returns the rows that were inserted.
    pub async fn analyze_batch(
        &self,
        store: &dyn CampaignStore,
        comments: &[Comment],
    ) -> Vec<NewSentimentScore> {
        let mut inserted = Vec::with_capacity(comments.len());

        for comment in comments {
            let score = self.score(&comment.text);
            let row = NewSentimentScore {
                comment_id: comment.id,
                vader_compound: score.compound,
                vader_positive: score.positive,
                vader_negative: score.negative,
                vader_neutral: score.neutral,
                vader_label: score.label,
            };

            match store.insert_sentiment_score(&row).await {
                Ok(InsertOutcome::Inserted) => inserted.push(row),
                Ok(InsertOutcome::AlreadyScored) => {
                    warn!(comment_id = %comment.id, "sentiment_insert_failed: already scored");
                }
                Err(e) => {
                    warn!(comment_id = %comment.id, error = %e, "sentiment_insert_failed");
                }
            }
        }

        info!(
            total_input = comments.len(),
            total_inserted = inserted.len(),
            "analyze_comments_batch_completed"
        );
        inserted
    }

    /// Score every comment that has no score yet.
    pub async fn run_baseline_analysis(&self, store: &dyn CampaignStore) -> Result<BaselineStats> {
        let total = store.count_comments().await?;
        let unscored = store.unscored_comments().await?;
        let skipped = total.saturating_sub(unscored.len() as u64);

        let inserted = self.analyze_batch(store, &unscored).await;
        let stats = BaselineStats {
            analyzed_count: inserted.len() as u64,
            skipped_count: skipped,
        };

        info!(
            analyzed_count = stats.analyzed_count,
            skipped_count = stats.skipped_count,
            "run_vader_analysis_completed"
        );
        Ok(stats)
    }
}

impl Default for SentimentClassifier {
    fn default() -> Self {
        Self::new(SentimentSettings::default())
    }
}
