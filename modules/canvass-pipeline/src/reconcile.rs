//! LLM reconciliation of ambiguous baseline labels.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};

use canvass_common::types::Reconciliation;

use crate::gate;
use crate::sentiment::SentimentSettings;
use crate::traits::{CampaignStore, SecondaryClassifier};

/// Rough per-call token usage for a one-comment classification.
const EST_INPUT_TOKENS_PER_CALL: f64 = 30.0;
const EST_OUTPUT_TOKENS_PER_CALL: f64 = 20.0;
/// USD per 1K tokens.
const INPUT_PRICE_PER_1K: f64 = 0.00015;
const OUTPUT_PRICE_PER_1K: f64 = 0.0006;

#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct ReconcileStats {
    /// Rows updated with LLM fields.
    pub reclassified: u64,
    /// Classifier calls that returned a usable verdict.
    pub api_calls: u64,
    /// Verdicts confident enough to replace the baseline label.
    pub upgrades: u64,
    /// Verdicts recorded but below the confidence threshold.
    pub retained: u64,
    pub cost_estimate_usd: f64,
}

impl fmt::Display for ReconcileStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "reclassified={} api_calls={} upgrades={} retained={} cost_usd={:.6}",
            self.reclassified, self.api_calls, self.upgrades, self.retained, self.cost_estimate_usd,
        )
    }
}

pub fn estimate_cost_usd(api_calls: u64) -> f64 {
    let calls = api_calls as f64;
    let cost = calls * EST_INPUT_TOKENS_PER_CALL / 1000.0 * INPUT_PRICE_PER_1K
        + calls * EST_OUTPUT_TOKENS_PER_CALL / 1000.0 * OUTPUT_PRICE_PER_1K;
    (cost * 1e6).round() / 1e6
}

pub struct Reconciler {
    store: Arc<dyn CampaignStore>,
    classifier: Arc<dyn SecondaryClassifier>,
    settings: SentimentSettings,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        classifier: Arc<dyn SecondaryClassifier>,
        settings: SentimentSettings,
    ) -> Self {
        Self {
            store,
            classifier,
            settings,
        }
    }

    /// Send every ambiguous comment to the secondary classifier, one at a time.
    /// Classifier failures leave the row untouched and do not count as calls.
    pub async fn reconcile_all(&self) -> Result<ReconcileStats> {
        let candidates = self
            .store
            .reconciliation_candidates(self.settings.negative_threshold, self.settings.positive_threshold)
            .await?;
        let eligible = gate::select_ambiguous(&candidates, &self.settings);
        info!(candidates = candidates.len(), eligible = eligible.len(), "Reconciling ambiguous comments");

        let mut stats = ReconcileStats::default();

        for item in &eligible {
            let verdict = match self.classifier.classify(&item.text).await {
                Ok(v) => v,
                Err(e) => {
                    error!(
                        comment_id = %item.comment_id,
                        error_kind = e.kind(),
                        error = %e,
                        "llm_reclassification_failed"
                    );
                    continue;
                }
            };
            stats.api_calls += 1;

            let upgraded = verdict.confidence >= self.settings.confidence_threshold;
            let final_label = if upgraded { verdict.label } else { item.vader_label };

            let reconciliation = Reconciliation {
                comment_id: item.comment_id,
                llm_label: verdict.label,
                llm_confidence: verdict.confidence,
                llm_model: verdict.model,
                final_label,
            };

            match self.store.apply_reconciliation(&reconciliation).await {
                Ok(true) => {
                    stats.reclassified += 1;
                    if upgraded {
                        stats.upgrades += 1;
                    } else {
                        stats.retained += 1;
                    }
                }
                Ok(false) => {
                    warn!(comment_id = %item.comment_id, "Comment already reconciled, skipping");
                }
                Err(e) => {
                    error!(comment_id = %item.comment_id, error = %e, "llm_reclassification_persist_failed");
                }
            }
        }

        stats.cost_estimate_usd = estimate_cost_usd(stats.api_calls);
        info!(
            api_calls_made = stats.api_calls,
            reclassified_count = stats.reclassified,
            confidence_upgrades = stats.upgrades,
            retained_vader_label = stats.retained,
            cost_estimate_usd = stats.cost_estimate_usd,
            "reclassify_ambiguous_completed"
        );

        Ok(stats)
    }
}
