use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use canvass_pipeline::contextual::ContextualError;
use canvass_pipeline::ReconcileStats;

use super::detail;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SentimentResponse {
    pub analyzed_count: u64,
    pub skipped_count: u64,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct LlmFallbackResponse {
    pub reclassified_count: u64,
    pub api_calls_made: u64,
    pub confidence_upgrades: u64,
    pub retained_vader_label: u64,
    pub cost_estimate_usd: f64,
}

impl From<ReconcileStats> for LlmFallbackResponse {
    fn from(stats: ReconcileStats) -> Self {
        Self {
            reclassified_count: stats.reclassified,
            api_calls_made: stats.api_calls,
            confidence_upgrades: stats.upgrades,
            retained_vader_label: stats.retained,
            cost_estimate_usd: stats.cost_estimate_usd,
        }
    }
}

/// Baseline-score every comment that has no score yet.
pub async fn run_sentiment(State(state): State<Arc<AppState>>) -> Response {
    let pipeline = &state.pipeline;
    match pipeline.sentiment().run_baseline_analysis(pipeline.store().as_ref()).await {
        Ok(stats) => Json(SentimentResponse {
            analyzed_count: stats.analyzed_count,
            skipped_count: stats.skipped_count,
            message: "Sentiment analysis complete",
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "trigger_sentiment_analysis_failed");
            detail(StatusCode::INTERNAL_SERVER_ERROR, format!("Sentiment analysis failed: {e}"))
        }
    }
}

/// Send ambiguous comments to the secondary classifier.
pub async fn run_llm_fallback(State(state): State<Arc<AppState>>) -> Response {
    match state.pipeline.reconciler().reconcile_all().await {
        Ok(stats) => Json(LlmFallbackResponse::from(stats)).into_response(),
        Err(e) => {
            error!(error = %e, "trigger_llm_fallback_failed");
            detail(StatusCode::INTERNAL_SERVER_ERROR, format!("LLM fallback failed: {e}"))
        }
    }
}

pub async fn run_contextual(State(state): State<Arc<AppState>>, Path(post_id): Path<Uuid>) -> Response {
    let Some(analyzer) = state.contextual.as_ref() else {
        return detail(StatusCode::SERVICE_UNAVAILABLE, "LLM is not configured");
    };

    match analyzer.analyze_post(post_id).await {
        Ok(breakdown) => Json(breakdown).into_response(),
        Err(ContextualError::PostNotFound(_)) => detail(StatusCode::NOT_FOUND, "Post not found"),
        Err(e) => {
            error!(%post_id, error = %e, "contextual_sentiment_failed");
            detail(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Contextual sentiment analysis failed: {e}"),
            )
        }
    }
}
