use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use canvass_common::types::{ScrapingStatus, Trigger};
use canvass_pipeline::{BeginOutcome, PhaseOutcome};

use super::detail;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RunStarted {
    pub status: &'static str,
    pub message: &'static str,
    pub run_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RunConflict {
    pub detail: &'static str,
    pub run_id: Option<Uuid>,
}

fn conflict(holder: Option<Uuid>) -> Response {
    (
        StatusCode::CONFLICT,
        Json(RunConflict {
            detail: "Pipeline already in progress",
            run_id: holder,
        }),
    )
        .into_response()
}

/// Start a full pipeline run in the background. 202 with the new run id, or
/// 409 with the id of the run holding the lock.
pub async fn trigger_run(State(state): State<Arc<AppState>>) -> Response {
    if let Some(holder) = state.pipeline.lock().current_holder() {
        warn!(%holder, "Manual trigger rejected, pipeline already running");
        return conflict(Some(holder));
    }

    match state.pipeline.begin(Trigger::Manual).await {
        Ok(BeginOutcome::Started(active)) => {
            let run_id = active.run_id();
            let pipeline = state.pipeline.clone();
            tokio::spawn(async move {
                let summary = pipeline.execute(active).await;
                info!("Manual pipeline run finished. {summary}");
            });

            (
                StatusCode::ACCEPTED,
                Json(RunStarted {
                    status: "started",
                    message: "Pipeline execution started",
                    run_id,
                }),
            )
                .into_response()
        }
        Ok(BeginOutcome::Skipped { holder, .. }) => conflict(holder),
        Err(e) => {
            error!(error = %e, "Failed to start pipeline run");
            detail(StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to start pipeline: {e}"))
        }
    }
}

/// Shared response mapping for the single-phase triggers. These run to
/// completion before answering.
fn phase_response<T: Serialize>(
    outcome: anyhow::Result<PhaseOutcome<T>>,
    status_of: impl Fn(&T) -> ScrapingStatus,
    phase: &str,
    nothing_found: &str,
) -> Response {
    match outcome {
        Ok(PhaseOutcome::Completed(summary)) if status_of(&summary) == ScrapingStatus::Failed => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(summary)).into_response()
        }
        Ok(PhaseOutcome::Completed(summary)) => (StatusCode::ACCEPTED, Json(summary)).into_response(),
        Ok(PhaseOutcome::Skipped { holder, .. }) => conflict(holder),
        Ok(PhaseOutcome::NothingToScrape) => detail(StatusCode::NOT_FOUND, nothing_found),
        Err(e) => {
            error!(phase, error = %e, "Failed to start scraping phase");
            detail(StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to start {phase}: {e}"))
        }
    }
}

/// Scrape posts for every active candidate as a standalone run.
pub async fn trigger_post_scraping(State(state): State<Arc<AppState>>) -> Response {
    if let Some(holder) = state.pipeline.lock().current_holder() {
        return conflict(Some(holder));
    }
    let outcome = state.pipeline.scrape_posts_only(Trigger::Manual).await;
    phase_response(outcome, |s| s.status, "post scraping", "No active candidates found")
}

/// Scrape comments for every stored post as a standalone run.
pub async fn trigger_comment_scraping(State(state): State<Arc<AppState>>) -> Response {
    if let Some(holder) = state.pipeline.lock().current_holder() {
        return conflict(Some(holder));
    }
    let outcome = state.pipeline.scrape_comments_only(Trigger::Manual).await;
    phase_response(
        outcome,
        |s| s.status,
        "comment scraping",
        "No posts found for comment scraping",
    )
}

pub async fn get_run(State(state): State<Arc<AppState>>, Path(run_id): Path<Uuid>) -> Response {
    match state.pipeline.store().get_scraping_run(run_id).await {
        Ok(Some(run)) => Json(run).into_response(),
        Ok(None) => detail(StatusCode::NOT_FOUND, "Scraping run not found"),
        Err(e) => {
            warn!(%run_id, error = %e, "Failed to load scraping run");
            detail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load scraping run")
        }
    }
}
