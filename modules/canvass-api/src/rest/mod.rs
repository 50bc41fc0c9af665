pub mod analysis;
pub mod scraping;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub scheduler: &'static str,
    pub last_scrape: Option<DateTime<Utc>>,
}

/// `{"detail": ...}` error body.
pub(crate) fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "detail": message.into() }))).into_response()
}

/// 200 when the database answers, 503 otherwise.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = state.pipeline.store();

    let (database, last_scrape) = match store.ping().await {
        Ok(()) => {
            let last = store.last_successful_scrape().await.unwrap_or_else(|e| {
                warn!(error = %e, "Health check: failed to read last scrape");
                None
            });
            ("connected", last)
        }
        Err(e) => {
            warn!(error = %e, "Health check: database connection failed");
            ("disconnected", None)
        }
    };

    let connected = database == "connected";
    let body = HealthResponse {
        status: if connected { "ok" } else { "degraded" },
        database,
        scheduler: if state.scheduler_running.load(Ordering::Relaxed) {
            "running"
        } else {
            "stopped"
        },
        last_scrape,
    };

    let status = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}
