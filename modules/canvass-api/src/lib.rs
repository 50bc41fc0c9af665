//! HTTP surface and interval scheduler for the canvass pipeline.

pub mod rest;
pub mod scheduler;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use canvass_pipeline::contextual::ContextualAnalyzer;
use canvass_pipeline::Pipeline;

pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Absent when no LLM key is configured.
    pub contextual: Option<ContextualAnalyzer>,
    pub scheduler_running: Arc<AtomicBool>,
}

pub fn build_router(state: Arc<AppState>, allowed_origins: &[String]) -> Router {
    Router::new()
        // Health check
        .route("/health", get(rest::health))
        // Scraping
        .route("/api/v1/scraping/run", post(rest::scraping::trigger_run))
        .route("/api/v1/scraping/posts", post(rest::scraping::trigger_post_scraping))
        .route("/api/v1/scraping/comments", post(rest::scraping::trigger_comment_scraping))
        .route("/api/v1/scraping/runs/{id}", get(rest::scraping::get_run))
        // Analysis
        .route("/api/v1/analysis/sentiment", post(rest::analysis::run_sentiment))
        .route(
            "/api/v1/analysis/sentiment/llm-fallback",
            post(rest::analysis::run_llm_fallback),
        )
        .route(
            "/api/v1/analysis/sentiment/contextual/{post_id}",
            post(rest::analysis::run_contextual),
        )
        .with_state(state)
        .layer(cors_layer(allowed_origins))
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

/// `*` allows any origin; otherwise only the listed ones.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
