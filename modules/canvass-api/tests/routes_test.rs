//! Route tests: the full router driven with `oneshot` over in-memory mocks.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use canvass_api::{build_router, AppState};
use canvass_common::types::{ScrapingStatus, SentimentLabel, Trigger};
use canvass_pipeline::testing::{comment_item, post_item, MockClassifier, MockScraper, MockStore};
use canvass_pipeline::{CampaignStore, Pipeline, PipelineLock};

const URL_1: &str = "https://www.instagram.com/p/AAA/";

struct Harness {
    store: Arc<MockStore>,
    lock: PipelineLock,
    app: Router,
}

fn harness(store: MockStore) -> Harness {
    let store = Arc::new(store);
    let lock = PipelineLock::new();
    let scraper = MockScraper::new()
        .on_posts("ana", vec![post_item("p1", URL_1)])
        .on_comments(URL_1, vec![comment_item("c1", "Quando vai ter obra na minha rua?")]);
    let pipeline = Pipeline::new(
        store.clone(),
        Arc::new(scraper),
        Arc::new(MockClassifier::returning(SentimentLabel::Neutral, 0.9)),
        lock.clone(),
    );
    let state = Arc::new(AppState {
        pipeline: Arc::new(pipeline),
        contextual: None,
        scheduler_running: Arc::new(AtomicBool::new(false)),
    });

    Harness {
        store,
        lock,
        app: build_router(state, &["*".to_string()]),
    }
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn wait_until_idle(lock: &PipelineLock) {
    for _ in 0..200 {
        if !lock.is_running() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("pipeline never released the lock");
}

// =========================================================================
// Health
// =========================================================================

#[tokio::test]
async fn health_reports_connected_database() {
    let h = harness(MockStore::new());

    let (status, body) = send(&h.app, "GET", "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "connected");
    assert_eq!(body["scheduler"], "stopped");
    assert!(body["last_scrape"].is_null());
}

#[tokio::test]
async fn health_is_503_when_database_is_down() {
    let h = harness(MockStore::new().unreachable());

    let (status, body) = send(&h.app, "GET", "/health").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"], "disconnected");
}

// =========================================================================
// Manual trigger
// =========================================================================

#[tokio::test]
async fn trigger_returns_202_and_runs_in_background() {
    let h = harness(MockStore::new().with_candidate("ana"));

    let (status, body) = send(&h.app, "POST", "/api/v1/scraping/run").await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "started");
    let run_id: Uuid = body["run_id"].as_str().unwrap().parse().unwrap();

    wait_until_idle(&h.lock).await;
    let run = h.store.run(run_id).unwrap();
    assert_eq!(run.status, ScrapingStatus::Success);
    assert_eq!(run.posts_scraped, 1);
    assert_eq!(run.comments_scraped, 1);
    assert_eq!(run.metadata["trigger"], "manual");
}

#[tokio::test]
async fn trigger_while_running_is_409_with_holder() {
    let h = harness(MockStore::new().with_candidate("ana"));
    let run_a = Uuid::new_v4();
    assert!(h.lock.try_acquire(run_a));

    let (status, body) = send(&h.app, "POST", "/api/v1/scraping/run").await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["detail"], "Pipeline already in progress");
    assert_eq!(body["run_id"], run_a.to_string());
    assert!(h.store.runs().is_empty());
    assert_eq!(h.store.running_runs(), 0);
}

#[tokio::test]
async fn trigger_is_500_when_run_cannot_be_created() {
    let h = harness(MockStore::new().with_candidate("ana").failing_run_creation());

    let (status, body) = send(&h.app, "POST", "/api/v1/scraping/run").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().unwrap().starts_with("Failed to start pipeline"));
    assert!(!h.lock.is_running());
}

// =========================================================================
// Single-phase triggers
// =========================================================================

#[tokio::test]
async fn post_scraping_runs_phase_one_only() {
    let h = harness(MockStore::new().with_candidate("ana"));

    let (status, body) = send(&h.app, "POST", "/api/v1/scraping/posts").await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "success");
    assert_eq!(body["candidates"], serde_json::json!(["ana"]));
    assert_eq!(body["posts_scraped"], 1);

    let run_id: Uuid = body["run_id"].as_str().unwrap().parse().unwrap();
    let run = h.store.run(run_id).unwrap();
    assert_eq!(run.status, ScrapingStatus::Success);
    assert!(run.completed_at.is_some());
    assert_eq!(h.store.post_count(), 1);
    assert_eq!(h.store.comment_count(), 0);
    assert!(!h.lock.is_running());
}

#[tokio::test]
async fn post_scraping_without_candidates_is_404() {
    let h = harness(MockStore::new());

    let (status, body) = send(&h.app, "POST", "/api/v1/scraping/posts").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "No active candidates found");
    assert!(h.store.runs().is_empty());
}

#[tokio::test]
async fn comment_scraping_covers_stored_posts() {
    let h = harness(MockStore::new().with_candidate("ana"));
    let (status, _) = send(&h.app, "POST", "/api/v1/scraping/posts").await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = send(&h.app, "POST", "/api/v1/scraping/comments").await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "success");
    assert_eq!(body["posts_queued"], 1);
    assert_eq!(body["comments_scraped"], 1);
    assert_eq!(h.store.comment_count(), 1);
    assert_eq!(h.store.runs().len(), 2);
    assert_eq!(h.store.running_runs(), 0);
}

#[tokio::test]
async fn comment_scraping_without_posts_is_404() {
    let h = harness(MockStore::new().with_candidate("ana"));

    let (status, body) = send(&h.app, "POST", "/api/v1/scraping/comments").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "No posts found for comment scraping");
    assert!(h.store.runs().is_empty());
}

#[tokio::test]
async fn phase_triggers_conflict_while_a_run_holds_the_lock() {
    let h = harness(MockStore::new().with_candidate("ana"));
    let holder = Uuid::new_v4();
    assert!(h.lock.try_acquire(holder));

    for uri in ["/api/v1/scraping/posts", "/api/v1/scraping/comments"] {
        let (status, body) = send(&h.app, "POST", uri).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["run_id"], holder.to_string());
    }
    assert!(h.store.runs().is_empty());
}

// =========================================================================
// Run status
// =========================================================================

#[tokio::test]
async fn run_status_returns_record_or_404() {
    let h = harness(MockStore::new());
    let run = h.store.create_scraping_run(Trigger::Scheduler).await.unwrap();

    let (status, body) = send(&h.app, "GET", &format!("/api/v1/scraping/runs/{}", run.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], run.id.to_string());
    assert_eq!(body["status"], "running");

    let (status, body) = send(&h.app, "GET", &format!("/api/v1/scraping/runs/{}", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Scraping run not found");
}

// =========================================================================
// Analysis
// =========================================================================

#[tokio::test]
async fn sentiment_endpoint_scores_unscored_comments() {
    let store = MockStore::new().with_candidate("ana");
    let post = store.seed_post("ana", "Legenda");
    store.seed_comment(post, "Parabens");
    store.seed_comment(post, "Quero saber das propostas para a saude");
    let h = harness(store);

    let (status, body) = send(&h.app, "POST", "/api/v1/analysis/sentiment").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["analyzed_count"], 2);
    assert_eq!(body["skipped_count"], 0);
    assert_eq!(body["message"], "Sentiment analysis complete");
}

#[tokio::test]
async fn llm_fallback_endpoint_returns_stats() {
    let store = MockStore::new();
    store.seed_scored_comment("Vamos ver o que ela vai fazer depois", 0.0, SentimentLabel::Neutral);
    let h = harness(store);

    let (status, body) = send(&h.app, "POST", "/api/v1/analysis/sentiment/llm-fallback").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reclassified_count"], 1);
    assert_eq!(body["api_calls_made"], 1);
    assert_eq!(body["confidence_upgrades"], 1);
    assert_eq!(body["retained_vader_label"], 0);
}

#[tokio::test]
async fn contextual_endpoint_needs_an_llm() {
    let h = harness(MockStore::new());

    let (status, _) = send(
        &h.app,
        "POST",
        &format!("/api/v1/analysis/sentiment/contextual/{}", Uuid::new_v4()),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn contextual_endpoint_is_404_for_unknown_post() {
    let store = Arc::new(MockStore::new());
    let pipeline = Pipeline::new(
        store.clone(),
        Arc::new(MockScraper::new()),
        Arc::new(MockClassifier::unavailable()),
        PipelineLock::new(),
    );
    // Never contacted: the post lookup fails first.
    let ai = ai_client::OpenAi::new("sk-test", "gpt-4o-mini").with_base_url("http://127.0.0.1:9");
    let state = Arc::new(AppState {
        pipeline: Arc::new(pipeline),
        contextual: Some(canvass_pipeline::contextual::ContextualAnalyzer::new(store, ai)),
        scheduler_running: Arc::new(AtomicBool::new(true)),
    });
    let app = build_router(state, &["http://localhost:3000".to_string()]);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/analysis/sentiment/contextual/{}", Uuid::new_v4()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Post not found");

    let (_, health) = send(&app, "GET", "/health").await;
    assert_eq!(health["scheduler"], "running");
}
