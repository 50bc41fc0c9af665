use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ai_client::OpenAi;
use apify_client::ApifyClient;
use canvass_api::scheduler::{wait_for_idle, Scheduler};
use canvass_api::{build_router, AppState};
use canvass_common::Config;
use canvass_pipeline::classifier::OpenAiSentimentClassifier;
use canvass_pipeline::contextual::ContextualAnalyzer;
use canvass_pipeline::{CampaignStore, PgStore, Pipeline, PipelineLock, ScrapeLimits};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_lowercase())),
        )
        .json()
        .init();

    let config = Config::from_env()?;

    info!("Starting canvass API");

    let store = PgStore::connect(&config.database_url).await?;
    store.migrate().await?;
    let store: Arc<dyn CampaignStore> = Arc::new(store);

    let apify_token = config.apify_token.clone().unwrap_or_else(|| {
        warn!("APIFY_TOKEN not set, scraping phases will fail");
        String::new()
    });
    let scraper = ApifyClient::new(apify_token)?
        .with_post_actor(&config.apify_post_actor_id)
        .with_comment_actor(&config.apify_comment_actor_id);

    let llm_key = config.llm_api_key.clone().unwrap_or_else(|| {
        warn!("LLM_API_KEY not set, LLM reconciliation will fail");
        String::new()
    });
    let ai = OpenAi::new(llm_key, &config.llm_model).with_base_url(config.llm_base_url());

    let lock = PipelineLock::new();
    let pipeline = Arc::new(
        Pipeline::new(
            store.clone(),
            Arc::new(scraper),
            Arc::new(OpenAiSentimentClassifier::new(ai.clone())),
            lock.clone(),
        )
        .with_limits(ScrapeLimits {
            posts_per_candidate: config.post_results_limit,
            comments_per_post: config.comment_results_limit,
        }),
    );

    let contextual = config
        .llm_api_key
        .is_some()
        .then(|| ContextualAnalyzer::new(store.clone(), ai));

    let scheduler_running = Arc::new(AtomicBool::new(false));
    let scheduler = if config.scraping_interval_hours > 0 {
        Some(Scheduler::start(
            pipeline.clone(),
            Duration::from_secs(config.scraping_interval_hours * 3600),
            scheduler_running.clone(),
        ))
    } else {
        warn!("SCRAPING_INTERVAL_HOURS is 0, scheduler disabled");
        None
    };

    let state = Arc::new(AppState {
        pipeline,
        contextual,
        scheduler_running,
    });
    let app = build_router(state, &config.allowed_origins);

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("canvass API listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
    wait_for_idle(&lock).await;
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
