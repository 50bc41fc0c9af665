pub mod classifier;
pub mod contextual;
pub mod gate;
pub mod lock;
pub mod mapping;
pub mod pipeline;
pub mod reconcile;
pub mod scraping;
pub mod sentiment;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod themes;
pub mod traits;

pub use lock::{HeldPipelineLock, PipelineLock};
pub use pipeline::{
    ActiveRun, BeginOutcome, CommentScrapeSummary, PhaseOutcome, Pipeline, PipelineOutcome, PipelineSummary,
    PostScrapeSummary,
};
pub use reconcile::{ReconcileStats, Reconciler};
pub use scraping::ScrapeLimits;
pub use sentiment::{SentimentClassifier, SentimentSettings};
pub use store::PgStore;
pub use traits::{CampaignStore, ClassifyError, LlmVerdict, SecondaryClassifier, SocialScraper, ThemeTagger};
