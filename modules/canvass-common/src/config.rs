use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // Scraping
    pub apify_token: Option<String>,
    pub apify_post_actor_id: String,
    pub apify_comment_actor_id: String,
    pub post_results_limit: u32,
    pub comment_results_limit: u32,
    pub scraping_interval_hours: u64,

    // LLM
    pub llm_provider: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,

    // Web server
    pub web_host: String,
    pub web_port: u16,
    pub allowed_origins: Vec<String>,

    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.log_keys();
        Ok(config)
    }

    /// Build a config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            database_url: get("DATABASE_URL").context("DATABASE_URL is required")?,
            apify_token: get("APIFY_TOKEN"),
            apify_post_actor_id: or("APIFY_POST_ACTOR_ID", "apify/instagram-post-scraper"),
            apify_comment_actor_id: or("APIFY_COMMENT_ACTOR_ID", "apify/instagram-comment-scraper"),
            post_results_limit: or("POST_RESULTS_LIMIT", "10")
                .parse()
                .context("POST_RESULTS_LIMIT must be a number")?,
            comment_results_limit: or("COMMENT_RESULTS_LIMIT", "500")
                .parse()
                .context("COMMENT_RESULTS_LIMIT must be a number")?,
            scraping_interval_hours: or("SCRAPING_INTERVAL_HOURS", "6")
                .parse()
                .context("SCRAPING_INTERVAL_HOURS must be a number")?,
            llm_provider: or("LLM_PROVIDER", "openai").to_lowercase(),
            llm_model: or("LLM_MODEL", "gpt-4o-mini"),
            llm_api_key: get("LLM_API_KEY"),
            llm_base_url: get("LLM_BASE_URL"),
            web_host: or("WEB_HOST", "0.0.0.0"),
            web_port: or("WEB_PORT", "8000")
                .parse()
                .context("WEB_PORT must be a number")?,
            allowed_origins: or("ALLOWED_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            log_level: or("LOG_LEVEL", "info").to_lowercase(),
        })
    }

    /// Chat-completions base URL: explicit override, else derived from the provider.
    pub fn llm_base_url(&self) -> String {
        match &self.llm_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if self.llm_provider == "openai" => "https://api.openai.com/v1".to_string(),
            None => format!("https://api.{}.com/v1", self.llm_provider),
        }
    }

    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let n = val.char_indices().nth(5).map(|(i, _)| i).unwrap_or(val.len());
            format!("{}...({} chars)", &val[..n], val.len())
        }
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) => preview(v),
                None => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  APIFY_TOKEN: {}", preview_opt(&self.apify_token));
        tracing::info!("  LLM_API_KEY: {}", preview_opt(&self.llm_api_key));
        tracing::info!("  LLM_PROVIDER: {} ({})", self.llm_provider, self.llm_model);
        tracing::info!("  SCRAPING_INTERVAL_HOURS: {}", self.scraping_interval_hours);
    }
}
