mod client;
pub(crate) mod types;

use std::time::Duration;

use crate::error::{AiError, Result};
use client::{OpenAiClient, OPENAI_API_URL};

// =============================================================================
// Chat settings
// =============================================================================

/// Sampling knobs for a single chat completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatSettings {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 4096,
        }
    }
}

// =============================================================================
// OpenAi Agent
// =============================================================================

#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            timeout: None,
        }
    }

    /// Point the client at any OpenAI-compatible endpoint (e.g. `https://api.groq.com/openai/v1`).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Socket-level timeout applied to every request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(OPENAI_API_URL)
    }

    fn client(&self) -> Result<OpenAiClient> {
        let client = OpenAiClient::new(&self.api_key, self.timeout)?;
        Ok(match self.base_url {
            Some(ref url) => client.with_base_url(url),
            None => client,
        })
    }

    /// Simple chat completion with default settings.
    pub async fn chat_completion(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<String> {
        self.chat_completion_with(system, user, ChatSettings::default())
            .await
    }

    /// Chat completion with explicit temperature and token cap. Returns the
    /// first choice's message content.
    pub async fn chat_completion_with(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
        settings: ChatSettings,
    ) -> Result<String> {
        let mut request = types::ChatRequest::new(&self.model)
            .message(types::WireMessage::system(system))
            .message(types::WireMessage::user(user));

        if types::uses_max_completion_tokens(&self.model) {
            request = request.max_completion_tokens(settings.max_tokens);
        } else {
            request = request
                .max_tokens(settings.max_tokens)
                .temperature(settings.temperature);
        }

        let response = self.client()?.chat(&request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(AiError::EmptyResponse)
    }
}
