//! LLM-backed secondary sentiment classifier.

use std::time::Duration;

use ai_client::{json_payload, AiError, ChatSettings, OpenAi};
use async_trait::async_trait;
use serde_json::Value;

use canvass_common::types::SentimentLabel;

use crate::traits::{ClassifyError, LlmVerdict, SecondaryClassifier};

pub const SENTIMENT_SYSTEM_PROMPT: &str = "Voce e um analista de sentimento para comentarios em portugues do Instagram. \
Classifique o comentario como 'positive', 'negative' ou 'neutral'. \
Responda APENAS em JSON: {\"label\": \"positive|negative|neutral\", \"confidence\": 0.0-1.0}";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const SETTINGS: ChatSettings = ChatSettings {
    temperature: 0.1,
    max_tokens: 50,
};

pub struct OpenAiSentimentClassifier {
    ai: OpenAi,
}

impl OpenAiSentimentClassifier {
    /// Wraps `ai` with the 10s per-request timeout used for single-comment calls.
    pub fn new(ai: OpenAi) -> Self {
        Self {
            ai: ai.with_timeout(REQUEST_TIMEOUT),
        }
    }

    pub fn model(&self) -> &str {
        self.ai.model()
    }
}

pub fn user_prompt(text: &str) -> String {
    format!("Classifique o sentimento: \"{text}\"")
}

#[async_trait]
impl SecondaryClassifier for OpenAiSentimentClassifier {
    async fn classify(&self, text: &str) -> Result<LlmVerdict, ClassifyError> {
        let content = self
            .ai
            .chat_completion_with(SENTIMENT_SYSTEM_PROMPT, user_prompt(text), SETTINGS)
            .await
            .map_err(classify_error)?;

        parse_verdict(&content, self.ai.model())
    }
}

fn classify_error(err: AiError) -> ClassifyError {
    match err {
        e if e.is_transport() => ClassifyError::Transport(e.to_string()),
        AiError::Config(msg) => ClassifyError::Transport(msg),
        other => ClassifyError::Malformed(other.to_string()),
    }
}

/// Parse `{"label": ..., "confidence": ...}`. A missing or unknown label is
/// neutral, a missing confidence is 0, and confidence is clamped to [0, 1].
pub fn parse_verdict(content: &str, model: &str) -> Result<LlmVerdict, ClassifyError> {
    let value: Value = serde_json::from_str(json_payload(content))
        .map_err(|e| ClassifyError::Malformed(format!("invalid JSON: {e}")))?;

    let obj = value
        .as_object()
        .ok_or_else(|| ClassifyError::Malformed("expected a JSON object".into()))?;

    let label = obj
        .get("label")
        .and_then(Value::as_str)
        .map(SentimentLabel::from_str_loose)
        .unwrap_or(SentimentLabel::Neutral);

    let confidence = match obj.get("confidence") {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ClassifyError::Malformed(format!("confidence is not a number: {s:?}")))?,
        Some(other) => {
            return Err(ClassifyError::Malformed(format!("confidence is not a number: {other}")));
        }
    };

    if !confidence.is_finite() {
        return Err(ClassifyError::Malformed("confidence is not finite".into()));
    }

    Ok(LlmVerdict {
        label,
        confidence: confidence.clamp(0.0, 1.0),
        model: model.to_string(),
    })
}
