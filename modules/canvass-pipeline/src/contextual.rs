//! Whole-post stance analysis: one LLM call classifies every comment of a
//! post as support, opposition or neutral, reading the caption as context.

use std::sync::Arc;
use std::time::Duration;

use ai_client::{json_payload, ChatSettings, OpenAi};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::traits::CampaignStore;

pub const CONTEXTUAL_SYSTEM_PROMPT: &str = r#"Você é um analista de sentimento político especializado em campanhas eleitorais brasileiras.

TAREFA: Analisar comentários de um post do Instagram considerando o CONTEXTO do post.

IMPORTANTE: Muitos candidatos postam conteúdo polêmico (denúncias, críticas sociais, temas revoltantes).
Quando o público reage com revolta ao TEMA do post (ex: "que nojo!", "isso é absurdo!"), isso geralmente
é APOIO à candidata por denunciar/expor o problema, NÃO é ataque à candidata.

CLASSIFIQUE cada comentário em:
- "apoio": O comentário APOIA a candidata (inclui revolta com o tema que demonstra concordância)
- "contra": O comentário ATACA ou CRITICA a candidata diretamente
- "neutro": Não é possível determinar, ou é comentário genérico (emoji, marcação de amigo, etc.)

Responda APENAS em JSON:
{"results": [{"index": 0, "classificacao": "apoio|contra|neutro"}, ...]}
"#;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const SETTINGS: ChatSettings = ChatSettings {
    temperature: 0.2,
    max_tokens: 2000,
};
const CAPTION_CONTEXT_CHARS: usize = 500;
const CAPTION_PREVIEW_CHARS: usize = 100;
const DEFAULT_CANDIDATE_NAME: &str = "candidata";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextualBreakdown {
    pub post_id: Uuid,
    pub caption_preview: String,
    pub candidate_name: String,
    pub total_comments: usize,
    pub total_classified: usize,
    pub apoio: usize,
    pub contra: usize,
    pub neutro: usize,
    pub apoio_percent: f64,
    pub contra_percent: f64,
    pub neutro_percent: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum ContextualError {
    #[error("Post not found: {0}")]
    PostNotFound(Uuid),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("Analysis failed: {0}")]
    Llm(String),
}

#[derive(Debug, Deserialize)]
struct StanceResponse {
    #[serde(default)]
    results: Vec<StanceResult>,
}

#[derive(Debug, Deserialize)]
struct StanceResult {
    #[serde(default)]
    classificacao: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StanceCounts {
    pub apoio: usize,
    pub contra: usize,
    pub neutro: usize,
    /// Entries returned by the model, including unrecognised ones.
    pub classified: usize,
}

/// Count stances in the model's `{"results": [...]}` answer.
pub fn parse_stances(content: &str) -> Result<StanceCounts, ContextualError> {
    let parsed: StanceResponse = serde_json::from_str(json_payload(content))
        .map_err(|e| ContextualError::Llm(format!("invalid JSON: {e}")))?;

    let mut counts = StanceCounts {
        classified: parsed.results.len(),
        ..Default::default()
    };
    for result in &parsed.results {
        match result.classificacao.as_deref() {
            Some("apoio") => counts.apoio += 1,
            Some("contra") => counts.contra += 1,
            Some("neutro") => counts.neutro += 1,
            _ => {}
        }
    }
    Ok(counts)
}

fn percent(part: usize, total: usize) -> f64 {
    let total = total.max(1) as f64;
    (part as f64 / total * 1000.0).round() / 10.0
}

fn take_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

pub struct ContextualAnalyzer {
    store: Arc<dyn CampaignStore>,
    ai: OpenAi,
}

impl ContextualAnalyzer {
    pub fn new(store: Arc<dyn CampaignStore>, ai: OpenAi) -> Self {
        Self {
            store,
            ai: ai.with_timeout(REQUEST_TIMEOUT),
        }
    }

    pub async fn analyze_post(&self, post_id: Uuid) -> Result<ContextualBreakdown, ContextualError> {
        let post = self
            .store
            .get_post(post_id)
            .await?
            .ok_or(ContextualError::PostNotFound(post_id))?;
        let caption = post.caption.clone().unwrap_or_default();

        let candidate_name = self
            .store
            .get_candidate(post.candidate_id)
            .await?
            .and_then(|c| c.display_name)
            .unwrap_or_else(|| DEFAULT_CANDIDATE_NAME.to_string());

        let comments = self.store.comments_for_post(post_id).await?;
        let mut breakdown = ContextualBreakdown {
            post_id,
            caption_preview: take_chars(&caption, CAPTION_PREVIEW_CHARS),
            candidate_name: candidate_name.clone(),
            total_comments: comments.len(),
            total_classified: 0,
            apoio: 0,
            contra: 0,
            neutro: 0,
            apoio_percent: 0.0,
            contra_percent: 0.0,
            neutro_percent: 0.0,
        };
        if comments.is_empty() {
            return Ok(breakdown);
        }

        let lines: Vec<String> = comments
            .iter()
            .enumerate()
            .filter_map(|(i, c)| {
                let text = c.text.replace('\n', " ");
                let text = text.trim();
                (!text.is_empty()).then(|| format!("{i}. {text}"))
            })
            .collect();

        let user_message = format!(
            "CANDIDATA: {candidate_name}\n\nLEGENDA DO POST:\n{}\n\nCOMENTÁRIOS ({}):\n{}",
            take_chars(&caption, CAPTION_CONTEXT_CHARS),
            lines.len(),
            lines.join("\n"),
        );

        let content = self
            .ai
            .chat_completion_with(CONTEXTUAL_SYSTEM_PROMPT, user_message, SETTINGS)
            .await
            .map_err(|e| {
                error!(%post_id, error = %e, "contextual_sentiment_failed");
                ContextualError::Llm(e.to_string())
            })?;

        let counts = parse_stances(&content).inspect_err(|e| {
            error!(%post_id, error = %e, "contextual_sentiment_failed");
        })?;

        let denominator = counts.apoio + counts.contra + counts.neutro;
        breakdown.total_classified = counts.classified;
        breakdown.apoio = counts.apoio;
        breakdown.contra = counts.contra;
        breakdown.neutro = counts.neutro;
        breakdown.apoio_percent = percent(counts.apoio, denominator);
        breakdown.contra_percent = percent(counts.contra, denominator);
        breakdown.neutro_percent = percent(counts.neutro, denominator);

        info!(
            %post_id,
            apoio = counts.apoio,
            contra = counts.contra,
            neutro = counts.neutro,
            "contextual_sentiment_completed"
        );
        Ok(breakdown)
    }
}
