//! Selects the scored comments worth a second opinion from the LLM.

use canvass_common::types::ScoredComment;

use crate::sentiment::SentimentSettings;

/// Keep comments whose compound is strictly inside the neutral band, that have
/// no LLM label yet, and whose text is longer than `min_text_len` chars.
/// Input order is preserved.
pub fn select_ambiguous(scored: &[ScoredComment], settings: &SentimentSettings) -> Vec<ScoredComment> {
    scored
        .iter()
        .filter(|c| is_eligible(c, settings))
        .cloned()
        .collect()
}

pub fn is_eligible(comment: &ScoredComment, settings: &SentimentSettings) -> bool {
    settings.is_ambiguous(comment.vader_compound)
        && comment.llm_label.is_none()
        && comment.text.chars().count() > settings.min_text_len
}
