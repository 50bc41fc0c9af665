//! Keyword theme tagging for phase 5.

use anyhow::Result;
use tracing::{info, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use canvass_common::types::{AnalysisMethod, Comment, NewTheme, ThemeCategory};

use crate::traits::{CampaignStore, ThemeTagger};

/// Keywords per theme, already lowercase and without diacritics.
const THEME_KEYWORDS: &[(ThemeCategory, &[&str])] = &[
    (
        ThemeCategory::Saude,
        &[
            "saude", "hospital", "medico", "sus", "vacina", "remedio", "enfermeiro", "clinica",
            "atendimento", "posto", "ubs", "farmacia", "doenca", "pandemia", "leito",
        ],
    ),
    (
        ThemeCategory::Seguranca,
        &[
            "seguranca", "policia", "violencia", "crime", "assalto", "roubo", "droga", "trafico",
            "guarda", "pm", "delegacia", "preso", "arma", "homicidio", "patrulha",
        ],
    ),
    (
        ThemeCategory::Educacao,
        &[
            "educacao", "escola", "professor", "ensino", "aluno", "universidade", "creche", "aula",
            "estudante", "faculdade", "merenda", "alfabetizacao", "bolsa", "enem", "pedagogia",
        ],
    ),
    (
        ThemeCategory::Economia,
        &[
            "economia", "imposto", "salario", "preco", "inflacao", "comercio", "industria", "pib",
            "taxa", "renda", "cesta", "dinheiro", "custo", "mercado", "investimento",
        ],
    ),
    (
        ThemeCategory::Infraestrutura,
        &[
            "obra", "asfalto", "saneamento", "rua", "ponte", "transporte", "onibus", "estrada",
            "agua", "esgoto", "iluminacao", "pavimentacao", "buraco", "moradia", "habitacao",
        ],
    ),
    (
        ThemeCategory::Corrupcao,
        &[
            "corrupcao", "roubo", "desvio", "propina", "lavagem", "fraude", "improbidade",
            "nepotismo", "superfaturamento", "licitacao", "corrupto", "caixa", "mafia",
            "investigacao", "denuncia",
        ],
    ),
    (
        ThemeCategory::Emprego,
        &[
            "emprego", "trabalho", "desemprego", "carteira", "vaga", "contratacao", "salario", "clt",
            "informal", "renda", "capacitacao", "curso", "profissional", "oportunidade", "demissao",
        ],
    ),
    (
        ThemeCategory::MeioAmbiente,
        &[
            "ambiente", "lixo", "poluicao", "verde", "reciclagem", "desmatamento", "rio", "agua",
            "ecologia", "sustentabilidade", "queimada", "floresta", "clima", "parque", "saneamento",
        ],
    ),
];

/// Lowercase, decompose (NFKD) and drop combining marks, so precomposed and
/// separately typed accents both fold to the base letter.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

/// Substring keyword matcher. A comment gets one row per matched theme at
/// confidence 1.0, or a single `outros` row at 0.5.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordThemeTagger;

impl KeywordThemeTagger {
    pub fn themes_for(&self, text: &str) -> Vec<(ThemeCategory, f64)> {
        let normalized = normalize(text);
        let matched: Vec<(ThemeCategory, f64)> = THEME_KEYWORDS
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|kw| normalized.contains(kw)))
            .map(|(theme, _)| (*theme, 1.0))
            .collect();

        if matched.is_empty() {
            vec![(ThemeCategory::Outros, 0.5)]
        } else {
            matched
        }
    }
}

impl ThemeTagger for KeywordThemeTagger {
    fn tag(&self, comment: &Comment) -> Vec<NewTheme> {
        self.themes_for(&comment.text)
            .into_iter()
            .map(|(theme, confidence)| NewTheme {
                comment_id: comment.id,
                theme,
                confidence,
                method: AnalysisMethod::Keyword,
            })
            .collect()
    }
}

/// Tag every comment lacking a theme row. Returns the number of comments processed.
pub async fn tag_unthemed(store: &dyn CampaignStore, tagger: &dyn ThemeTagger) -> Result<u64> {
    let unthemed = store.unthemed_comments().await?;
    if unthemed.is_empty() {
        info!("No unthemed comments found");
        return Ok(0);
    }

    let mut processed = 0u64;
    for comment in &unthemed {
        for theme in tagger.tag(comment) {
            if let Err(e) = store.upsert_theme(&theme).await {
                warn!(
                    comment_id = %comment.id,
                    theme = %theme.theme,
                    error = %e,
                    "theme_upsert_failed"
                );
            }
        }
        processed += 1;
    }

    info!(comments_processed = processed, "classify_all_unthemed_comments_completed");
    Ok(processed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_accents_and_case() {
        assert_eq!(normalize("Saúde e EDUCAÇÃO"), "saude e educacao");
        assert_eq!(normalize("Ônibus à noite"), "onibus a noite");
    }

    #[test]
    fn combining_marks_fold_like_precomposed_accents() {
        let decomposed = "Precisamos de sau\u{301}de e educac\u{327}a\u{303}o";
        assert_eq!(normalize(decomposed), "precisamos de saude e educacao");

        let composed = KeywordThemeTagger.themes_for("Precisamos de saúde");
        let typed_apart = KeywordThemeTagger.themes_for("Precisamos de sau\u{301}de");
        assert_eq!(typed_apart, vec![(ThemeCategory::Saude, 1.0)]);
        assert_eq!(typed_apart, composed);
    }

    #[test]
    fn accented_keywords_match() {
        let themes = KeywordThemeTagger.themes_for("Precisamos de mais SAÚDE no posto!");
        assert_eq!(themes, vec![(ThemeCategory::Saude, 1.0)]);
    }

    #[test]
    fn one_row_per_matched_theme() {
        let themes = KeywordThemeTagger.themes_for("Cadê a escola e o hospital que prometeu?");
        let names: Vec<ThemeCategory> = themes.iter().map(|(t, _)| *t).collect();
        assert_eq!(names, vec![ThemeCategory::Saude, ThemeCategory::Educacao]);
    }

    #[test]
    fn shared_keyword_tags_both_themes() {
        let themes = KeywordThemeTagger.themes_for("falta agua no bairro");
        let names: Vec<ThemeCategory> = themes.iter().map(|(t, _)| *t).collect();
        assert!(names.contains(&ThemeCategory::Infraestrutura));
        assert!(names.contains(&ThemeCategory::MeioAmbiente));
    }

    #[test]
    fn no_match_falls_back_to_outros() {
        let themes = KeywordThemeTagger.themes_for("🔥🔥🔥");
        assert_eq!(themes, vec![(ThemeCategory::Outros, 0.5)]);
    }

    #[test]
    fn tag_uses_keyword_method() {
        let comment = Comment {
            id: uuid::Uuid::new_v4(),
            post_id: uuid::Uuid::new_v4(),
            text: "chega de corrupção".into(),
            author_username: None,
            like_count: 0,
        };
        let rows = KeywordThemeTagger.tag(&comment);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].theme, ThemeCategory::Corrupcao);
        assert_eq!(rows[0].method, AnalysisMethod::Keyword);
        assert_eq!(rows[0].comment_id, comment.id);
    }
}
