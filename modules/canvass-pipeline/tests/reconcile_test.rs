//! Reconciliation and baseline scoring against the in-memory store.

use std::sync::Arc;

use canvass_common::types::{Reconciliation, SentimentLabel};
use canvass_pipeline::testing::{MockClassifier, MockStore, MOCK_MODEL};
use canvass_pipeline::{CampaignStore, Reconciler, SentimentClassifier, SentimentSettings};

const AMBIGUOUS: &str = "Vamos ver o que ela vai fazer depois da eleicao";

fn reconciler(store: Arc<MockStore>, classifier: MockClassifier) -> Reconciler {
    Reconciler::new(store, Arc::new(classifier), SentimentSettings::default())
}

// =========================================================================
// Confidence gating
// =========================================================================

#[tokio::test]
async fn confident_verdict_replaces_baseline_label() {
    let store = Arc::new(MockStore::new());
    let id = store.seed_scored_comment(AMBIGUOUS, 0.0, SentimentLabel::Neutral);

    let stats = reconciler(store.clone(), MockClassifier::returning(SentimentLabel::Positive, 0.8))
        .reconcile_all()
        .await
        .unwrap();

    assert_eq!(stats.reclassified, 1);
    assert_eq!(stats.upgrades, 1);
    assert_eq!(stats.retained, 0);

    let score = store.score_for(id).unwrap();
    assert_eq!(score.final_label, SentimentLabel::Positive);
    assert_eq!(score.llm_label, Some(SentimentLabel::Positive));
    assert_eq!(score.llm_confidence, Some(0.8));
    assert_eq!(score.llm_model.as_deref(), Some(MOCK_MODEL));
}

#[tokio::test]
async fn low_confidence_verdict_is_stored_but_baseline_kept() {
    let store = Arc::new(MockStore::new());
    let id = store.seed_scored_comment(AMBIGUOUS, 0.0, SentimentLabel::Neutral);

    let stats = reconciler(store.clone(), MockClassifier::returning(SentimentLabel::Positive, 0.5))
        .reconcile_all()
        .await
        .unwrap();

    assert_eq!(stats.reclassified, 1);
    assert_eq!(stats.upgrades, 0);
    assert_eq!(stats.retained, 1);

    let score = store.score_for(id).unwrap();
    assert_eq!(score.final_label, SentimentLabel::Neutral);
    assert_eq!(score.llm_label, Some(SentimentLabel::Positive));
    assert_eq!(score.llm_confidence, Some(0.5));
}

#[tokio::test]
async fn confidence_exactly_at_threshold_upgrades() {
    let store = Arc::new(MockStore::new());
    let id = store.seed_scored_comment(AMBIGUOUS, 0.01, SentimentLabel::Neutral);

    reconciler(store.clone(), MockClassifier::returning(SentimentLabel::Negative, 0.7))
        .reconcile_all()
        .await
        .unwrap();

    assert_eq!(store.score_for(id).unwrap().final_label, SentimentLabel::Negative);
}

// =========================================================================
// Gate
// =========================================================================

#[tokio::test]
async fn short_and_confident_comments_never_reach_the_classifier() {
    let store = Arc::new(MockStore::new());
    store.seed_scored_comment("curti", 0.0, SentimentLabel::Neutral);
    store.seed_scored_comment("exatamente vinte chr", 0.0, SentimentLabel::Neutral);
    store.seed_scored_comment("Excelente trabalho, parabens pela proposta", 0.05, SentimentLabel::Positive);
    store.seed_scored_comment("Pessima gestao, nao resolveu nada ate agora", -0.05, SentimentLabel::Negative);

    let classifier = Arc::new(MockClassifier::returning(SentimentLabel::Positive, 0.9));
    let stats = Reconciler::new(store.clone(), classifier.clone(), SentimentSettings::default())
        .reconcile_all()
        .await
        .unwrap();

    assert_eq!(classifier.calls(), 0);
    assert_eq!(stats.reclassified, 0);
    assert_eq!(stats.cost_estimate_usd, 0.0);
}

#[tokio::test]
async fn already_reconciled_comments_are_not_resent() {
    let store = Arc::new(MockStore::new());
    store.seed_scored_comment(AMBIGUOUS, 0.0, SentimentLabel::Neutral);
    let classifier = Arc::new(MockClassifier::returning(SentimentLabel::Negative, 0.9));
    let reconciler = Reconciler::new(store.clone(), classifier.clone(), SentimentSettings::default());

    reconciler.reconcile_all().await.unwrap();
    let second = reconciler.reconcile_all().await.unwrap();

    assert_eq!(classifier.calls(), 1);
    assert_eq!(second.reclassified, 0);
}

// =========================================================================
// Failures
// =========================================================================

#[tokio::test]
async fn classifier_errors_leave_rows_untouched_and_are_not_counted() {
    let store = Arc::new(MockStore::new());
    let broken = store.seed_scored_comment("Esse comentario quebra o classificador", 0.0, SentimentLabel::Neutral);
    let garbled = store.seed_scored_comment("Esse outro volta com resposta estranha", 0.0, SentimentLabel::Neutral);
    let fine = store.seed_scored_comment(AMBIGUOUS, 0.0, SentimentLabel::Neutral);

    let classifier = MockClassifier::returning(SentimentLabel::Negative, 0.9)
        .transport_error_on("Esse comentario quebra o classificador")
        .malformed_on("Esse outro volta com resposta estranha");
    let stats = reconciler(store.clone(), classifier).reconcile_all().await.unwrap();

    assert_eq!(stats.api_calls, 1);
    assert_eq!(stats.reclassified, 1);
    assert!(store.score_for(broken).unwrap().llm_label.is_none());
    assert!(store.score_for(garbled).unwrap().llm_label.is_none());
    assert_eq!(store.score_for(fine).unwrap().final_label, SentimentLabel::Negative);
}

#[tokio::test]
async fn unavailable_classifier_reconciles_nothing() {
    let store = Arc::new(MockStore::new());
    store.seed_scored_comment(AMBIGUOUS, 0.0, SentimentLabel::Neutral);

    let stats = reconciler(store.clone(), MockClassifier::unavailable())
        .reconcile_all()
        .await
        .unwrap();

    assert_eq!(stats.api_calls, 0);
    assert_eq!(stats.reclassified, 0);
}

#[tokio::test]
async fn losing_the_update_race_is_not_counted() {
    let store = Arc::new(MockStore::new());
    let id = store.seed_scored_comment(AMBIGUOUS, 0.0, SentimentLabel::Neutral);

    // Another worker reconciles the row first.
    let applied = store
        .apply_reconciliation(&Reconciliation {
            comment_id: id,
            llm_label: SentimentLabel::Negative,
            llm_confidence: 0.95,
            llm_model: "other".into(),
            final_label: SentimentLabel::Negative,
        })
        .await
        .unwrap();
    assert!(applied);

    let again = store
        .apply_reconciliation(&Reconciliation {
            comment_id: id,
            llm_label: SentimentLabel::Positive,
            llm_confidence: 0.9,
            llm_model: MOCK_MODEL.into(),
            final_label: SentimentLabel::Positive,
        })
        .await
        .unwrap();

    assert!(!again);
    let score = store.score_for(id).unwrap();
    assert_eq!(score.llm_model.as_deref(), Some("other"));
    assert_eq!(score.final_label, SentimentLabel::Negative);
}

// =========================================================================
// Baseline scoring
// =========================================================================

#[tokio::test]
async fn batch_of_five_persists_five_baseline_rows() {
    let store = Arc::new(MockStore::new().with_candidate("ana"));
    let post = store.seed_post("ana", "Visita ao hospital");
    let texts = [
        "Parabens pelo trabalho",
        "Nao gostei",
        "Quando vai ter obra na minha rua?",
        "great job",
        "",
    ];
    let ids: Vec<_> = texts.iter().map(|t| store.seed_comment(post, t)).collect();

    let comments = store.unscored_comments().await.unwrap();
    let inserted = SentimentClassifier::default()
        .analyze_batch(store.as_ref(), &comments)
        .await;

    assert_eq!(inserted.len(), 5);
    assert_eq!(store.score_count(), 5);
    for id in &ids {
        let score = store.score_for(*id).unwrap();
        assert_eq!(score.final_label, score.vader_label);
        assert!(score.llm_label.is_none());
        assert!(score.llm_confidence.is_none());
        assert!(score.llm_model.is_none());
    }

    let empty = store.score_for(ids[4]).unwrap();
    assert_eq!(empty.vader_compound, 0.0);
    assert_eq!(empty.vader_label, SentimentLabel::Neutral);
}

#[tokio::test]
async fn baseline_skips_scored_comments_and_survives_insert_failures() {
    let store = Arc::new(MockStore::new().with_candidate("ana"));
    let post = store.seed_post("ana", "Comicio no centro");
    let first = store.seed_comment(post, "primeiro");
    let classifier = SentimentClassifier::default();

    let stats = classifier.run_baseline_analysis(store.as_ref()).await.unwrap();
    assert_eq!(stats.analyzed_count, 1);
    assert_eq!(stats.skipped_count, 0);

    let broken = store.seed_comment(post, "segundo");
    store.seed_comment(post, "terceiro");
    store.fail_score_insert_for(broken);

    let stats = classifier.run_baseline_analysis(store.as_ref()).await.unwrap();
    assert_eq!(stats.analyzed_count, 1);
    assert_eq!(stats.skipped_count, 1);
    assert!(store.score_for(first).is_some());
    assert!(store.score_for(broken).is_none());
}
