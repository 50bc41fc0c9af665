//! Secondary classifier and contextual analysis against a mock
//! OpenAI-compatible server.

use std::sync::Arc;

use ai_client::OpenAi;
use canvass_common::types::SentimentLabel;
use canvass_pipeline::classifier::OpenAiSentimentClassifier;
use canvass_pipeline::contextual::{ContextualAnalyzer, ContextualError};
use canvass_pipeline::testing::MockStore;
use canvass_pipeline::{ClassifyError, SecondaryClassifier};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion(content: &str) -> serde_json::Value {
    json!({
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 30, "completion_tokens": 20}
    })
}

fn ai(server: &MockServer) -> OpenAi {
    OpenAi::new("sk-test", "gpt-4o-mini").with_base_url(server.uri())
}

// =========================================================================
// Secondary classifier
// =========================================================================

#[tokio::test]
async fn classifier_sends_comment_and_parses_verdict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"max_tokens": 50})))
        .and(body_string_contains("Vamos ver o que ela faz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "```json\n{\"label\": \"negative\", \"confidence\": 0.83}\n```",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let classifier = OpenAiSentimentClassifier::new(ai(&server));
    let verdict = classifier.classify("Vamos ver o que ela faz").await.unwrap();

    assert_eq!(verdict.label, SentimentLabel::Negative);
    assert_eq!(verdict.confidence, 0.83);
    assert_eq!(verdict.model, "gpt-4o-mini");
}

#[tokio::test]
async fn classifier_http_failure_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = OpenAiSentimentClassifier::new(ai(&server))
        .classify("qualquer comentario longo o bastante")
        .await
        .unwrap_err();

    assert!(matches!(err, ClassifyError::Transport(_)));
    assert_eq!(err.kind(), "transport");
}

#[tokio::test]
async fn classifier_prose_answer_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Acho que e positivo.")))
        .mount(&server)
        .await;

    let err = OpenAiSentimentClassifier::new(ai(&server))
        .classify("qualquer comentario longo o bastante")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "malformed");
}

// =========================================================================
// Contextual analysis
// =========================================================================

#[tokio::test]
async fn contextual_counts_stances_with_caption_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"max_tokens": 2000})))
        .and(body_string_contains("CANDIDATA: Candidata ana"))
        .and(body_string_contains("Denuncia sobre o hospital"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"results": [
                {"index": 0, "classificacao": "apoio"},
                {"index": 1, "classificacao": "apoio"},
                {"index": 3, "classificacao": "contra"}
            ]}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MockStore::new().with_candidate("ana"));
    let post = store.seed_post("ana", "Denuncia sobre o hospital fechado");
    store.seed_comment(post, "Que absurdo!");
    store.seed_comment(post, "Isso tem que acabar");
    store.seed_comment(post, "   ");
    store.seed_comment(post, "Ela nao faz nada");

    let breakdown = ContextualAnalyzer::new(store, ai(&server))
        .analyze_post(post)
        .await
        .unwrap();

    assert_eq!(breakdown.candidate_name, "Candidata ana");
    assert_eq!(breakdown.total_comments, 4);
    assert_eq!(breakdown.total_classified, 3);
    assert_eq!(breakdown.apoio, 2);
    assert_eq!(breakdown.contra, 1);
    assert_eq!(breakdown.neutro, 0);
    assert_eq!(breakdown.apoio_percent, 66.7);
    assert_eq!(breakdown.contra_percent, 33.3);
    assert_eq!(breakdown.neutro_percent, 0.0);
    assert_eq!(breakdown.caption_preview, "Denuncia sobre o hospital fechado");
}

#[tokio::test]
async fn contextual_post_without_comments_skips_the_llm() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MockStore::new().with_candidate("ana"));
    let post = store.seed_post("ana", "Sem comentarios");

    let breakdown = ContextualAnalyzer::new(store, ai(&server))
        .analyze_post(post)
        .await
        .unwrap();

    assert_eq!(breakdown.total_comments, 0);
    assert_eq!(breakdown.apoio_percent, 0.0);
}

#[tokio::test]
async fn contextual_unknown_post_is_not_found() {
    let server = MockServer::start().await;
    let store = Arc::new(MockStore::new());

    let err = ContextualAnalyzer::new(store, ai(&server))
        .analyze_post(Uuid::new_v4())
        .await
        .unwrap_err();

    assert!(matches!(err, ContextualError::PostNotFound(_)));
}

#[tokio::test]
async fn contextual_bad_model_answer_is_llm_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("nao sei")))
        .mount(&server)
        .await;

    let store = Arc::new(MockStore::new().with_candidate("ana"));
    let post = store.seed_post("ana", "Legenda");
    store.seed_comment(post, "Comentario");

    let err = ContextualAnalyzer::new(store, ai(&server))
        .analyze_post(post)
        .await
        .unwrap_err();

    assert!(matches!(err, ContextualError::Llm(_)));
}
