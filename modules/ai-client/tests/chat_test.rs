//! HTTP-level tests for the chat completion client against a mock server.

use ai_client::{AiError, ChatSettings, OpenAi};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion(content: &str) -> serde_json::Value {
    json!({
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 30, "completion_tokens": 12}
    })
}

#[tokio::test]
async fn sends_settings_and_returns_first_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini", "max_tokens": 50})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("{\"label\":\"positive\"}")))
        .expect(1)
        .mount(&server)
        .await;

    let ai = OpenAi::new("sk-test", "gpt-4o-mini").with_base_url(server.uri());
    let settings = ChatSettings {
        temperature: 0.1,
        max_tokens: 50,
    };
    let content = ai
        .chat_completion_with("system", "Classifique o sentimento: \"ok\"", settings)
        .await
        .unwrap();

    assert_eq!(content, "{\"label\":\"positive\"}");
}

#[tokio::test]
async fn non_success_status_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let ai = OpenAi::new("sk-test", "gpt-4o-mini").with_base_url(server.uri());
    let err = ai.chat_completion("s", "u").await.unwrap_err();

    match err {
        AiError::Api { status, ref message } => {
            assert_eq!(status, 429);
            assert_eq!(message, "rate limited");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert!(err.is_transport());
}

#[tokio::test]
async fn garbage_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let ai = OpenAi::new("sk-test", "gpt-4o-mini").with_base_url(server.uri());
    let err = ai.chat_completion("s", "u").await.unwrap_err();

    assert!(matches!(err, AiError::Parse(_)));
    assert!(!err.is_transport());
}

#[tokio::test]
async fn no_choices_is_empty_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let ai = OpenAi::new("sk-test", "gpt-4o-mini").with_base_url(server.uri());
    let err = ai.chat_completion("s", "u").await.unwrap_err();

    assert!(matches!(err, AiError::EmptyResponse));
}
