use insight_core::response::synthesis_schema;
use serde_json::json;
use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

use super::*;

fn generator(server: &MockServer, api_key: ApiKey) -> OpenAiGenerator {
  OpenAiGenerator::new(OpenAiConfig {
    api_base_url: format!("{}/v1/", server.uri()),
    model: "test-model".into(),
    temperature: Some(0.2),
    timeout_seconds: 5,
    api_key,
  })
  .unwrap()
}

fn completion(content: &str) -> ResponseTemplate {
  ResponseTemplate::new(200).set_body_json(json!({
    "choices": [{ "message": { "role": "assistant", "content": content } }],
    "usage": { "prompt_tokens": 10, "completion_tokens": 5 },
  }))
}

fn key() -> ApiKey { ApiKey::Key("sk-test".into()) }

#[tokio::test]
async fn structured_call_sends_schema_and_parses_json() {
  let server = MockServer::start().await;
  Mock::given(matchers::method("POST"))
    .and(matchers::path("/v1/chat/completions"))
    .and(matchers::header("authorization", "Bearer sk-test"))
    .and(matchers::body_partial_json(json!({
      "model": "test-model",
      "response_format": {
        "type": "json_schema",
        "json_schema": { "name": "synthesized_documents" },
      },
    })))
    .respond_with(completion(r#"{"documents": [], "analysis": "nothing"}"#))
    .expect(1)
    .mount(&server)
    .await;

  let value = generator(&server, key())
    .generate_structured("fragments", &synthesis_schema())
    .await
    .unwrap();
  assert_eq!(value["analysis"], "nothing");
}

#[tokio::test]
async fn fenced_json_is_accepted() {
  let server = MockServer::start().await;
  Mock::given(matchers::method("POST"))
    .respond_with(completion("```json\n{\"analysis\": \"ok\"}\n```"))
    .mount(&server)
    .await;

  let value = generator(&server, key())
    .generate_structured("p", &synthesis_schema())
    .await
    .unwrap();
  assert_eq!(value["analysis"], "ok");
}

#[tokio::test]
async fn text_call_forwards_web_search_flag() {
  let server = MockServer::start().await;
  Mock::given(matchers::method("POST"))
    .and(matchers::body_partial_json(json!({ "web_search_options": {} })))
    .respond_with(completion("Cats purr."))
    .expect(1)
    .mount(&server)
    .await;

  let answer = generator(&server, key()).generate_text("Do cats purr?", true).await.unwrap();
  assert_eq!(answer, "Cats purr.");
}

#[tokio::test]
async fn server_error_is_rejected_with_body() {
  let server = MockServer::start().await;
  Mock::given(matchers::method("POST"))
    .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
    .mount(&server)
    .await;

  let err = generator(&server, key()).generate_text("q", false).await.unwrap_err();
  match err {
    GenerateError::Rejected { status, body } => {
      assert_eq!(status, 500);
      assert_eq!(body, "upstream down");
    }
    other => panic!("expected Rejected, got {other:?}"),
  }
}

#[tokio::test]
async fn non_json_structured_reply_is_invalid() {
  let server = MockServer::start().await;
  Mock::given(matchers::method("POST"))
    .respond_with(completion("I could not do that."))
    .mount(&server)
    .await;

  let err = generator(&server, key())
    .generate_structured("p", &synthesis_schema())
    .await
    .unwrap_err();
  assert!(matches!(err, GenerateError::InvalidResponse(_)));
}

#[tokio::test]
async fn empty_choices_are_invalid() {
  let server = MockServer::start().await;
  Mock::given(matchers::method("POST"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
    .mount(&server)
    .await;

  let err = generator(&server, key()).generate_text("q", false).await.unwrap_err();
  assert!(matches!(err, GenerateError::InvalidResponse(_)));
}

#[tokio::test]
async fn missing_key_fails_without_a_request() {
  let server = MockServer::start().await;
  Mock::given(matchers::any()).respond_with(completion("{}")).expect(0).mount(&server).await;

  let missing = ApiKey::Missing { env_var: "INSIGHT_TEST_KEY".into() };
  let err = generator(&server, missing).generate_text("q", false).await.unwrap_err();
  match err {
    GenerateError::MissingCredentials(msg) => assert!(msg.contains("INSIGHT_TEST_KEY")),
    other => panic!("expected MissingCredentials, got {other:?}"),
  }
}

#[tokio::test]
async fn keyless_endpoint_sends_no_authorization() {
  let server = MockServer::start().await;
  Mock::given(matchers::method("POST"))
    .respond_with(completion("hello"))
    .mount(&server)
    .await;

  let text = generator(&server, ApiKey::NotRequired).generate_text("hi", false).await.unwrap();
  assert_eq!(text, "hello");
  let requests = server.received_requests().await.unwrap();
  assert!(requests[0].headers.get("authorization").is_none());
}

#[test]
fn empty_env_var_name_means_no_key() {
  assert_eq!(ApiKey::from_env(""), ApiKey::NotRequired);
  assert_eq!(
    ApiKey::from_env("INSIGHT_SURELY_UNSET_VARIABLE"),
    ApiKey::Missing { env_var: "INSIGHT_SURELY_UNSET_VARIABLE".into() }
  );
}

#[test]
fn code_fences_are_stripped() {
  assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
  assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
  assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
}
