use std::sync::Arc;

use axum::{
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use insight_core::GenerateError;
use insight_engine::{
  Engine, EngineConfig, NO_INFORMATION, no_matches, scripted::ScriptedGenerator,
};
use insight_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use super::*;

async fn make_state(generator: ScriptedGenerator) -> AppState<SqliteStore, ScriptedGenerator> {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let engine = Engine::new(Arc::new(store), Arc::new(generator), EngineConfig::default());
  AppState::new(engine)
}

async fn send(
  state:  AppState<SqliteStore, ScriptedGenerator>,
  method: &str,
  uri:    &str,
  body:   Option<Value>,
) -> Response {
  let mut builder = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(json) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(json.to_string())
    }
    None => Body::empty(),
  };
  api_router(state).oneshot(builder.body(body).unwrap()).await.unwrap()
}

async fn json_body(resp: Response) -> Value {
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

fn synthesis_reply(fragment_ids: &[i64], questions: &[&str]) -> Value {
  json!({
    "documents": [{
      "title": "Cats",
      "summary": "About cats.",
      "content": "# Cats\n\nCats purr.",
      "fragment_ids": fragment_ids,
      "tags": ["pets"],
    }],
    "analysis": "one theme",
    "questions": questions,
  })
}

// ── Fragments ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_fragment_returns_201_and_is_unlinked() {
  let state = make_state(ScriptedGenerator::new()).await;
  let resp = send(
    state.clone(),
    "POST",
    "/fragments",
    Some(json!({ "content": "cats purr", "tags": ["pets"] })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let created = json_body(resp).await;
  assert_eq!(created["content"], "cats purr");

  let resp = send(state.clone(), "GET", "/fragments?unlinked=true", None).await;
  assert_eq!(json_body(resp).await.as_array().unwrap().len(), 1);

  let id = created["fragment_id"].as_i64().unwrap();
  let resp = send(state, "GET", &format!("/fragments/{id}"), None).await;
  let view = json_body(resp).await;
  assert_eq!(view["tags"][0]["name"], "pets");
}

#[tokio::test]
async fn blank_fragment_is_bad_request() {
  let state = make_state(ScriptedGenerator::new()).await;
  let resp = send(state, "POST", "/fragments", Some(json!({ "content": "   " }))).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  assert!(json_body(resp).await["error"].as_str().unwrap().contains("must not be empty"));
}

#[tokio::test]
async fn delete_fragment_then_404() {
  let state = make_state(ScriptedGenerator::new()).await;
  send(state.clone(), "POST", "/fragments", Some(json!({ "content": "stale" }))).await;

  let resp = send(state.clone(), "DELETE", "/fragments/1?reason=obsolete", None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let removal = json_body(resp).await;
  assert_eq!(removal["kind"], "deleted");
  assert_eq!(removal["reason"], "obsolete");

  let resp = send(state, "DELETE", "/fragments/1", None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ── Documents ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_document_is_404_json() {
  let state = make_state(ScriptedGenerator::new()).await;
  let resp = send(state, "GET", "/documents/42", None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  assert!(json_body(resp).await["error"].is_string());
}

#[tokio::test]
async fn synthesize_then_browse() {
  let state = make_state(ScriptedGenerator::new().structured(synthesis_reply(&[1], &[]))).await;
  send(state.clone(), "POST", "/fragments", Some(json!({ "content": "cats purr" }))).await;

  let resp = send(state.clone(), "POST", "/synthesize", None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let report = json_body(resp).await;
  assert_eq!(report["created"][0]["title"], "Cats");

  let docs = json_body(send(state.clone(), "GET", "/documents?tag=pets", None).await).await;
  assert_eq!(docs.as_array().unwrap().len(), 1);

  let tags = json_body(send(state.clone(), "GET", "/tags", None).await).await;
  assert_eq!(tags[0]["name"], "pets");
  assert_eq!(tags[0]["document_count"], 1);

  let versions = json_body(send(state.clone(), "GET", "/versions", None).await).await;
  assert_eq!(versions.as_array().unwrap().len(), 1);

  let status = json_body(send(state, "GET", "/status", None).await).await;
  assert_eq!(status["documents"], 1);
  assert_eq!(status["unlinked_fragments"], 0);
}

#[tokio::test]
async fn tag_and_query_together_are_rejected() {
  let state = make_state(ScriptedGenerator::new()).await;
  let resp = send(state, "GET", "/documents?tag=a&q=b", None).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ── Questions ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn answering_twice_is_a_conflict() {
  let reply = synthesis_reply(&[1], &["Which cat?"]);
  let state = make_state(ScriptedGenerator::new().structured(reply)).await;
  send(state.clone(), "POST", "/fragments", Some(json!({ "content": "my cat purrs" }))).await;
  send(state.clone(), "POST", "/synthesize", None).await;

  let pending = json_body(send(state.clone(), "GET", "/questions?pending=true", None).await).await;
  let id = pending[0]["question_id"].as_i64().unwrap();

  let body = Some(json!({ "text": "Tom" }));
  let resp = send(state.clone(), "POST", &format!("/questions/{id}/answer"), body.clone()).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let answered = json_body(resp).await;
  assert_eq!(answered["question"]["status"], "answered");

  let resp = send(state.clone(), "POST", &format!("/questions/{id}/answer"), body).await;
  assert_eq!(resp.status(), StatusCode::CONFLICT);

  let resp = send(state, "POST", "/questions/999/archive", None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ── QA ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ask_with_no_documents_returns_no_information() {
  let state = make_state(ScriptedGenerator::new()).await;
  let resp = send(state, "POST", "/ask", Some(json!({ "question": "anything?" }))).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body = json_body(resp).await;
  assert_eq!(body["answer"], NO_INFORMATION);
  assert_eq!(body["web_search_used"], false);
}

#[tokio::test]
async fn ask_with_unmatched_query_skips_the_generator() {
  let state = make_state(
    ScriptedGenerator::new().structured(synthesis_reply(&[1], &[])).text("unused"),
  )
  .await;
  send(state.clone(), "POST", "/fragments", Some(json!({ "content": "cats purr" }))).await;
  send(state.clone(), "POST", "/synthesize", None).await;

  let body = json!({ "question": "anything?", "query": "volcanoes", "web_search": true });
  let resp = send(state.clone(), "POST", "/ask", Some(body)).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body = json_body(resp).await;
  assert_eq!(body["answer"], no_matches("volcanoes"));
  assert_eq!(body["web_search_used"], false);

  let body = json!({ "question": "anything?", "query": "cats", "document_id": 1 });
  let resp = send(state, "POST", "/ask", Some(body)).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_credentials_is_503() {
  let generator =
    ScriptedGenerator::new().failure(GenerateError::MissingCredentials("OPENAI_API_KEY".into()));
  let state = make_state(generator).await;
  send(state.clone(), "POST", "/fragments", Some(json!({ "content": "cats purr" }))).await;

  let resp = send(state, "POST", "/synthesize", None).await;
  assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn compress_with_too_few_fragments_reports_it() {
  let state = make_state(ScriptedGenerator::new()).await;
  let resp = send(state, "POST", "/compress?dry_run=true", None).await;
  let body = json_body(resp).await;
  assert_eq!(body["outcome"], "not_enough_fragments");
  assert_eq!(body["count"], 0);
}
