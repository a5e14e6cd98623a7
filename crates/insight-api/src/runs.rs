//! Handlers that drive the engine, plus `/status`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/synthesize` | Optional `?dry_run=true` returns the plan instead |
//! | `POST` | `/compress` | Optional `?dry_run=true` |
//! | `POST` | `/ask` | Body: [`AskBody`] |
//! | `GET`  | `/status` | Row counts |

use axum::{
  Json,
  extract::{Query, State},
  response::{IntoResponse, Response},
};
use insight_core::{
  Generator,
  store::{KnowledgeStore, StoreStatus},
};
use insight_engine::{AskScope, CompressionOutcome, QaResponse};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct RunParams {
  #[serde(default)]
  pub dry_run: bool,
}

/// `POST /synthesize[?dry_run=true]`
pub async fn synthesize<S, G>(
  State(state): State<AppState<S, G>>,
  Query(params): Query<RunParams>,
) -> Result<Response, ApiError>
where
  S: KnowledgeStore,
  G: Generator,
{
  if params.dry_run {
    return Ok(Json(state.engine.plan_synthesis().await?).into_response());
  }
  Ok(Json(state.engine.synthesize().await?).into_response())
}

/// `POST /compress[?dry_run=true]`
pub async fn compress<S, G>(
  State(state): State<AppState<S, G>>,
  Query(params): Query<RunParams>,
) -> Result<Json<CompressionOutcome>, ApiError>
where
  S: KnowledgeStore,
  G: Generator,
{
  let outcome = if params.dry_run {
    state.engine.plan_compression().await?
  } else {
    state.engine.compress().await?
  };
  Ok(Json(outcome))
}

/// Without `document_id` or `query` the answer comes from the latest
/// version batch. Setting both is a bad request.
#[derive(Debug, Deserialize)]
pub struct AskBody {
  pub question:    String,
  /// Scope the answer to one document.
  pub document_id: Option<i64>,
  /// Answer from the documents matching this search term.
  pub query:       Option<String>,
  #[serde(default)]
  pub web_search:  bool,
}

impl AskBody {
  fn scope(&self) -> Result<AskScope, ApiError> {
    match (self.document_id, &self.query) {
      (Some(_), Some(_)) => {
        Err(ApiError::BadRequest("use either `document_id` or `query`, not both".into()))
      }
      (Some(id), None) => Ok(AskScope::Document(id)),
      (None, Some(term)) => Ok(AskScope::Matching(term.clone())),
      (None, None) => Ok(AskScope::Latest),
    }
  }
}

/// `POST /ask`
pub async fn ask<S, G>(
  State(state): State<AppState<S, G>>,
  Json(body): Json<AskBody>,
) -> Result<Json<QaResponse>, ApiError>
where
  S: KnowledgeStore,
  G: Generator,
{
  let scope = body.scope()?;
  let response = state.engine.ask(&body.question, scope, body.web_search).await?;
  Ok(Json(response))
}

/// `GET /status`
pub async fn status<S, G>(State(state): State<AppState<S, G>>) -> Result<Json<StoreStatus>, ApiError>
where
  S: KnowledgeStore,
  G: Generator,
{
  Ok(Json(state.store.status().await.map_err(ApiError::store)?))
}
