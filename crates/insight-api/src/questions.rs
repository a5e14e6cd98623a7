//! Handlers for `/questions` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/questions` | Optional `?pending=true`; newest first |
//! | `POST` | `/questions/:id/answer` | Body: `{"text":"..."}`; 409 once resolved |
//! | `POST` | `/questions/:id/archive` | 409 once resolved |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use insight_core::{Generator, fragment::Fragment, question::Question, store::KnowledgeStore};
use serde::{Deserialize, Serialize};

use crate::{AppState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  #[serde(default)]
  pub pending: bool,
}

/// `GET /questions[?pending=true]`
pub async fn list<S, G>(
  State(state): State<AppState<S, G>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Question>>, ApiError>
where
  S: KnowledgeStore,
  G: Generator,
{
  let questions = state.store.list_questions(params.pending).await.map_err(ApiError::store)?;
  Ok(Json(questions))
}

#[derive(Debug, Deserialize)]
pub struct AnswerBody {
  pub text: String,
}

#[derive(Debug, Serialize)]
pub struct Answered {
  pub question: Question,
  /// The new, still unlinked, fragment holding the answer.
  pub fragment: Fragment,
}

/// `POST /questions/:id/answer`
pub async fn answer<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<i64>,
  Json(body): Json<AnswerBody>,
) -> Result<Json<Answered>, ApiError>
where
  S: KnowledgeStore,
  G: Generator,
{
  let (question, fragment) = state.engine.answer_question(id, &body.text).await?;
  Ok(Json(Answered { question, fragment }))
}

/// `POST /questions/:id/archive`
pub async fn archive<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<i64>,
) -> Result<Json<Question>, ApiError>
where
  S: KnowledgeStore,
  G: Generator,
{
  Ok(Json(state.engine.archive_question(id).await?))
}
