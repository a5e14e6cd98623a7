//! Handlers for `/documents`, `/versions` and `/tags`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/documents` | Optional `?tag=` or `?q=`; newest version first |
//! | `GET`  | `/documents/:id` | Document with its fragments and tags |
//! | `POST` | `/documents/:id/refresh` | Optional `?preview=true`; regenerates in place |
//! | `GET`  | `/versions` | Distinct version stamps, newest first |
//! | `GET`  | `/tags` | Tags with document counts |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use insight_core::{
  Generator, VersionStamp,
  document::{Document, DocumentDetail, DocumentRef},
  store::KnowledgeStore,
  tag::TagCount,
};
use insight_engine::RefreshOutcome;
use serde::Deserialize;

use crate::{AppState, error::ApiError};

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  /// Restrict to documents carrying this tag.
  pub tag: Option<String>,
  /// Substring search over title, summary and content.
  pub q:   Option<String>,
}

/// `GET /documents[?tag=...|?q=...]`
pub async fn list<S, G>(
  State(state): State<AppState<S, G>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Document>>, ApiError>
where
  S: KnowledgeStore,
  G: Generator,
{
  let documents = match (params.tag, params.q) {
    (Some(_), Some(_)) => {
      return Err(ApiError::BadRequest("use either `tag` or `q`, not both".into()));
    }
    (Some(tag), None) => state.store.documents_by_tag(tag).await,
    (None, Some(q)) => state.store.search_documents(q).await,
    (None, None) => state.store.list_documents().await,
  }
  .map_err(ApiError::store)?;
  Ok(Json(documents))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /documents/:id`
pub async fn get_one<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<i64>,
) -> Result<Json<DocumentDetail>, ApiError>
where
  S: KnowledgeStore,
  G: Generator,
{
  let detail = state
    .store
    .document_detail(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("document {id} not found")))?;
  Ok(Json(detail))
}

// ─── Refresh ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct RefreshParams {
  #[serde(default)]
  pub preview: bool,
}

/// `POST /documents/:id/refresh[?preview=true]`
pub async fn refresh<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<i64>,
  Query(params): Query<RefreshParams>,
) -> Result<Json<RefreshOutcome>, ApiError>
where
  S: KnowledgeStore,
  G: Generator,
{
  let outcome = state.engine.refresh_document(DocumentRef::Id(id), params.preview).await?;
  Ok(Json(outcome))
}

// ─── Versions & tags ─────────────────────────────────────────────────────────

/// `GET /versions`
pub async fn versions<S, G>(
  State(state): State<AppState<S, G>>,
) -> Result<Json<Vec<VersionStamp>>, ApiError>
where
  S: KnowledgeStore,
  G: Generator,
{
  Ok(Json(state.store.list_versions().await.map_err(ApiError::store)?))
}

/// `GET /tags`
pub async fn tags<S, G>(State(state): State<AppState<S, G>>) -> Result<Json<Vec<TagCount>>, ApiError>
where
  S: KnowledgeStore,
  G: Generator,
{
  Ok(Json(state.store.list_tags().await.map_err(ApiError::store)?))
}
