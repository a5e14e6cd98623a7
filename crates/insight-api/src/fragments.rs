//! Handlers for `/fragments` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/fragments` | Optional `?unlinked=true` |
//! | `GET`    | `/fragments/:id` | Fragment with its tags |
//! | `POST`   | `/fragments` | Body: [`NewFragment`]; returns 201 + stored fragment |
//! | `DELETE` | `/fragments/:id` | Optional `?reason=`; returns the removal record |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use insight_core::{
  Generator,
  fragment::{Fragment, FragmentFilter, FragmentRemoval, NewFragment},
  store::KnowledgeStore,
  tag::Tag,
};
use serde::{Deserialize, Serialize};

use crate::{AppState, error::ApiError};

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  /// Only fragments no document links to yet.
  #[serde(default)]
  pub unlinked: bool,
}

/// `GET /fragments[?unlinked=true]`
pub async fn list<S, G>(
  State(state): State<AppState<S, G>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Fragment>>, ApiError>
where
  S: KnowledgeStore,
  G: Generator,
{
  let filter = if params.unlinked { FragmentFilter::Unlinked } else { FragmentFilter::All };
  let fragments = state.store.list_fragments(filter).await.map_err(ApiError::store)?;
  Ok(Json(fragments))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct FragmentView {
  #[serde(flatten)]
  pub fragment: Fragment,
  pub tags:     Vec<Tag>,
}

/// `GET /fragments/:id`
pub async fn get_one<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<i64>,
) -> Result<Json<FragmentView>, ApiError>
where
  S: KnowledgeStore,
  G: Generator,
{
  let fragment = state
    .store
    .get_fragment(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("fragment {id} not found")))?;
  let tags = state.store.fragment_tags(id).await.map_err(ApiError::store)?;
  Ok(Json(FragmentView { fragment, tags }))
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /fragments`: returns 201 + the stored [`Fragment`].
pub async fn create<S, G>(
  State(state): State<AppState<S, G>>,
  Json(body): Json<NewFragment>,
) -> Result<impl IntoResponse, ApiError>
where
  S: KnowledgeStore,
  G: Generator,
{
  body.validate()?;
  let fragment = state.store.add_fragment(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(fragment)))
}

// ─── Delete ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
  pub reason: Option<String>,
}

/// `DELETE /fragments/:id[?reason=...]`
pub async fn delete_one<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<i64>,
  Query(params): Query<DeleteParams>,
) -> Result<Json<FragmentRemoval>, ApiError>
where
  S: KnowledgeStore,
  G: Generator,
{
  if state.store.get_fragment(id).await.map_err(ApiError::store)?.is_none() {
    return Err(ApiError::NotFound(format!("fragment {id} not found")));
  }
  let removal = state
    .store
    .delete_fragments(vec![id], params.reason)
    .await
    .map_err(ApiError::store)?
    .into_iter()
    .next()
    .ok_or_else(|| ApiError::NotFound(format!("fragment {id} not found")))?;
  Ok(Json(removal))
}
