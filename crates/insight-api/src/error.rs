//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use insight_core::GenerateError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// The text-generation service failed.
  #[error("generator error: {0}")]
  Generate(String, GenerateErrorKind),
}

/// How a generator failure maps onto an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateErrorKind {
  Unconfigured,
  Timeout,
  Upstream,
}

impl ApiError {
  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

impl From<GenerateError> for ApiError {
  fn from(e: GenerateError) -> Self {
    let kind = match &e {
      GenerateError::MissingCredentials(_) => GenerateErrorKind::Unconfigured,
      GenerateError::Timeout => GenerateErrorKind::Timeout,
      _ => GenerateErrorKind::Upstream,
    };
    Self::Generate(e.to_string(), kind)
  }
}

impl From<insight_core::Error> for ApiError {
  fn from(e: insight_core::Error) -> Self {
    match &e {
      insight_core::Error::QuestionAlreadyResolved(_) => Self::Conflict(e.to_string()),
      insight_core::Error::EmptyField(_) | insight_core::Error::NoSourceFragments => {
        Self::BadRequest(e.to_string())
      }
      _ => Self::Store(Box::new(e)),
    }
  }
}

impl From<insight_engine::Error> for ApiError {
  fn from(e: insight_engine::Error) -> Self {
    use insight_engine::Error as E;
    let message = e.to_string();
    match e {
      E::Store(inner) => Self::Store(inner),
      E::Generate(g) => g.into(),
      E::Core(c) => c.into(),
      E::DocumentNotFound(_) | E::QuestionNotFound(_) => Self::NotFound(message),
      E::AllGroupsFailed { .. } => Self::Generate(message, GenerateErrorKind::Upstream),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self {
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
      ApiError::Generate(_, GenerateErrorKind::Unconfigured) => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Generate(_, GenerateErrorKind::Timeout) => StatusCode::GATEWAY_TIMEOUT,
      ApiError::Generate(_, GenerateErrorKind::Upstream) => StatusCode::BAD_GATEWAY,
    };
    if status.is_server_error() {
      tracing::error!(%status, error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
