//! Error type for `insight-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] insight_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("fragment not found: {0}")]
  FragmentNotFound(i64),

  #[error("document not found: {0}")]
  DocumentNotFound(i64),

  #[error("tag not found: {0}")]
  TagNotFound(i64),

  #[error("question not found: {0}")]
  QuestionNotFound(i64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
