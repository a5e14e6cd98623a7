//! Error types for `insight-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{0} must not be empty")]
  EmptyField(&'static str),

  #[error("a document must cover at least one existing fragment")]
  NoSourceFragments,

  #[error("system clock unavailable: {0}")]
  ClockUnavailable(String),

  #[error("question {0} is no longer pending")]
  QuestionAlreadyResolved(i64),

  #[error("unknown question status: {0:?}")]
  UnknownQuestionStatus(String),

  #[error("unknown removal kind: {0:?}")]
  UnknownRemovalKind(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Reject empty or whitespace-only text for a required field.
pub fn require_text(field: &'static str, value: &str) -> Result<()> {
  if value.trim().is_empty() {
    return Err(Error::EmptyField(field));
  }
  Ok(())
}
