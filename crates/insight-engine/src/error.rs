//! Error type for `insight-engine`.

use insight_core::GenerateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The backing store failed; the concrete error type is erased so the
  /// engine stays generic over backends.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error(transparent)]
  Generate(#[from] GenerateError),

  #[error(transparent)]
  Core(#[from] insight_core::Error),

  #[error("document not found: {0}")]
  DocumentNotFound(String),

  #[error("question not found: {0}")]
  QuestionNotFound(i64),

  /// Every synthesis group failed; nothing was written.
  #[error("all {groups} synthesis group(s) failed; last error: {last}")]
  AllGroupsFailed {
    groups: usize,
    #[source]
    last:   Box<Error>,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) fn store_err<E>(e: E) -> Error
where
  E: std::error::Error + Send + Sync + 'static,
{
  Error::Store(Box::new(e))
}
