//! The `Generator` trait: the boundary to the text-generation service.
//!
//! The service is a black box: slow, rate limited, and fallible. Every
//! failure is reported as a [`GenerateError`] and is recoverable at the call
//! site.

use std::future::Future;

use thiserror::Error;

use crate::response::ResponseSchema;

#[derive(Debug, Error)]
pub enum GenerateError {
  /// No API key is configured for a service that needs one.
  #[error("missing credentials: {0}")]
  MissingCredentials(String),

  #[error("generator unavailable: {0}")]
  Unavailable(String),

  #[error("generator rejected the request ({status}): {body}")]
  Rejected { status: u16, body: String },

  #[error("generator call timed out")]
  Timeout,

  /// The reply did not match the requested schema.
  #[error("invalid generator response: {0}")]
  InvalidResponse(String),
}

/// Abstraction over a text-generation backend.
pub trait Generator: Send + Sync {
  /// Ask for a reply conforming to `schema`; returns the raw JSON value,
  /// which the caller decodes and validates.
  fn generate_structured<'a>(
    &'a self,
    prompt: &'a str,
    schema: &'a ResponseSchema,
  ) -> impl Future<Output = Result<serde_json::Value, GenerateError>> + Send + 'a;

  /// Ask for a free-text reply. `allow_web_search` is forwarded to the
  /// backend as-is.
  fn generate_text<'a>(
    &'a self,
    prompt: &'a str,
    allow_web_search: bool,
  ) -> impl Future<Output = Result<String, GenerateError>> + Send + 'a;
}
