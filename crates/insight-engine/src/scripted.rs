//! [`ScriptedGenerator`], a [`Generator`] that replays canned replies.
//!
//! Used by the engine and API tests, and handy for exercising the pipeline
//! offline. Replies are consumed in order; running out is an
//! [`GenerateError::Unavailable`] error.

use std::{
  collections::VecDeque,
  sync::{Mutex, PoisonError},
};

use insight_core::{GenerateError, Generator, response::ResponseSchema};
use serde_json::Value;

#[derive(Debug)]
enum Reply {
  Structured(Value),
  Text(String),
  Fail(GenerateError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
  pub prompt:           String,
  /// Schema name for structured calls, `None` for text calls.
  pub schema:           Option<&'static str>,
  pub allow_web_search: bool,
}

#[derive(Debug, Default)]
pub struct ScriptedGenerator {
  replies: Mutex<VecDeque<Reply>>,
  calls:   Mutex<Vec<RecordedCall>>,
}

impl ScriptedGenerator {
  pub fn new() -> Self { Self::default() }

  pub fn structured(self, value: Value) -> Self { self.push(Reply::Structured(value)) }

  pub fn text(self, text: impl Into<String>) -> Self { self.push(Reply::Text(text.into())) }

  pub fn failure(self, error: GenerateError) -> Self { self.push(Reply::Fail(error)) }

  fn push(self, reply: Reply) -> Self {
    self.replies.lock().unwrap_or_else(PoisonError::into_inner).push_back(reply);
    self
  }

  /// Every call made so far, in order.
  pub fn calls(&self) -> Vec<RecordedCall> {
    self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  fn next(&self, call: RecordedCall) -> Option<Reply> {
    self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call);
    self.replies.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
  }
}

impl Generator for ScriptedGenerator {
  async fn generate_structured<'a>(
    &'a self,
    prompt: &'a str,
    schema: &'a ResponseSchema,
  ) -> Result<Value, GenerateError> {
    let call = RecordedCall {
      prompt:           prompt.to_owned(),
      schema:           Some(schema.name),
      allow_web_search: false,
    };
    match self.next(call) {
      Some(Reply::Structured(value)) => Ok(value),
      Some(Reply::Fail(e)) => Err(e),
      Some(Reply::Text(_)) => Err(GenerateError::InvalidResponse(
        "scripted a text reply for a structured call".into(),
      )),
      None => Err(GenerateError::Unavailable("no scripted reply left".into())),
    }
  }

  async fn generate_text<'a>(
    &'a self,
    prompt: &'a str,
    allow_web_search: bool,
  ) -> Result<String, GenerateError> {
    let call = RecordedCall { prompt: prompt.to_owned(), schema: None, allow_web_search };
    match self.next(call) {
      Some(Reply::Text(text)) => Ok(text),
      Some(Reply::Fail(e)) => Err(e),
      Some(Reply::Structured(value)) => Ok(value.to_string()),
      None => Err(GenerateError::Unavailable("no scripted reply left".into())),
    }
  }
}
