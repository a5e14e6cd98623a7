//! The Insight engine: synthesis, compression and question answering.
//!
//! [`Engine`] is generic over a [`KnowledgeStore`] and a [`Generator`], so the
//! same orchestration runs against SQLite in production and against an
//! in-memory store with a [`scripted::ScriptedGenerator`] in tests.
//!
//! No operation spawns background work. Each public method runs to
//! completion on the caller's task; the only suspension points are store
//! calls and generator calls, and every generator call is bounded by
//! [`EngineConfig::generate_timeout`].

mod compression;
mod prompt;
mod qa;
mod questions;
mod synthesis;

pub mod error;
pub mod scripted;

use std::{sync::Arc, time::Duration};

use insight_core::{
  GenerateError, Generator, VersionClock, response::ResponseSchema, store::KnowledgeStore,
};

pub use compression::{
  AppliedAction, CompressionOutcome, CompressionReport, SkipReason, SkippedAction,
  removal_budget,
};
pub use error::{Error, Result};
pub use qa::{
  AskScope, NO_INFORMATION, QaResponse, WEB_SEARCH_SOURCE, global_context, matching_context,
  no_matches, scoped_context,
};
pub use synthesis::{
  DocumentCreated, FailedGroup, PlannedGroup, RefreshOutcome, RejectedCandidate, SynthesisPlan,
  SynthesisReport,
};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Size bounds for the global QA context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QaLimits {
  /// Documents rendered in detail; the rest are only counted.
  pub max_documents:     usize,
  /// Per-document content budget, in characters.
  pub max_content_chars: usize,
}

impl Default for QaLimits {
  fn default() -> Self { Self { max_documents: 10, max_content_chars: 500 } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
  /// Unlinked fragments sent to the generator per synthesis request.
  pub batch_size:          usize,
  /// Upper bound on fragments a single compression pass may remove, as a
  /// percentage of the fragments that existed when the pass started.
  pub max_removal_percent: u32,
  pub qa:                  QaLimits,
  pub generate_timeout:    Duration,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      batch_size:          50,
      max_removal_percent: 30,
      qa:                  QaLimits::default(),
      generate_timeout:    Duration::from_secs(120),
    }
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct Engine<S, G> {
  store:     Arc<S>,
  generator: Arc<G>,
  clock:     VersionClock,
  config:    EngineConfig,
}

impl<S, G> Engine<S, G>
where
  S: KnowledgeStore,
  G: Generator,
{
  pub fn new(store: Arc<S>, generator: Arc<G>, config: EngineConfig) -> Self {
    Self { store, generator, clock: VersionClock::system(), config }
  }

  /// Replace the version clock; tests use this to freeze time.
  pub fn with_clock(mut self, clock: VersionClock) -> Self {
    self.clock = clock;
    self
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  async fn generate_structured(
    &self,
    prompt: &str,
    schema: &ResponseSchema,
  ) -> Result<serde_json::Value, GenerateError> {
    tokio::time::timeout(
      self.config.generate_timeout,
      self.generator.generate_structured(prompt, schema),
    )
    .await
    .map_err(|_| GenerateError::Timeout)?
  }

  async fn generate_text(
    &self,
    prompt: &str,
    allow_web_search: bool,
  ) -> Result<String, GenerateError> {
    tokio::time::timeout(
      self.config.generate_timeout,
      self.generator.generate_text(prompt, allow_web_search),
    )
    .await
    .map_err(|_| GenerateError::Timeout)?
  }
}
