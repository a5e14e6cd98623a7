//! JSON REST API for Insight.
//!
//! Exposes an axum [`Router`] backed by any [`KnowledgeStore`] and
//! [`Generator`]. Auth, TLS, and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", insight_api::api_router(AppState::new(engine)))
//! ```

pub mod documents;
pub mod error;
pub mod fragments;
pub mod questions;
pub mod runs;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use insight_core::{Generator, store::KnowledgeStore};
use insight_engine::Engine;

pub use error::ApiError;

/// Shared handler state.
pub struct AppState<S, G> {
  pub store:  Arc<S>,
  pub engine: Arc<Engine<S, G>>,
}

impl<S, G> AppState<S, G>
where
  S: KnowledgeStore,
  G: Generator,
{
  /// The store is taken from the engine so both see the same backend.
  pub fn new(engine: Engine<S, G>) -> Self {
    Self { store: engine.store().clone(), engine: Arc::new(engine) }
  }
}

// Derived Clone would require `S: Clone, G: Clone`.
impl<S, G> Clone for AppState<S, G> {
  fn clone(&self) -> Self { Self { store: self.store.clone(), engine: self.engine.clone() } }
}

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, G>(state: AppState<S, G>) -> Router<()>
where
  S: KnowledgeStore + 'static,
  G: Generator + 'static,
{
  Router::new()
    // Fragments
    .route("/fragments", get(fragments::list::<S, G>).post(fragments::create::<S, G>))
    .route("/fragments/{id}", get(fragments::get_one::<S, G>).delete(fragments::delete_one::<S, G>))
    // Documents
    .route("/documents", get(documents::list::<S, G>))
    .route("/documents/{id}", get(documents::get_one::<S, G>))
    .route("/documents/{id}/refresh", post(documents::refresh::<S, G>))
    .route("/versions", get(documents::versions::<S, G>))
    .route("/tags", get(documents::tags::<S, G>))
    // Questions
    .route("/questions", get(questions::list::<S, G>))
    .route("/questions/{id}/answer", post(questions::answer::<S, G>))
    .route("/questions/{id}/archive", post(questions::archive::<S, G>))
    // Engine runs
    .route("/synthesize", post(runs::synthesize::<S, G>))
    .route("/compress", post(runs::compress::<S, G>))
    .route("/ask", post(runs::ask::<S, G>))
    .route("/status", get(runs::status::<S, G>))
    .with_state(state)
}

#[cfg(test)]
mod tests;
