//! The `KnowledgeStore` trait and supporting summary types.
//!
//! The trait is implemented by storage backends (e.g. `insight-store-sqlite`).
//! The engine, the API and the CLI depend on this abstraction, not on any
//! concrete backend.
//!
//! Every method that touches more than one row runs in a single transaction
//! and either commits fully or leaves no trace.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
  document::{Document, DocumentDetail, DocumentRef, DocumentRevision, LinkedDocument, NewDocument},
  fragment::{Fragment, FragmentFilter, FragmentRemoval, NewFragment},
  question::{NewQuestion, Question},
  tag::{Tag, TagCount},
  version::VersionStamp,
};

// ─── Summaries ───────────────────────────────────────────────────────────────

/// Row counts reported by `status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatus {
  pub documents:          u64,
  pub fragments:          u64,
  pub unlinked_fragments: u64,
  pub tags:               u64,
  pub pending_questions:  u64,
  pub versions:           u64,
}

/// Rows removed by a bulk reset or clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearSummary {
  pub documents: u64,
  pub tags:      u64,
  pub fragments: u64,
  pub questions: u64,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an Insight store backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait KnowledgeStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Fragments ─────────────────────────────────────────────────────────

  /// Validate and persist a fragment, attaching any named tags.
  fn add_fragment(
    &self,
    input: NewFragment,
  ) -> impl Future<Output = Result<Fragment, Self::Error>> + Send + '_;

  fn get_fragment(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Fragment>, Self::Error>> + Send + '_;

  /// Fragments in ascending id order.
  fn list_fragments(
    &self,
    filter: FragmentFilter,
  ) -> impl Future<Output = Result<Vec<Fragment>, Self::Error>> + Send + '_;

  fn fragment_tags(
    &self,
    fragment_id: i64,
  ) -> impl Future<Output = Result<Vec<Tag>, Self::Error>> + Send + '_;

  /// Remove every listed fragment in one transaction. Fails without removing
  /// anything if any id does not exist.
  fn delete_fragments(
    &self,
    ids: Vec<i64>,
    reason: Option<String>,
  ) -> impl Future<Output = Result<Vec<FragmentRemoval>, Self::Error>> + Send + '_;

  /// Rewrite `ids[0]` with `new_content` and remove the remaining ids, in one
  /// transaction. Fails without changing anything if any id does not exist.
  fn merge_fragments(
    &self,
    ids: Vec<i64>,
    new_content: String,
    reason: Option<String>,
  ) -> impl Future<Output = Result<Vec<FragmentRemoval>, Self::Error>> + Send + '_;

  /// The removal log, oldest first.
  fn list_removals(
    &self,
  ) -> impl Future<Output = Result<Vec<FragmentRemoval>, Self::Error>> + Send + '_;

  // ── Tags ──────────────────────────────────────────────────────────────

  /// Look the name up and create it only on a miss. Never produces a
  /// duplicate name.
  fn create_or_get_tag(
    &self,
    name: String,
  ) -> impl Future<Output = Result<Tag, Self::Error>> + Send + '_;

  /// Idempotent; returns `true` only when a new link row was written.
  fn tag_fragment(
    &self,
    fragment_id: i64,
    tag_id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// All tags with their document counts, by name.
  fn list_tags(&self) -> impl Future<Output = Result<Vec<TagCount>, Self::Error>> + Send + '_;

  // ── Documents ─────────────────────────────────────────────────────────

  /// Insert the document and its fragment/tag links in one transaction.
  /// Ids that do not resolve are skipped.
  fn create_document(
    &self,
    input: NewDocument,
  ) -> impl Future<Output = Result<LinkedDocument, Self::Error>> + Send + '_;

  /// Idempotent; returns `true` only when a new link row was written.
  fn link_fragment(
    &self,
    document_id: i64,
    fragment_id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Idempotent; returns `true` only when a new link row was written.
  fn link_tag(
    &self,
    document_id: i64,
    tag_id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn get_document(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + '_;

  /// Resolve by id first; fall back to an exact title match (newest version
  /// wins when several documents share a title).
  fn find_document(
    &self,
    reference: DocumentRef,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + '_;

  fn document_detail(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<DocumentDetail>, Self::Error>> + Send + '_;

  /// Overwrite title, summary and content. The version stamp is unchanged.
  fn update_document(
    &self,
    id: i64,
    revision: DocumentRevision,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + '_;

  /// All documents, newest version first.
  fn list_documents(&self) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + '_;

  fn documents_by_tag(
    &self,
    tag_name: String,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + '_;

  /// Substring match over title, summary and content.
  fn search_documents(
    &self,
    term: String,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + '_;

  fn latest_version(
    &self,
  ) -> impl Future<Output = Result<Option<VersionStamp>, Self::Error>> + Send + '_;

  /// Distinct version stamps, newest first.
  fn list_versions(
    &self,
  ) -> impl Future<Output = Result<Vec<VersionStamp>, Self::Error>> + Send + '_;

  /// Documents carrying exactly `version`, in id order, with links loaded.
  fn documents_in_version(
    &self,
    version: VersionStamp,
  ) -> impl Future<Output = Result<Vec<DocumentDetail>, Self::Error>> + Send + '_;

  // ── Questions ─────────────────────────────────────────────────────────

  fn add_question(
    &self,
    input: NewQuestion,
  ) -> impl Future<Output = Result<Question, Self::Error>> + Send + '_;

  fn get_question(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Question>, Self::Error>> + Send + '_;

  /// Newest first.
  fn list_questions(
    &self,
    pending_only: bool,
  ) -> impl Future<Output = Result<Vec<Question>, Self::Error>> + Send + '_;

  /// Record `answer_text` as a new fragment and mark the question answered,
  /// in one transaction. Only a pending question can be answered.
  fn answer_question(
    &self,
    id: i64,
    answer_text: String,
  ) -> impl Future<Output = Result<(Question, Fragment), Self::Error>> + Send + '_;

  /// Move a pending question to `archived`.
  fn archive_question(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Question, Self::Error>> + Send + '_;

  // ── Bulk ──────────────────────────────────────────────────────────────

  /// Delete every document with its links, plus tags no longer attached to a
  /// fragment. Fragments and questions remain.
  fn reset_documents(&self) -> impl Future<Output = Result<ClearSummary, Self::Error>> + Send + '_;

  /// Delete everything.
  fn clear_all(&self) -> impl Future<Output = Result<ClearSummary, Self::Error>> + Send + '_;

  fn status(&self) -> impl Future<Output = Result<StoreStatus, Self::Error>> + Send + '_;
}
