//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{TimeZone as _, Utc};
use insight_core::{
  document::{DocumentRef, DocumentRevision, NewDocument},
  fragment::{FragmentFilter, NewFragment, RemovalKind},
  question::{AnswerRecord, NewQuestion, QuestionStatus},
  store::KnowledgeStore,
  VersionStamp,
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn stamp(second: u32) -> VersionStamp {
  VersionStamp::from_datetime(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, second).unwrap())
}

fn new_document(title: &str, version: VersionStamp, fragment_ids: Vec<i64>) -> NewDocument {
  NewDocument {
    title: title.into(),
    summary: format!("{title} summary"),
    content: format!("# {title}\n\nBody."),
    version,
    fragment_ids,
    tag_ids: Vec::new(),
  }
}

/// Create a document backed by a fresh fragment.
async fn create_backed(
  s: &SqliteStore,
  mut input: NewDocument,
) -> insight_core::document::LinkedDocument {
  let f = s.add_fragment(NewFragment::new(format!("source for {}", input.title))).await.unwrap();
  input.fragment_ids = vec![f.fragment_id];
  s.create_document(input).await.unwrap()
}

// ─── Fragments ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_fragment() {
  let s = store().await;

  let f = s.add_fragment(NewFragment::new("rust is fun")).await.unwrap();
  assert_eq!(f.content, "rust is fun");

  let fetched = s.get_fragment(f.fragment_id).await.unwrap().unwrap();
  assert_eq!(fetched, f);
}

#[tokio::test]
async fn empty_fragment_is_rejected_and_nothing_is_written() {
  let s = store().await;

  let err = s.add_fragment(NewFragment::new("   ")).await.unwrap_err();
  assert!(matches!(err, Error::Core(insight_core::Error::EmptyField(_))));
  assert_eq!(s.status().await.unwrap().fragments, 0);
}

#[tokio::test]
async fn fragment_tags_are_created_once() {
  let s = store().await;

  let mut input = NewFragment::new("tagged");
  input.tags = vec!["rust".into(), " rust ".into(), "".into(), "async".into()];
  let f = s.add_fragment(input).await.unwrap();

  let tags = s.fragment_tags(f.fragment_id).await.unwrap();
  let names: Vec<_> = tags.iter().map(|t| t.name.as_str()).collect();
  assert_eq!(names, ["async", "rust"]);
  assert!(tags.iter().all(|t| t.color.is_some()));
}

#[tokio::test]
async fn unlinked_filter_excludes_linked_fragments() {
  let s = store().await;

  let a = s.add_fragment(NewFragment::new("a")).await.unwrap();
  let b = s.add_fragment(NewFragment::new("b")).await.unwrap();
  let c = s.add_fragment(NewFragment::new("c")).await.unwrap();

  s.create_document(new_document("Doc", stamp(0), vec![b.fragment_id])).await.unwrap();

  let unlinked: Vec<_> = s
    .list_fragments(FragmentFilter::Unlinked)
    .await
    .unwrap()
    .into_iter()
    .map(|f| f.fragment_id)
    .collect();
  assert_eq!(unlinked, [a.fragment_id, c.fragment_id]);

  let all = s.list_fragments(FragmentFilter::All).await.unwrap();
  assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn delete_fragments_logs_removals_and_unlinks() {
  let s = store().await;

  let a = s.add_fragment(NewFragment::new("a")).await.unwrap();
  let b = s.add_fragment(NewFragment::new("b")).await.unwrap();
  let doc = s
    .create_document(new_document("Doc", stamp(0), vec![a.fragment_id, b.fragment_id]))
    .await
    .unwrap();

  let removals = s
    .delete_fragments(vec![a.fragment_id], Some("stale".into()))
    .await
    .unwrap();
  assert_eq!(removals.len(), 1);
  assert_eq!(removals[0].kind, RemovalKind::Deleted);
  assert_eq!(removals[0].content, "a");

  assert!(s.get_fragment(a.fragment_id).await.unwrap().is_none());
  let detail = s.document_detail(doc.document.document_id).await.unwrap().unwrap();
  assert_eq!(detail.fragments.len(), 1);
  assert_eq!(detail.fragments[0].fragment_id, b.fragment_id);

  let log = s.list_removals().await.unwrap();
  assert_eq!(log.len(), 1);
  assert_eq!(log[0].reason.as_deref(), Some("stale"));
}

#[tokio::test]
async fn delete_with_unknown_id_removes_nothing() {
  let s = store().await;

  let a = s.add_fragment(NewFragment::new("a")).await.unwrap();
  let err = s.delete_fragments(vec![a.fragment_id, 999], None).await.unwrap_err();
  assert!(matches!(err, Error::FragmentNotFound(999)));

  assert!(s.get_fragment(a.fragment_id).await.unwrap().is_some());
  assert!(s.list_removals().await.unwrap().is_empty());
}

#[tokio::test]
async fn merge_rewrites_first_and_removes_rest() {
  let s = store().await;

  let a = s.add_fragment(NewFragment::new("cats purr")).await.unwrap();
  let b = s.add_fragment(NewFragment::new("cats meow")).await.unwrap();
  let c = s.add_fragment(NewFragment::new("cats sleep")).await.unwrap();

  let removals = s
    .merge_fragments(
      vec![a.fragment_id, b.fragment_id, c.fragment_id],
      "cats purr, meow and sleep".into(),
      Some("duplicates".into()),
    )
    .await
    .unwrap();

  assert_eq!(removals.len(), 2);
  assert!(removals.iter().all(|r| r.kind == RemovalKind::Merged));
  assert!(removals.iter().all(|r| r.merged_into == Some(a.fragment_id)));

  let kept = s.get_fragment(a.fragment_id).await.unwrap().unwrap();
  assert_eq!(kept.content, "cats purr, meow and sleep");
  assert_eq!(s.list_fragments(FragmentFilter::All).await.unwrap().len(), 1);
}

#[tokio::test]
async fn merge_with_missing_id_rolls_back() {
  let s = store().await;

  let a = s.add_fragment(NewFragment::new("a")).await.unwrap();
  let b = s.add_fragment(NewFragment::new("b")).await.unwrap();

  let err = s
    .merge_fragments(vec![a.fragment_id, b.fragment_id, 404], "ab".into(), None)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::FragmentNotFound(404)));

  assert_eq!(s.get_fragment(a.fragment_id).await.unwrap().unwrap().content, "a");
  assert!(s.get_fragment(b.fragment_id).await.unwrap().is_some());
}

// ─── Tags and links ──────────────────────────────────────────────────────────

#[tokio::test]
async fn create_or_get_tag_is_idempotent() {
  let s = store().await;

  let first = s.create_or_get_tag("science".into()).await.unwrap();
  let second = s.create_or_get_tag("  science ".into()).await.unwrap();
  assert_eq!(first.tag_id, second.tag_id);
  assert_eq!(s.list_tags().await.unwrap().len(), 1);
}

#[tokio::test]
async fn links_are_idempotent() {
  let s = store().await;

  let f = s.add_fragment(NewFragment::new("x")).await.unwrap();
  let tag = s.create_or_get_tag("t".into()).await.unwrap();
  let doc = create_backed(&s, new_document("Doc", stamp(0), Vec::new())).await;
  let id = doc.document.document_id;

  assert!(s.link_fragment(id, f.fragment_id).await.unwrap());
  assert!(!s.link_fragment(id, f.fragment_id).await.unwrap());
  assert!(s.link_tag(id, tag.tag_id).await.unwrap());
  assert!(!s.link_tag(id, tag.tag_id).await.unwrap());

  let detail = s.document_detail(id).await.unwrap().unwrap();
  assert_eq!(detail.fragments.len(), 2);
  assert_eq!(detail.tags.len(), 1);
}

#[tokio::test]
async fn link_to_missing_document_is_not_found() {
  let s = store().await;
  let f = s.add_fragment(NewFragment::new("x")).await.unwrap();

  let err = s.link_fragment(77, f.fragment_id).await.unwrap_err();
  assert!(matches!(err, Error::DocumentNotFound(77)));
}

#[tokio::test]
async fn create_document_skips_unknown_and_duplicate_ids() {
  let s = store().await;

  let f = s.add_fragment(NewFragment::new("x")).await.unwrap();
  let tag = s.create_or_get_tag("t".into()).await.unwrap();

  let mut input = new_document("Doc", stamp(0), vec![f.fragment_id, 555, f.fragment_id]);
  input.tag_ids = vec![tag.tag_id, 888];
  let linked = s.create_document(input).await.unwrap();

  assert_eq!(linked.fragment_ids, [f.fragment_id]);
  assert_eq!(linked.tag_ids, [tag.tag_id]);

  let counts = s.list_tags().await.unwrap();
  assert_eq!(counts[0].document_count, 1);
}

#[tokio::test]
async fn document_without_resolvable_fragments_is_rolled_back() {
  let s = store().await;
  let tag = s.create_or_get_tag("t".into()).await.unwrap();

  let mut input = new_document("Ghost", stamp(0), vec![999, 1000]);
  input.tag_ids = vec![tag.tag_id];
  let err = s.create_document(input).await.unwrap_err();
  assert!(matches!(err, Error::Core(insight_core::Error::NoSourceFragments)));

  let err = s.create_document(new_document("Empty", stamp(0), Vec::new())).await.unwrap_err();
  assert!(matches!(err, Error::Core(insight_core::Error::NoSourceFragments)));

  assert!(s.list_documents().await.unwrap().is_empty());
  assert_eq!(s.list_tags().await.unwrap()[0].document_count, 0);
  assert_eq!(s.latest_version().await.unwrap(), None);
}

// ─── Documents and versions ──────────────────────────────────────────────────

#[tokio::test]
async fn version_stamp_round_trips_exactly() {
  let s = store().await;

  let version = VersionStamp::from_datetime(
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap() + chrono::TimeDelta::microseconds(123_456),
  );
  let doc = create_backed(&s, new_document("Doc", version, Vec::new())).await;

  let fetched = s.get_document(doc.document.document_id).await.unwrap().unwrap();
  assert_eq!(fetched.version, version);
  assert_eq!(s.latest_version().await.unwrap(), Some(version));
}

#[tokio::test]
async fn documents_in_version_returns_only_that_batch() {
  let s = store().await;

  create_backed(&s, new_document("Old", stamp(1), Vec::new())).await;
  create_backed(&s, new_document("New A", stamp(2), Vec::new())).await;
  create_backed(&s, new_document("New B", stamp(2), Vec::new())).await;

  assert_eq!(s.list_versions().await.unwrap(), [stamp(2), stamp(1)]);

  let latest = s.latest_version().await.unwrap().unwrap();
  let docs = s.documents_in_version(latest).await.unwrap();
  let titles: Vec<_> = docs.iter().map(|d| d.document.title.as_str()).collect();
  assert_eq!(titles, ["New A", "New B"]);
}

#[tokio::test]
async fn find_document_by_id_then_title() {
  let s = store().await;

  let old = create_backed(&s, new_document("Rust", stamp(1), Vec::new())).await;
  let new = create_backed(&s, new_document("Rust", stamp(2), Vec::new())).await;

  let by_id = s.find_document(DocumentRef::Id(old.document.document_id)).await.unwrap().unwrap();
  assert_eq!(by_id.document_id, old.document.document_id);

  let by_title = s.find_document(DocumentRef::Title("Rust".into())).await.unwrap().unwrap();
  assert_eq!(by_title.document_id, new.document.document_id);

  assert!(s.find_document(DocumentRef::Title("Go".into())).await.unwrap().is_none());
}

#[tokio::test]
async fn update_document_keeps_version() {
  let s = store().await;

  let doc = create_backed(&s, new_document("Doc", stamp(5), Vec::new())).await;
  let id = doc.document.document_id;

  let updated = s
    .update_document(id, DocumentRevision {
      title:   "Doc v2".into(),
      summary: "new summary".into(),
      content: "new body".into(),
    })
    .await
    .unwrap()
    .unwrap();

  assert_eq!(updated.title, "Doc v2");
  assert_eq!(updated.version, stamp(5));
  assert!(s.update_document(999, DocumentRevision {
    title:   "x".into(),
    summary: "y".into(),
    content: "z".into(),
  })
  .await
  .unwrap()
  .is_none());
}

#[tokio::test]
async fn search_and_tag_filters() {
  let s = store().await;

  let tag = s.create_or_get_tag("lang".into()).await.unwrap();
  let mut input = new_document("Rust Ownership", stamp(0), Vec::new());
  input.tag_ids = vec![tag.tag_id];
  create_backed(&s, input).await;
  create_backed(&s, new_document("Gardening", stamp(0), Vec::new())).await;

  let found = s.search_documents("ownership".into()).await.unwrap();
  assert_eq!(found.len(), 1);
  assert!(s.search_documents("100%".into()).await.unwrap().is_empty());

  let tagged = s.documents_by_tag("lang".into()).await.unwrap();
  assert_eq!(tagged.len(), 1);
  assert_eq!(tagged[0].title, "Rust Ownership");
}

// ─── Questions ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn answering_a_question_records_a_fragment() {
  let s = store().await;

  let q = s
    .add_question(NewQuestion {
      question_text:        "What does the cat eat?".into(),
      context_fragment_ids: vec![1, 2],
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(q.status, QuestionStatus::Pending);
  assert_eq!(q.context_fragment_ids, [1, 2]);
  assert!(q.context_document_ids.is_empty());

  let (answered, fragment) = s.answer_question(q.question_id, "Fish".into()).await.unwrap();
  assert_eq!(answered.status, QuestionStatus::Answered);
  assert_eq!(answered.answer_fragment_id, Some(fragment.fragment_id));
  assert!(answered.answered_at.is_some());

  let record: AnswerRecord = serde_json::from_str(&fragment.content).unwrap();
  assert_eq!(record.kind, "answer");
  assert_eq!(record.text, "Fish");
  assert_eq!(record.question_id, q.question_id.to_string());

  // The answer fragment is unlinked, so the next synthesis run picks it up.
  let unlinked = s.list_fragments(FragmentFilter::Unlinked).await.unwrap();
  assert_eq!(unlinked.len(), 1);

  let err = s.answer_question(q.question_id, "Again".into()).await.unwrap_err();
  assert!(matches!(err, Error::Core(insight_core::Error::QuestionAlreadyResolved(_))));
  assert_eq!(s.list_fragments(FragmentFilter::All).await.unwrap().len(), 1);
}

#[tokio::test]
async fn pending_filter_and_archive() {
  let s = store().await;

  let a = s
    .add_question(NewQuestion { question_text: "a?".into(), ..Default::default() })
    .await
    .unwrap();
  s.add_question(NewQuestion { question_text: "b?".into(), ..Default::default() })
    .await
    .unwrap();

  let archived = s.archive_question(a.question_id).await.unwrap();
  assert_eq!(archived.status, QuestionStatus::Archived);

  let pending = s.list_questions(true).await.unwrap();
  assert_eq!(pending.len(), 1);
  assert_eq!(pending[0].question_text, "b?");
  assert_eq!(s.list_questions(false).await.unwrap().len(), 2);

  assert!(matches!(s.archive_question(404).await.unwrap_err(), Error::QuestionNotFound(404)));
}

// ─── Bulk ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reset_keeps_fragments_and_their_tags() {
  let s = store().await;

  let mut input = NewFragment::new("x");
  input.tags = vec!["kept".into()];
  let f = s.add_fragment(input).await.unwrap();
  let doc_tag = s.create_or_get_tag("doc-only".into()).await.unwrap();

  let mut doc = new_document("Doc", stamp(0), vec![f.fragment_id]);
  doc.tag_ids = vec![doc_tag.tag_id];
  s.create_document(doc).await.unwrap();

  let summary = s.reset_documents().await.unwrap();
  assert_eq!(summary.documents, 1);
  assert_eq!(summary.tags, 1);

  let status = s.status().await.unwrap();
  assert_eq!(status.documents, 0);
  assert_eq!(status.fragments, 1);
  assert_eq!(status.unlinked_fragments, 1);
  assert_eq!(status.tags, 1);
  assert_eq!(status.versions, 0);
}

#[tokio::test]
async fn clear_removes_everything() {
  let s = store().await;

  let f = s.add_fragment(NewFragment::new("x")).await.unwrap();
  s.create_document(new_document("Doc", stamp(0), vec![f.fragment_id])).await.unwrap();
  s.add_question(NewQuestion { question_text: "q?".into(), ..Default::default() })
    .await
    .unwrap();

  let summary = s.clear_all().await.unwrap();
  assert_eq!(summary.documents, 1);
  assert_eq!(summary.fragments, 1);
  assert_eq!(summary.questions, 1);

  assert_eq!(s.status().await.unwrap(), Default::default());
}
