//! QA Context Assembler.
//!
//! Every mode only reads. The context builders are plain functions of their
//! inputs so the exact text handed to the generator can be tested directly.

use std::{collections::BTreeMap, fmt::Write as _};

use serde::Serialize;
use tracing::{debug, info};

use insight_core::{
  Generator, document::DocumentDetail, error::require_text, store::KnowledgeStore,
};

use crate::{Engine, Error, QaLimits, Result, error::store_err, prompt};

/// Answer given when there are no documents to answer from.
pub const NO_INFORMATION: &str = "No documents are available yet, so there is no information to \
                                  answer from.";

/// Provenance label added when web search was allowed.
pub const WEB_SEARCH_SOURCE: &str = "Web search results (when available)";

/// Which documents a question is answered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AskScope {
  /// The most recent version batch.
  Latest,
  /// One document, in full.
  Document(i64),
  /// Documents whose title, summary or content contain a term.
  Matching(String),
}

/// Answer given when a search term matches no document.
pub fn no_matches(term: &str) -> String { format!("No documents match \"{}\".", term.trim()) }

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QaResponse {
  pub answer:     String,
  pub sources:    Vec<String>,
  #[serde(rename = "web_search_used")]
  pub web_search: bool,
}

// ─── Context ─────────────────────────────────────────────────────────────────

/// At most `max` characters of `s`, with `...` appended when cut.
fn truncate_chars(s: &str, max: usize) -> String {
  match s.char_indices().nth(max) {
    Some((at, _)) => format!("{}...", &s[..at]),
    None => s.to_owned(),
  }
}

/// One document in full, with its fragments and tags.
pub fn scoped_context(detail: &DocumentDetail) -> String {
  let doc = &detail.document;
  let mut out = format!(
    "=== Document Information ===\nTitle: {}\nSummary: {}\n\n=== Content ===\n{}\n\n=== Related Fragments ===\n",
    doc.title, doc.summary, doc.content
  );
  for (i, fragment) in detail.fragments.iter().enumerate() {
    let _ = writeln!(out, "Fragment {}: {}", i + 1, fragment.content);
  }
  if !detail.tags.is_empty() {
    out.push_str("\n=== Tags ===\n");
    for tag in &detail.tags {
      let _ = writeln!(out, "- {}", tag.name);
    }
  }
  out
}

/// The latest generation: the first `max_documents` rendered with truncated
/// content, a count for the rest, then tag frequencies over every document.
pub fn global_context(documents: &[DocumentDetail], limits: &QaLimits) -> String {
  let out = format!(
    "=== Latest Version Document Collection ===\nDocuments in latest version: {}\n\n",
    documents.len()
  );
  render_collection(out, documents, limits)
}

/// Documents found by a search term, under the same limits as
/// [`global_context`].
pub fn matching_context(term: &str, documents: &[DocumentDetail], limits: &QaLimits) -> String {
  let out = format!(
    "=== Documents Matching \"{}\" ===\nMatching documents: {}\n\n",
    term.trim(),
    documents.len()
  );
  render_collection(out, documents, limits)
}

fn render_collection(mut out: String, documents: &[DocumentDetail], limits: &QaLimits) -> String {
  for (i, detail) in documents.iter().take(limits.max_documents).enumerate() {
    let doc = &detail.document;
    let _ = writeln!(out, "=== Document {}: {} ===", i + 1, doc.title);
    let _ = writeln!(out, "Summary: {}", doc.summary);
    if !detail.tags.is_empty() {
      let _ = writeln!(out, "Tags: {}", detail.tag_names().join(", "));
    }
    let _ = writeln!(out, "Content: {}\n", truncate_chars(&doc.content, limits.max_content_chars));
  }
  if documents.len() > limits.max_documents {
    let _ = writeln!(out, "... and {} more documents", documents.len() - limits.max_documents);
  }

  let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
  for name in documents.iter().flat_map(|d| d.tag_names()) {
    *counts.entry(name).or_default() += 1;
  }
  if !counts.is_empty() {
    let mut counts: Vec<_> = counts.into_iter().collect();
    // BTreeMap order is by name; a stable sort keeps it within equal counts.
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    out.push_str("=== Available Tags ===\n");
    for (name, n) in counts {
      let _ = writeln!(out, "- {name} ({n} documents)");
    }
    out.push('\n');
  }
  out
}

fn collection_sources(documents: &[DocumentDetail], limits: &QaLimits) -> Vec<String> {
  documents
    .iter()
    .take(limits.max_documents)
    .map(|d| format!("Document: {}", d.document.title))
    .collect()
}

fn with_web_marker(mut sources: Vec<String>, use_web_search: bool) -> Vec<String> {
  if use_web_search {
    sources.push(WEB_SEARCH_SOURCE.to_owned());
  }
  sources
}

// ─── Engine ──────────────────────────────────────────────────────────────────

impl<S, G> Engine<S, G>
where
  S: KnowledgeStore,
  G: Generator,
{
  /// Answer from one document. A missing document is an error and the
  /// generator is never called.
  pub async fn ask_document(
    &self,
    document_id: i64,
    question: &str,
    use_web_search: bool,
  ) -> Result<QaResponse> {
    require_text("question", question)?;
    let detail = self
      .store
      .document_detail(document_id)
      .await
      .map_err(store_err)?
      .ok_or_else(|| Error::DocumentNotFound(format!("#{document_id}")))?;

    let context = scoped_context(&detail);
    let prompt = prompt::answer(question.trim(), &context, use_web_search);
    debug!(document_id, context_chars = context.len(), "asking about one document");
    let answer = self.generate_text(&prompt, use_web_search).await?;

    Ok(QaResponse {
      answer,
      sources: with_web_marker(vec![format!("Document: {}", detail.document.title)], use_web_search),
      web_search: use_web_search,
    })
  }

  /// Answer from the latest generation only. With no documents at all the
  /// answer is [`NO_INFORMATION`] and the generator is never called.
  pub async fn ask_latest(&self, question: &str, use_web_search: bool) -> Result<QaResponse> {
    require_text("question", question)?;
    let no_information = || QaResponse {
      answer:     NO_INFORMATION.to_owned(),
      sources:    Vec::new(),
      web_search: false,
    };

    let Some(version) = self.store.latest_version().await.map_err(store_err)? else {
      return Ok(no_information());
    };
    let documents = self.store.documents_in_version(version).await.map_err(store_err)?;
    if documents.is_empty() {
      return Ok(no_information());
    }
    info!(%version, documents = documents.len(), "asking about the latest version");

    let context = global_context(&documents, &self.config.qa);
    let prompt = prompt::answer(question.trim(), &context, use_web_search);
    let answer = self.generate_text(&prompt, use_web_search).await?;

    let sources = collection_sources(&documents, &self.config.qa);
    Ok(QaResponse {
      answer,
      sources: with_web_marker(sources, use_web_search),
      web_search: use_web_search,
    })
  }

  /// Answer from the documents matching `term`, across every version. When
  /// nothing matches the answer is [`no_matches`] and the generator is never
  /// called.
  pub async fn ask_matching(
    &self,
    term: &str,
    question: &str,
    use_web_search: bool,
  ) -> Result<QaResponse> {
    require_text("question", question)?;
    require_text("search term", term)?;

    let found = self.store.search_documents(term.trim().to_owned()).await.map_err(store_err)?;
    let mut documents = Vec::with_capacity(found.len());
    for doc in found {
      if let Some(detail) = self.store.document_detail(doc.document_id).await.map_err(store_err)? {
        documents.push(detail);
      }
    }
    if documents.is_empty() {
      debug!(term, "no documents match");
      return Ok(QaResponse { answer: no_matches(term), sources: Vec::new(), web_search: false });
    }
    info!(term, documents = documents.len(), "asking about matching documents");

    let context = matching_context(term, &documents, &self.config.qa);
    let prompt = prompt::answer(question.trim(), &context, use_web_search);
    let answer = self.generate_text(&prompt, use_web_search).await?;

    let sources = collection_sources(&documents, &self.config.qa);
    Ok(QaResponse {
      answer,
      sources: with_web_marker(sources, use_web_search),
      web_search: use_web_search,
    })
  }

  pub async fn ask(
    &self,
    question: &str,
    scope: AskScope,
    use_web_search: bool,
  ) -> Result<QaResponse> {
    match scope {
      AskScope::Latest => self.ask_latest(question, use_web_search).await,
      AskScope::Document(id) => self.ask_document(id, question, use_web_search).await,
      AskScope::Matching(term) => self.ask_matching(&term, question, use_web_search).await,
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone as _, Utc};
  use insight_core::{VersionStamp, document::Document, tag::Tag};

  use super::*;

  fn detail(id: i64, title: &str, content: &str, tags: &[&str]) -> DocumentDetail {
    let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    DocumentDetail {
      document:  Document {
        document_id: id,
        title:       title.into(),
        summary:     format!("{title} summary"),
        content:     content.into(),
        version:     VersionStamp::from_datetime(at),
        created_at:  at,
        updated_at:  at,
      },
      fragments: Vec::new(),
      tags:      tags
        .iter()
        .enumerate()
        .map(|(i, n)| Tag { tag_id: i as i64, name: (*n).into(), color: None })
        .collect(),
    }
  }

  #[test]
  fn truncation_respects_char_boundaries() {
    assert_eq!(truncate_chars("héllo wörld", 5), "héllo...");
    assert_eq!(truncate_chars("short", 5), "short");
  }

  #[test]
  fn global_context_caps_documents_and_counts_the_rest() {
    let docs: Vec<_> = (1..=4).map(|i| detail(i, &format!("Doc {i}"), "body", &[])).collect();
    let limits = QaLimits { max_documents: 2, max_content_chars: 500 };
    let ctx = global_context(&docs, &limits);

    assert!(ctx.contains("Documents in latest version: 4"));
    assert!(ctx.contains("=== Document 2: Doc 2 ==="));
    assert!(!ctx.contains("Doc 3 ==="));
    assert!(ctx.contains("... and 2 more documents"));
  }

  #[test]
  fn global_context_truncates_content_and_sorts_tag_stats() {
    let docs = vec![
      detail(1, "A", &"x".repeat(600), &["rust", "async"]),
      detail(2, "B", "short", &["rust"]),
    ];
    let ctx = global_context(&docs, &QaLimits::default());

    assert!(ctx.contains(&format!("Content: {}...", "x".repeat(500))));
    let rust = ctx.find("- rust (2 documents)").unwrap();
    let asynk = ctx.find("- async (1 documents)").unwrap();
    assert!(rust < asynk);
  }

  #[test]
  fn matching_context_names_the_term_and_shares_the_limits() {
    let docs: Vec<_> = (1..=3).map(|i| detail(i, &format!("Doc {i}"), "body", &["rust"])).collect();
    let limits = QaLimits { max_documents: 1, max_content_chars: 500 };
    let ctx = matching_context(" ownership ", &docs, &limits);

    assert!(ctx.starts_with("=== Documents Matching \"ownership\" ===\nMatching documents: 3"));
    assert!(ctx.contains("=== Document 1: Doc 1 ==="));
    assert!(ctx.contains("... and 2 more documents"));
    assert!(ctx.contains("- rust (3 documents)"));
  }

  #[test]
  fn scoped_context_lists_fragments_and_tags() {
    let mut d = detail(1, "Cats", "All about cats.", &["pets"]);
    let at = d.document.created_at;
    d.fragments.push(insight_core::fragment::Fragment {
      fragment_id: 7,
      content:     "cats purr".into(),
      created_at:  at,
      updated_at:  at,
    });
    let ctx = scoped_context(&d);
    assert!(ctx.contains("Title: Cats"));
    assert!(ctx.contains("Fragment 1: cats purr"));
    assert!(ctx.contains("- pets"));
  }
}
