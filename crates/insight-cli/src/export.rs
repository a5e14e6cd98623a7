//! Markdown export: one file per document.

use std::{
  collections::HashSet,
  fmt::Write as _,
  path::{Path, PathBuf},
};

use anyhow::Context as _;
use insight_core::{document::DocumentDetail, store::KnowledgeStore};
use tracing::warn;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const MAX_FILENAME_CHARS: usize = 100;

/// A file-system-safe stem for `title`.
pub fn sanitize_filename(title: &str) -> String {
  let replaced: String = title
    .chars()
    .map(|c| if matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') { '_' } else { c })
    .collect();

  // Collapse runs of whitespace and underscores into one underscore.
  let mut collapsed = String::with_capacity(replaced.len());
  let mut in_run = false;
  for c in replaced.chars() {
    if c.is_whitespace() || c == '_' {
      if !in_run {
        collapsed.push('_');
      }
      in_run = true;
    } else {
      collapsed.push(c);
      in_run = false;
    }
  }

  let trimmed: String = collapsed
    .trim_matches(|c| matches!(c, '.' | '_' | '-' | ' '))
    .chars()
    .take(MAX_FILENAME_CHARS)
    .collect();
  if trimmed.is_empty() { "untitled".to_string() } else { trimmed }
}

pub fn render_markdown(detail: &DocumentDetail) -> String {
  let doc = &detail.document;
  let mut out = format!("# {}\n\n## Document Information\n\n", doc.title);
  let _ = writeln!(out, "- **ID:** {}", doc.document_id);
  let _ = writeln!(out, "- **Version:** {}", doc.version);
  let _ = writeln!(out, "- **Created:** {}", doc.created_at.format(DATE_FORMAT));
  let _ = writeln!(out, "- **Updated:** {}", doc.updated_at.format(DATE_FORMAT));
  if !doc.summary.is_empty() {
    let _ = writeln!(out, "- **Summary:** {}", doc.summary);
  }
  if !detail.tags.is_empty() {
    let _ = writeln!(out, "- **Tags:** {}", detail.tag_names().join(", "));
  }

  let _ = write!(out, "\n## Content\n\n{}\n\n", doc.content);

  if !detail.fragments.is_empty() {
    out.push_str("## Source Fragments\n\n");
    for fragment in &detail.fragments {
      let _ = writeln!(
        out,
        "- **Fragment {}** ({}): {}",
        fragment.fragment_id,
        fragment.created_at.format(DATE_FORMAT),
        fragment.content
      );
    }
    out.push('\n');
  }
  out
}

/// Write every document under `dir`, creating it if needed. A document that
/// fails to export is logged and skipped. Documents sharing a title get their
/// id appended so no file is overwritten.
pub async fn export_documents<S>(store: &S, dir: &Path) -> anyhow::Result<Vec<PathBuf>>
where
  S: KnowledgeStore,
{
  tokio::fs::create_dir_all(dir)
    .await
    .with_context(|| format!("failed to create output directory {}", dir.display()))?;

  let documents = store.list_documents().await.context("failed to list documents")?;
  let mut used = HashSet::new();
  let mut written = Vec::with_capacity(documents.len());

  for doc in documents {
    let detail = match store.document_detail(doc.document_id).await {
      Ok(Some(detail)) => detail,
      Ok(None) => continue,
      Err(e) => {
        warn!(document_id = doc.document_id, error = %e, "failed to load document for export");
        continue;
      }
    };

    let mut stem = sanitize_filename(&doc.title);
    if !used.insert(stem.clone()) {
      stem = format!("{stem}_{}", doc.document_id);
      used.insert(stem.clone());
    }
    let path = dir.join(format!("{stem}.md"));

    match tokio::fs::write(&path, render_markdown(&detail)).await {
      Ok(()) => written.push(path),
      Err(e) => warn!(document_id = doc.document_id, path = %path.display(), error = %e, "export failed"),
    }
  }
  Ok(written)
}

#[cfg(test)]
mod tests {
  use insight_core::{
    VersionStamp,
    document::NewDocument,
    fragment::NewFragment,
  };
  use insight_store_sqlite::SqliteStore;

  use super::*;

  #[test]
  fn unsafe_characters_are_replaced_and_runs_collapsed() {
    assert_eq!(sanitize_filename("What/is: Rust?"), "What_is_Rust");
    assert_eq!(sanitize_filename("  a   __ b  "), "a_b");
    assert_eq!(sanitize_filename("..."), "untitled");
    assert_eq!(sanitize_filename(&"é".repeat(150)).chars().count(), 100);
  }

  async fn store_with_documents(titles: &[&str]) -> SqliteStore {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let fragment = store.add_fragment(NewFragment::new("cats purr")).await.unwrap();
    let tag = store.create_or_get_tag("pets".into()).await.unwrap();
    for title in titles {
      store
        .create_document(NewDocument {
          title:        (*title).into(),
          summary:      "About cats.".into(),
          content:      "Cats purr when content.".into(),
          version:      VersionStamp::from_datetime(chrono::Utc::now()),
          fragment_ids: vec![fragment.fragment_id],
          tag_ids:      vec![tag.tag_id],
        })
        .await
        .unwrap();
    }
    store
  }

  #[tokio::test]
  async fn export_writes_one_markdown_file_per_document() {
    let store = store_with_documents(&["Cats: an overview"]).await;
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("exports");

    let written = export_documents(&store, &out).await.unwrap();

    assert_eq!(written, [out.join("Cats_an_overview.md")]);
    let text = std::fs::read_to_string(&written[0]).unwrap();
    assert!(text.starts_with("# Cats: an overview\n"));
    assert!(text.contains("- **Tags:** pets"));
    assert!(text.contains("## Source Fragments"));
    assert!(text.contains("cats purr"));
  }

  #[tokio::test]
  async fn shared_titles_do_not_overwrite_each_other() {
    let store = store_with_documents(&["Cats", "Cats"]).await;
    let dir = tempfile::tempdir().unwrap();

    let written = export_documents(&store, dir.path()).await.unwrap();

    assert_eq!(written.len(), 2);
    assert_ne!(written[0], written[1]);
  }
}
