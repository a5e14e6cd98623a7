//! Documents: synthesized artifacts built from one or more fragments.
//!
//! Every document belongs to exactly one version batch: the
//! [`VersionStamp`] of the synthesis run that created it. Refreshing a
//! document rewrites its text in place and keeps its stamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result, error::require_text, fragment::Fragment, tag::Tag, version::VersionStamp,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
  pub document_id: i64,
  pub title:       String,
  pub summary:     String,
  /// Markdown body.
  pub content:     String,
  pub version:     VersionStamp,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

/// A document with its source fragments and tags loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentDetail {
  #[serde(flatten)]
  pub document:  Document,
  /// Linked fragments in creation order.
  pub fragments: Vec<Fragment>,
  /// Linked tags in name order.
  pub tags:      Vec<Tag>,
}

impl DocumentDetail {
  pub fn tag_names(&self) -> Vec<&str> { self.tags.iter().map(|t| t.name.as_str()).collect() }
}

/// Input for [`KnowledgeStore::create_document`](crate::store::KnowledgeStore::create_document).
///
/// The document row and all of its links are written in one transaction.
/// Fragment or tag ids that do not resolve are skipped, not treated as errors.
#[derive(Debug, Clone)]
pub struct NewDocument {
  pub title:        String,
  pub summary:      String,
  pub content:      String,
  pub version:      VersionStamp,
  pub fragment_ids: Vec<i64>,
  pub tag_ids:      Vec<i64>,
}

impl NewDocument {
  pub fn validate(&self) -> Result<()> {
    require_text("document title", &self.title)?;
    require_text("document summary", &self.summary)?;
    require_text("document content", &self.content)?;
    if self.fragment_ids.is_empty() {
      return Err(Error::NoSourceFragments);
    }
    Ok(())
  }
}

/// A document as persisted, with the links that were actually written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedDocument {
  pub document:     Document,
  pub fragment_ids: Vec<i64>,
  pub tag_ids:      Vec<i64>,
}

/// Replacement text for an in-place document refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRevision {
  pub title:   String,
  pub summary: String,
  pub content: String,
}

impl DocumentRevision {
  pub fn validate(&self) -> Result<()> {
    require_text("document title", &self.title)?;
    require_text("document summary", &self.summary)?;
    require_text("document content", &self.content)
  }
}

/// How a caller identifies a document on the command line or in a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentRef {
  Id(i64),
  Title(String),
}

impl DocumentRef {
  /// Numeric input is an id; anything else is an exact title.
  pub fn parse(input: &str) -> Self {
    let input = input.trim();
    match input.parse::<i64>() {
      Ok(id) => Self::Id(id),
      Err(_) => Self::Title(input.to_owned()),
    }
  }
}

impl std::fmt::Display for DocumentRef {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Id(id) => write!(f, "#{id}"),
      Self::Title(title) => write!(f, "{title:?}"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn numeric_reference_parses_as_id() {
    assert_eq!(DocumentRef::parse(" 42 "), DocumentRef::Id(42));
    assert_eq!(
      DocumentRef::parse("Rust notes"),
      DocumentRef::Title("Rust notes".into())
    );
  }

  #[test]
  fn revision_requires_every_field() {
    let revision = DocumentRevision {
      title:   "T".into(),
      summary: String::new(),
      content: "body".into(),
    };
    assert!(revision.validate().is_err());
  }

  #[test]
  fn document_without_fragments_is_invalid() {
    let input = NewDocument {
      title:        "T".into(),
      summary:      "s".into(),
      content:      "body".into(),
      version:      VersionStamp::from_datetime(Utc::now()),
      fragment_ids: Vec::new(),
      tag_ids:      Vec::new(),
    };
    assert!(matches!(input.validate(), Err(Error::NoSourceFragments)));
  }
}
