//! Fragments: the atomic unit of captured information.
//!
//! A fragment is a short free-text note. Fragments are only rewritten by a
//! compression merge, and every fragment removed by compression or an explicit
//! delete leaves a [`FragmentRemoval`] record behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, error::require_text};

/// A stored fragment. Identifiers are assigned by the store and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
  pub fragment_id: i64,
  pub content:     String,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

/// Input for [`KnowledgeStore::add_fragment`](crate::store::KnowledgeStore::add_fragment).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewFragment {
  pub content: String,
  /// Tag names to attach; resolved with create-or-get semantics.
  #[serde(default)]
  pub tags:    Vec<String>,
}

impl NewFragment {
  pub fn new(content: impl Into<String>) -> Self {
    Self { content: content.into(), tags: Vec::new() }
  }

  pub fn validate(&self) -> Result<()> { require_text("fragment content", &self.content) }
}

/// Which optional filter to apply when listing fragments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FragmentFilter {
  #[default]
  All,
  /// Fragments absent from the document↔fragment link table.
  Unlinked,
}

// ─── Removal log ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalKind {
  /// Folded into another fragment by a merge.
  Merged,
  /// Removed outright.
  Deleted,
}

impl RemovalKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Merged => "merged",
      Self::Deleted => "deleted",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "merged" => Ok(Self::Merged),
      "deleted" => Ok(Self::Deleted),
      other => Err(Error::UnknownRemovalKind(other.to_owned())),
    }
  }
}

/// Tombstone written in the same transaction that removes a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentRemoval {
  pub fragment_id: i64,
  /// Content as it was immediately before removal.
  pub content:     String,
  pub kind:        RemovalKind,
  /// Surviving fragment for [`RemovalKind::Merged`].
  pub merged_into: Option<i64>,
  pub reason:      Option<String>,
  pub removed_at:  DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn whitespace_only_content_is_rejected() {
    let err = NewFragment::new("  \n\t").validate().unwrap_err();
    assert!(matches!(err, Error::EmptyField("fragment content")));
  }

  #[test]
  fn removal_kind_round_trips_through_its_column_form() {
    for kind in [RemovalKind::Merged, RemovalKind::Deleted] {
      assert_eq!(RemovalKind::parse(kind.as_str()).unwrap(), kind);
    }
    assert!(RemovalKind::parse("shredded").is_err());
  }
}
