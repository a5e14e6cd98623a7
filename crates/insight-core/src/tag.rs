//! Tags: classification labels shared by documents and fragments.

use serde::{Deserialize, Serialize};

/// A tag. Names are unique; lookups go through create-or-get.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
  pub tag_id: i64,
  pub name:   String,
  /// `#RRGGBB` display color.
  pub color:  Option<String>,
}

/// A tag together with the number of documents carrying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
  #[serde(flatten)]
  pub tag:            Tag,
  pub document_count: u64,
}

const PALETTE: [&str; 6] =
  ["#3B82F6", "#EF4444", "#10B981", "#F59E0B", "#8B5CF6", "#EC4899"];

/// Deterministic display color for a new tag, picked from a fixed palette.
pub fn tag_color(name: &str) -> &'static str {
  let hash = name
    .chars()
    .fold(0i32, |h, c| (c as i32).wrapping_add(h.wrapping_shl(5).wrapping_sub(h)));
  let hue = hash.rem_euclid(360) as usize;
  PALETTE[hue % PALETTE.len()]
}

/// Trim a tag name; `None` when nothing is left.
pub fn normalize_tag_name(name: &str) -> Option<String> {
  let trimmed = name.trim();
  (!trimmed.is_empty()).then(|| trimmed.to_owned())
}
