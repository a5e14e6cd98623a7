//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings with microsecond
//! precision and a `Z` suffix, so lexical order equals chronological order and
//! a version stamp read back compares equal to the one written. Question
//! context id lists are stored as compact JSON arrays, or NULL when empty.

use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use insight_core::{
  document::{Document, DocumentDetail},
  fragment::{Fragment, FragmentRemoval, RemovalKind},
  question::{Question, QuestionStatus},
  tag::{Tag, TagCount},
  VersionStamp,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// The current time at the precision the store preserves.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_version(s: &str) -> Result<VersionStamp> {
  decode_dt(s).map(VersionStamp::from_datetime)
}

// ─── Id lists ────────────────────────────────────────────────────────────────

pub fn encode_ids(ids: &[i64]) -> Result<Option<String>> {
  if ids.is_empty() {
    return Ok(None);
  }
  Ok(Some(serde_json::to_string(ids)?))
}

pub fn decode_ids(s: Option<&str>) -> Result<Vec<i64>> {
  match s {
    None | Some("") => Ok(Vec::new()),
    Some(s) => Ok(serde_json::from_str(s)?),
  }
}

/// `%term%` with LIKE wildcards in `term` escaped by `\`.
pub fn like_pattern(term: &str) -> String {
  let mut out = String::with_capacity(term.len() + 2);
  out.push('%');
  for c in term.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out.push('%');
  out
}

// ─── Column lists ────────────────────────────────────────────────────────────

pub const FRAGMENT_COLUMNS: &str = "f.fragment_id, f.content, f.created_at, f.updated_at";

pub const DOCUMENT_COLUMNS: &str = "d.document_id, d.title, d.summary, d.content, \
                                    d.version_created_at, d.created_at, d.updated_at";

pub const TAG_COLUMNS: &str = "t.tag_id, t.name, t.color";

pub const QUESTION_COLUMNS: &str = "q.question_id, q.question_text, q.context_fragment_ids, \
                                    q.context_document_ids, q.status, q.created_at, \
                                    q.answered_at, q.answer_fragment_id";

pub const REMOVAL_COLUMNS: &str =
  "r.fragment_id, r.content, r.kind, r.merged_into, r.reason, r.removed_at";

// ─── Raw rows ────────────────────────────────────────────────────────────────

/// Raw column values for a `fragments` row, selected with [`FRAGMENT_COLUMNS`].
pub struct RawFragment {
  pub fragment_id: i64,
  pub content:     String,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawFragment {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      fragment_id: row.get(0)?,
      content:     row.get(1)?,
      created_at:  row.get(2)?,
      updated_at:  row.get(3)?,
    })
  }

  pub fn into_fragment(self) -> Result<Fragment> {
    Ok(Fragment {
      fragment_id: self.fragment_id,
      content:     self.content,
      created_at:  decode_dt(&self.created_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawDocument {
  pub document_id: i64,
  pub title:       String,
  pub summary:     String,
  pub content:     String,
  pub version:     String,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawDocument {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      document_id: row.get(0)?,
      title:       row.get(1)?,
      summary:     row.get(2)?,
      content:     row.get(3)?,
      version:     row.get(4)?,
      created_at:  row.get(5)?,
      updated_at:  row.get(6)?,
    })
  }

  pub fn into_document(self) -> Result<Document> {
    Ok(Document {
      document_id: self.document_id,
      title:       self.title,
      summary:     self.summary,
      content:     self.content,
      version:     decode_version(&self.version)?,
      created_at:  decode_dt(&self.created_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

/// Tags carry no timestamps worth decoding, so rows map straight to [`Tag`].
pub fn tag_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tag> {
  Ok(Tag { tag_id: row.get(0)?, name: row.get(1)?, color: row.get(2)? })
}

/// Expects [`TAG_COLUMNS`] followed by a count column.
pub fn tag_count_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TagCount> {
  let count: i64 = row.get(3)?;
  Ok(TagCount { tag: tag_from_row(row)?, document_count: count.max(0) as u64 })
}

pub struct RawQuestion {
  pub question_id:          i64,
  pub question_text:        String,
  pub context_fragment_ids: Option<String>,
  pub context_document_ids: Option<String>,
  pub status:               String,
  pub created_at:           String,
  pub answered_at:          Option<String>,
  pub answer_fragment_id:   Option<i64>,
}

impl RawQuestion {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      question_id:          row.get(0)?,
      question_text:        row.get(1)?,
      context_fragment_ids: row.get(2)?,
      context_document_ids: row.get(3)?,
      status:               row.get(4)?,
      created_at:           row.get(5)?,
      answered_at:          row.get(6)?,
      answer_fragment_id:   row.get(7)?,
    })
  }

  pub fn into_question(self) -> Result<Question> {
    Ok(Question {
      question_id:          self.question_id,
      question_text:        self.question_text,
      context_fragment_ids: decode_ids(self.context_fragment_ids.as_deref())?,
      context_document_ids: decode_ids(self.context_document_ids.as_deref())?,
      status:               QuestionStatus::parse(&self.status)?,
      created_at:           decode_dt(&self.created_at)?,
      answered_at:          self.answered_at.as_deref().map(decode_dt).transpose()?,
      answer_fragment_id:   self.answer_fragment_id,
    })
  }
}

pub struct RawRemoval {
  pub fragment_id: i64,
  pub content:     String,
  pub kind:        String,
  pub merged_into: Option<i64>,
  pub reason:      Option<String>,
  pub removed_at:  String,
}

impl RawRemoval {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      fragment_id: row.get(0)?,
      content:     row.get(1)?,
      kind:        row.get(2)?,
      merged_into: row.get(3)?,
      reason:      row.get(4)?,
      removed_at:  row.get(5)?,
    })
  }

  pub fn into_removal(self) -> Result<FragmentRemoval> {
    Ok(FragmentRemoval {
      fragment_id: self.fragment_id,
      content:     self.content,
      kind:        RemovalKind::parse(&self.kind)?,
      merged_into: self.merged_into,
      reason:      self.reason,
      removed_at:  decode_dt(&self.removed_at)?,
    })
  }
}

/// A document row plus its linked fragments and tags.
pub struct RawDetail {
  pub document:  RawDocument,
  pub fragments: Vec<RawFragment>,
  pub tags:      Vec<Tag>,
}

impl RawDetail {
  pub fn into_detail(self) -> Result<DocumentDetail> {
    Ok(DocumentDetail {
      document:  self.document.into_document()?,
      fragments: decode_all(self.fragments, RawFragment::into_fragment)?,
      tags:      self.tags,
    })
  }
}

/// Decode a batch of raw rows, failing on the first bad one.
pub fn decode_all<R, T>(raws: Vec<R>, f: impl Fn(R) -> Result<T>) -> Result<Vec<T>> {
  raws.into_iter().map(f).collect()
}
