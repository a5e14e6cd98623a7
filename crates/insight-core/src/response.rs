//! Structured-output contracts with the text-generation service.
//!
//! Each contract is a JSON schema sent with the request plus a strictly
//! typed decoder for the reply. The envelope (`documents`/`actions` arrays)
//! must decode or the whole reply is rejected; individual items decode one
//! at a time so a single malformed item is rejected without losing the rest.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};

use crate::{
  document::DocumentRevision,
  error::require_text,
  generate::GenerateError,
};

// ─── Schemas ─────────────────────────────────────────────────────────────────

/// A named JSON schema describing the expected reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
  pub name:   &'static str,
  pub schema: Value,
}

/// `{documents: [{title, summary, content, fragment_ids, tags}], analysis, questions?}`
pub fn synthesis_schema() -> ResponseSchema {
  ResponseSchema {
    name:   "synthesized_documents",
    schema: json!({
      "type": "object",
      "properties": {
        "documents": {
          "type": "array",
          "items": {
            "type": "object",
            "properties": {
              "title":        { "type": "string", "description": "Document title" },
              "summary":      { "type": "string", "description": "One or two sentence summary" },
              "content":      { "type": "string", "description": "Markdown body" },
              "fragment_ids": {
                "type": "array",
                "items": { "type": "integer" },
                "description": "Ids of the fragments this document uses"
              },
              "tags": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Short tag names for the document"
              }
            },
            "required": ["title", "summary", "content", "fragment_ids", "tags"]
          }
        },
        "analysis": { "type": "string", "description": "How the fragments were grouped" },
        "questions": {
          "type": "array",
          "items": { "type": "string" },
          "description": "Ambiguities a human should clarify"
        }
      },
      "required": ["documents", "analysis"]
    }),
  }
}

/// `{title, summary, content}` for refreshing a single document.
pub fn revision_schema() -> ResponseSchema {
  ResponseSchema {
    name:   "document_revision",
    schema: json!({
      "type": "object",
      "properties": {
        "title":   { "type": "string" },
        "summary": { "type": "string" },
        "content": { "type": "string", "description": "Markdown body" }
      },
      "required": ["title", "summary", "content"]
    }),
  }
}

/// `{actions: [{type, fragment_ids, new_content?, reason}], summary}`
pub fn compression_schema() -> ResponseSchema {
  ResponseSchema {
    name:   "compression_actions",
    schema: json!({
      "type": "object",
      "properties": {
        "actions": {
          "type": "array",
          "items": {
            "type": "object",
            "properties": {
              "type":         { "type": "string", "enum": ["merge", "delete"] },
              "fragment_ids": { "type": "array", "items": { "type": "integer" } },
              "new_content":  { "type": "string", "description": "Merged text; merge only" },
              "reason":       { "type": "string" }
            },
            "required": ["type", "fragment_ids", "reason"]
          }
        },
        "summary": { "type": "string" }
      },
      "required": ["actions", "summary"]
    }),
  }
}

// ─── Item decoding ───────────────────────────────────────────────────────────

/// An item of a structured reply that failed to decode or validate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedItem {
  /// Position in the reply array.
  pub index:  usize,
  pub reason: String,
}

fn decode_envelope<T: DeserializeOwned>(value: Value) -> Result<T, GenerateError> {
  serde_json::from_value(value).map_err(|e| GenerateError::InvalidResponse(e.to_string()))
}

fn decode_items<T, F>(items: Vec<Value>, validate: F) -> (Vec<(usize, T)>, Vec<RejectedItem>)
where
  T: DeserializeOwned,
  F: Fn(&T) -> Result<(), String>,
{
  let mut accepted = Vec::new();
  let mut rejected = Vec::new();
  for (index, item) in items.into_iter().enumerate() {
    let decoded = serde_json::from_value::<T>(item)
      .map_err(|e| e.to_string())
      .and_then(|t| validate(&t).map(|()| t));
    match decoded {
      Ok(t) => accepted.push((index, t)),
      Err(reason) => rejected.push(RejectedItem { index, reason }),
    }
  }
  (accepted, rejected)
}

// ─── Synthesis ───────────────────────────────────────────────────────────────

/// One document proposed by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDocument {
  pub title:        String,
  pub summary:      String,
  pub content:      String,
  pub fragment_ids: Vec<i64>,
  pub tags:         Vec<String>,
}

impl CandidateDocument {
  fn check(&self) -> Result<(), String> {
    require_text("title", &self.title)
      .and_then(|()| require_text("summary", &self.summary))
      .and_then(|()| require_text("content", &self.content))
      .map_err(|e| e.to_string())?;
    if self.fragment_ids.is_empty() {
      return Err("fragment_ids must not be empty".into());
    }
    Ok(())
  }
}

#[derive(Debug, Clone)]
pub struct SynthesisResponse {
  /// Valid candidates in reply order, with their original index.
  pub candidates: Vec<(usize, CandidateDocument)>,
  pub rejected:   Vec<RejectedItem>,
  pub analysis:   String,
  pub questions:  Vec<String>,
}

impl SynthesisResponse {
  pub fn decode(value: Value) -> Result<Self, GenerateError> {
    #[derive(Deserialize)]
    struct Envelope {
      documents: Vec<Value>,
      analysis:  String,
      #[serde(default)]
      questions: Vec<String>,
    }

    let envelope: Envelope = decode_envelope(value)?;
    let (candidates, rejected) = decode_items(envelope.documents, CandidateDocument::check);
    let questions = envelope
      .questions
      .into_iter()
      .map(|q| q.trim().to_owned())
      .filter(|q| !q.is_empty())
      .collect();

    Ok(Self { candidates, rejected, analysis: envelope.analysis, questions })
  }
}

// ─── Revision ────────────────────────────────────────────────────────────────

pub fn decode_revision(value: Value) -> Result<DocumentRevision, GenerateError> {
  let revision: DocumentRevision = decode_envelope(value)?;
  revision
    .validate()
    .map_err(|e| GenerateError::InvalidResponse(e.to_string()))?;
  Ok(revision)
}

// ─── Compression ─────────────────────────────────────────────────────────────

/// A destructive action proposed by the generator. Untrusted until the
/// compression engine has checked it against the removal budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CompressionAction {
  /// Rewrite the first id with `new_content` and remove the rest.
  Merge {
    fragment_ids: Vec<i64>,
    new_content:  String,
    reason:       String,
  },
  Delete {
    fragment_ids: Vec<i64>,
    reason:       String,
  },
}

impl CompressionAction {
  pub fn fragment_ids(&self) -> &[i64] {
    match self {
      Self::Merge { fragment_ids, .. } | Self::Delete { fragment_ids, .. } => fragment_ids,
    }
  }

  pub fn reason(&self) -> &str {
    match self {
      Self::Merge { reason, .. } | Self::Delete { reason, .. } => reason,
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      Self::Merge { .. } => "merge",
      Self::Delete { .. } => "delete",
    }
  }

  /// Number of fragments this action removes. A merge keeps one survivor.
  pub fn removal_cost(&self) -> usize {
    match self {
      Self::Merge { fragment_ids, .. } => fragment_ids.len().saturating_sub(1),
      Self::Delete { fragment_ids, .. } => fragment_ids.len(),
    }
  }

  fn check(&self) -> Result<(), String> {
    match self {
      Self::Merge { fragment_ids, new_content, .. } => {
        if fragment_ids.len() < 2 {
          return Err("merge needs at least two fragment ids".into());
        }
        require_text("new_content", new_content).map_err(|e| e.to_string())
      }
      Self::Delete { fragment_ids, .. } if fragment_ids.is_empty() => {
        Err("delete needs at least one fragment id".into())
      }
      Self::Delete { .. } => Ok(()),
    }
  }
}

#[derive(Debug, Clone)]
pub struct CompressionResponse {
  pub actions:  Vec<(usize, CompressionAction)>,
  pub rejected: Vec<RejectedItem>,
  pub summary:  String,
}

impl CompressionResponse {
  pub fn decode(value: Value) -> Result<Self, GenerateError> {
    #[derive(Deserialize)]
    struct Envelope {
      actions: Vec<Value>,
      summary: String,
    }

    let envelope: Envelope = decode_envelope(value)?;
    let (actions, rejected) = decode_items(envelope.actions, CompressionAction::check);
    Ok(Self { actions, rejected, summary: envelope.summary })
  }
}
