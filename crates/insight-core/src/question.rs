//! Questions: ambiguities raised during synthesis, awaiting a human answer.
//!
//! A question starts `pending` and moves to `answered` (once, with an answer
//! fragment) or `archived`. It never returns to `pending`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
  Pending,
  Answered,
  Archived,
}

impl QuestionStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Answered => "answered",
      Self::Archived => "archived",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "pending" => Ok(Self::Pending),
      "answered" => Ok(Self::Answered),
      "archived" => Ok(Self::Archived),
      other => Err(Error::UnknownQuestionStatus(other.to_owned())),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
  pub question_id:          i64,
  pub question_text:        String,
  pub context_fragment_ids: Vec<i64>,
  pub context_document_ids: Vec<i64>,
  pub status:               QuestionStatus,
  pub created_at:           DateTime<Utc>,
  pub answered_at:          Option<DateTime<Utc>>,
  pub answer_fragment_id:   Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct NewQuestion {
  pub question_text:        String,
  pub context_fragment_ids: Vec<i64>,
  pub context_document_ids: Vec<i64>,
}

/// The body of the fragment that records an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
  pub text:        String,
  #[serde(rename = "type")]
  pub kind:        String,
  pub question:    String,
  pub question_id: String,
}

impl AnswerRecord {
  pub fn for_question(
    question_id: i64,
    question_text: impl Into<String>,
    text: impl Into<String>,
  ) -> Self {
    Self {
      text:        text.into(),
      kind:        "answer".into(),
      question:    question_text.into(),
      question_id: question_id.to_string(),
    }
  }

  pub fn to_fragment_content(&self) -> Result<String> { Ok(serde_json::to_string(self)?) }
}
