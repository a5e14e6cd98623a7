//! Answer tracking for questions raised during synthesis.

use tracing::info;

use insight_core::{
  Generator,
  fragment::Fragment,
  question::{Question, QuestionStatus},
  store::KnowledgeStore,
};

use crate::{Engine, Error, Result, error::store_err};

impl<S, G> Engine<S, G>
where
  S: KnowledgeStore,
  G: Generator,
{
  async fn pending_question(&self, id: i64) -> Result<Question> {
    let question = self
      .store
      .get_question(id)
      .await
      .map_err(store_err)?
      .ok_or(Error::QuestionNotFound(id))?;
    if question.status != QuestionStatus::Pending {
      return Err(insight_core::Error::QuestionAlreadyResolved(id).into());
    }
    Ok(question)
  }

  /// Record `text` as an answer fragment. The fragment starts unlinked, so
  /// the next synthesis run folds the answer into the documents.
  pub async fn answer_question(&self, id: i64, text: &str) -> Result<(Question, Fragment)> {
    insight_core::error::require_text("answer", text)?;
    self.pending_question(id).await?;
    let (question, fragment) = self
      .store
      .answer_question(id, text.trim().to_owned())
      .await
      .map_err(store_err)?;
    info!(question_id = id, fragment_id = fragment.fragment_id, "answered question");
    Ok((question, fragment))
  }

  pub async fn archive_question(&self, id: i64) -> Result<Question> {
    self.pending_question(id).await?;
    let question = self.store.archive_question(id).await.map_err(store_err)?;
    info!(question_id = id, "archived question");
    Ok(question)
  }
}
