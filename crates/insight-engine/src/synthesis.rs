//! Synthesis Orchestrator: unlinked fragments in, versioned documents out.
//!
//! One call to [`Engine::synthesize`] is one generation. The version stamp is
//! minted once, before any write, and every document the run creates carries
//! it. Each document commits in its own transaction; a candidate or a whole
//! group that fails is logged and reported, and the run carries on.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use insight_core::{
  GenerateError, Generator, VersionStamp,
  document::{Document, DocumentRef, DocumentRevision, NewDocument},
  fragment::{Fragment, FragmentFilter},
  question::{NewQuestion, Question},
  response::{
    CandidateDocument, RejectedItem, SynthesisResponse, decode_revision, revision_schema,
    synthesis_schema,
  },
  store::KnowledgeStore,
  tag::normalize_tag_name,
};

use crate::{Engine, Error, Result, error::store_err, prompt};

// ─── Reports ─────────────────────────────────────────────────────────────────

/// A document written by a synthesis run.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentCreated {
  pub document_id:  i64,
  pub title:        String,
  pub version:      VersionStamp,
  /// Fragment links actually written.
  pub fragment_ids: Vec<i64>,
  /// Names of the tags actually linked.
  pub tags:         Vec<String>,
}

/// A candidate that was not written.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedCandidate {
  pub group:  usize,
  /// Position in the generator's `documents` array.
  pub index:  usize,
  pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedGroup {
  pub group:        usize,
  pub fragment_ids: Vec<i64>,
  pub error:        String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SynthesisReport {
  /// `None` when there was nothing to synthesize.
  pub version:       Option<VersionStamp>,
  pub fragments:     usize,
  pub created:       Vec<DocumentCreated>,
  pub rejected:      Vec<RejectedCandidate>,
  pub failed_groups: Vec<FailedGroup>,
  pub questions:     Vec<Question>,
  /// The generator's analysis, one entry per successful group.
  pub analysis:      Vec<String>,
}

/// What one group would produce, computed without writing anything.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedGroup {
  pub fragment_ids: Vec<i64>,
  pub candidates:   Vec<CandidateDocument>,
  pub rejected:     Vec<RejectedItem>,
  pub analysis:     String,
  pub questions:    Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SynthesisPlan {
  pub fragments: usize,
  pub groups:    Vec<PlannedGroup>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
  Updated { document: Document },
  /// The document has no linked fragments left to regenerate from.
  NoFragments { document: Document },
  Preview { document: Document, revision: DocumentRevision },
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn ids_of(fragments: &[Fragment]) -> Vec<i64> { fragments.iter().map(|f| f.fragment_id).collect() }

/// Normalized tag names, first occurrence wins.
fn candidate_tags(tags: &[String]) -> Vec<String> {
  let mut seen = HashSet::new();
  tags
    .iter()
    .filter_map(|t| normalize_tag_name(t))
    .filter(|t| seen.insert(t.clone()))
    .collect()
}

// ─── Engine ──────────────────────────────────────────────────────────────────

impl<S, G> Engine<S, G>
where
  S: KnowledgeStore,
  G: Generator,
{
  /// Fragments the next run would pick up, in id order.
  pub async fn unprocessed_fragments(&self) -> Result<Vec<Fragment>> {
    let mut fragments = self
      .store
      .list_fragments(FragmentFilter::Unlinked)
      .await
      .map_err(store_err)?;
    fragments.sort_by_key(|f| f.fragment_id);
    Ok(fragments)
  }

  fn groups<'a>(&self, fragments: &'a [Fragment]) -> std::slice::Chunks<'a, Fragment> {
    fragments.chunks(self.config.batch_size.max(1))
  }

  async fn request_synthesis(&self, group: &[Fragment]) -> Result<SynthesisResponse> {
    let prompt = prompt::synthesis(group);
    let value = self.generate_structured(&prompt, &synthesis_schema()).await?;
    Ok(SynthesisResponse::decode(value)?)
  }

  /// Run one generation over every unlinked fragment.
  pub async fn synthesize(&self) -> Result<SynthesisReport> {
    let fragments = self.unprocessed_fragments().await?;
    if fragments.is_empty() {
      info!("no unprocessed fragments");
      return Ok(SynthesisReport::default());
    }

    let floor = self.store.latest_version().await.map_err(store_err)?;
    let version = self.clock.tick(floor)?;
    info!(%version, fragments = fragments.len(), "starting synthesis run");

    let mut report = SynthesisReport {
      version: Some(version),
      fragments: fragments.len(),
      ..Default::default()
    };

    let mut groups = 0;
    let mut last_error = None;
    for (index, group) in self.groups(&fragments).enumerate() {
      groups += 1;
      if let Err(e) = self.synthesize_group(index, group, version, &mut report).await {
        warn!(group = index, error = %e, "synthesis group failed");
        report.failed_groups.push(FailedGroup {
          group:        index,
          fragment_ids: ids_of(group),
          error:        e.to_string(),
        });
        // No later group can succeed without credentials.
        if matches!(e, Error::Generate(GenerateError::MissingCredentials(_)))
          && report.created.is_empty()
        {
          return Err(e);
        }
        last_error = Some(e);
      }
    }

    if report.failed_groups.len() == groups {
      if let Some(last) = last_error {
        return Err(Error::AllGroupsFailed { groups, last: Box::new(last) });
      }
    }

    info!(
      %version,
      created = report.created.len(),
      rejected = report.rejected.len(),
      failed_groups = report.failed_groups.len(),
      "synthesis run finished"
    );
    Ok(report)
  }

  async fn synthesize_group(
    &self,
    group_index: usize,
    group: &[Fragment],
    version: VersionStamp,
    report: &mut SynthesisReport,
  ) -> Result<()> {
    let response = self.request_synthesis(group).await?;
    debug!(group = group_index, analysis = %response.analysis, "generator analysis");

    for item in response.rejected {
      warn!(group = group_index, index = item.index, reason = %item.reason, "rejected candidate");
      report.rejected.push(RejectedCandidate {
        group:  group_index,
        index:  item.index,
        reason: item.reason,
      });
    }

    let mut created_ids = Vec::new();
    for (index, candidate) in response.candidates {
      match self.persist_candidate(candidate, version).await {
        Ok(created) => {
          info!(document_id = created.document_id, title = %created.title, "created document");
          created_ids.push(created.document_id);
          report.created.push(created);
        }
        Err(e) => {
          warn!(group = group_index, index, error = %e, "failed to store candidate");
          report.rejected.push(RejectedCandidate {
            group: group_index,
            index,
            reason: e.to_string(),
          });
        }
      }
    }

    let context_fragment_ids = ids_of(group);
    for text in response.questions {
      let input = NewQuestion {
        question_text:        text,
        context_fragment_ids: context_fragment_ids.clone(),
        context_document_ids: created_ids.clone(),
      };
      match self.store.add_question(input).await {
        Ok(q) => report.questions.push(q),
        Err(e) => warn!(error = %e, "failed to record question"),
      }
    }

    report.analysis.push(response.analysis);
    Ok(())
  }

  /// Resolve tags (log-and-continue), then write the document and its links
  /// in one store transaction.
  async fn persist_candidate(
    &self,
    candidate: CandidateDocument,
    version: VersionStamp,
  ) -> Result<DocumentCreated> {
    let mut tags = Vec::new();
    for name in candidate_tags(&candidate.tags) {
      match self.store.create_or_get_tag(name.clone()).await {
        Ok(tag) => tags.push(tag),
        Err(e) => warn!(tag = %name, error = %e, "failed to resolve tag"),
      }
    }

    let linked = self
      .store
      .create_document(NewDocument {
        title: candidate.title,
        summary: candidate.summary,
        content: candidate.content,
        version,
        fragment_ids: candidate.fragment_ids,
        tag_ids: tags.iter().map(|t| t.tag_id).collect(),
      })
      .await
      .map_err(store_err)?;

    let tag_names = tags
      .into_iter()
      .filter(|t| linked.tag_ids.contains(&t.tag_id))
      .map(|t| t.name)
      .collect();

    Ok(DocumentCreated {
      document_id:  linked.document.document_id,
      title:        linked.document.title,
      version:      linked.document.version,
      fragment_ids: linked.fragment_ids,
      tags:         tag_names,
    })
  }

  /// Ask the generator what a run would produce, without writing anything
  /// and without minting a version.
  pub async fn plan_synthesis(&self) -> Result<SynthesisPlan> {
    let fragments = self.unprocessed_fragments().await?;
    let mut plan = SynthesisPlan { fragments: fragments.len(), groups: Vec::new() };

    for group in self.groups(&fragments) {
      let response = self.request_synthesis(group).await?;
      plan.groups.push(PlannedGroup {
        fragment_ids: ids_of(group),
        candidates:   response.candidates.into_iter().map(|(_, c)| c).collect(),
        rejected:     response.rejected,
        analysis:     response.analysis,
        questions:    response.questions,
      });
    }
    Ok(plan)
  }

  /// Regenerate one document from its current fragments and overwrite it in
  /// place. The version stamp is left alone.
  pub async fn refresh_document(
    &self,
    reference: DocumentRef,
    preview: bool,
  ) -> Result<RefreshOutcome> {
    let label = reference.to_string();
    let document = self
      .store
      .find_document(reference)
      .await
      .map_err(store_err)?
      .ok_or_else(|| Error::DocumentNotFound(label.clone()))?;

    let detail = self
      .store
      .document_detail(document.document_id)
      .await
      .map_err(store_err)?
      .ok_or(Error::DocumentNotFound(label))?;

    if detail.fragments.is_empty() {
      info!(document_id = document.document_id, "document has no fragments; nothing to refresh");
      return Ok(RefreshOutcome::NoFragments { document: detail.document });
    }

    let prompt = prompt::revision(&detail);
    let value = self.generate_structured(&prompt, &revision_schema()).await?;
    let revision = decode_revision(value)?;

    if preview {
      return Ok(RefreshOutcome::Preview { document: detail.document, revision });
    }

    let id = detail.document.document_id;
    let updated = self
      .store
      .update_document(id, revision)
      .await
      .map_err(store_err)?
      .ok_or_else(|| Error::DocumentNotFound(format!("#{id}")))?;
    info!(document_id = id, title = %updated.title, "refreshed document");
    Ok(RefreshOutcome::Updated { document: updated })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn candidate_tags_are_trimmed_and_unique() {
    let tags = vec![" rust ".into(), "".into(), "rust".into(), "async".into()];
    assert_eq!(candidate_tags(&tags), ["rust", "async"]);
  }
}
