//! Compression Engine: generator-proposed merges and deletes, bounded by a
//! removal budget the engine enforces itself.
//!
//! Screening walks the proposed actions in order. Invalid actions (unknown
//! ids, ids an earlier accepted action already touches) are skipped and the
//! walk continues. The first action whose removals would exceed the budget
//! ends the walk: it and every action after it are skipped, so the applied
//! set is always a prefix of the valid actions.

use std::{collections::HashSet, fmt};

use serde::Serialize;
use tracing::{info, warn};

use insight_core::{
  Generator,
  fragment::{FragmentFilter, FragmentRemoval},
  response::{CompressionAction, CompressionResponse, RejectedItem, compression_schema},
  store::KnowledgeStore,
};

use crate::{Engine, Result, error::store_err, prompt};

// ─── Budget ──────────────────────────────────────────────────────────────────

/// Fragments a pass may remove: `floor(count × percent / 100)`, but at least
/// one whenever removal is allowed at all.
pub fn removal_budget(count: usize, percent: u32) -> usize {
  if percent == 0 || count == 0 {
    return 0;
  }
  (count * percent.min(100) as usize / 100).max(1)
}

// ─── Reports ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
  Invalid { message: String },
  UnknownFragment { fragment_id: i64 },
  AlreadyTouched { fragment_id: i64 },
  OverBudget { would_remove: usize, budget: usize },
  /// An earlier action exhausted the budget.
  BudgetExhausted,
  /// The store transaction failed and was rolled back.
  Failed { message: String },
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Invalid { message } => write!(f, "invalid action: {message}"),
      Self::UnknownFragment { fragment_id } => write!(f, "fragment {fragment_id} does not exist"),
      Self::AlreadyTouched { fragment_id } => {
        write!(f, "fragment {fragment_id} is already part of an earlier action")
      }
      Self::OverBudget { would_remove, budget } => {
        write!(f, "would remove {would_remove} fragments; budget is {budget}")
      }
      Self::BudgetExhausted => f.write_str("removal budget already exhausted"),
      Self::Failed { message } => write!(f, "failed: {message}"),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedAction {
  /// Position in the generator's `actions` array.
  pub index:  usize,
  pub action: CompressionAction,
  pub reason: SkipReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppliedAction {
  pub index:    usize,
  pub action:   CompressionAction,
  pub removals: Vec<FragmentRemoval>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompressionReport {
  /// Fragments that existed when the pass started.
  pub fragment_count: usize,
  pub budget:         usize,
  pub summary:        String,
  /// Actions that passed screening, in order.
  pub planned:        Vec<(usize, CompressionAction)>,
  /// Empty for a dry run.
  pub applied:        Vec<AppliedAction>,
  pub skipped:        Vec<SkippedAction>,
  /// Items that did not decode as an action at all.
  pub rejected:       Vec<RejectedItem>,
  pub dry_run:        bool,
}

impl CompressionReport {
  pub fn removed(&self) -> usize { self.applied.iter().map(|a| a.removals.len()).sum() }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompressionOutcome {
  NotEnoughFragments { count: usize },
  Analyzed(CompressionReport),
}

// ─── Screening ───────────────────────────────────────────────────────────────

/// Drop repeated ids within one action, keeping the first occurrence.
fn dedup_action(action: CompressionAction) -> CompressionAction {
  fn dedup(ids: Vec<i64>) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
  }
  match action {
    CompressionAction::Merge { fragment_ids, new_content, reason } => {
      CompressionAction::Merge { fragment_ids: dedup(fragment_ids), new_content, reason }
    }
    CompressionAction::Delete { fragment_ids, reason } => {
      CompressionAction::Delete { fragment_ids: dedup(fragment_ids), reason }
    }
  }
}

/// Split proposed actions into the accepted prefix and the skipped rest.
pub(crate) fn screen_actions(
  actions: Vec<(usize, CompressionAction)>,
  existing: &HashSet<i64>,
  budget: usize,
) -> (Vec<(usize, CompressionAction)>, Vec<SkippedAction>) {
  let mut accepted = Vec::new();
  let mut skipped = Vec::new();
  let mut touched = HashSet::new();
  let mut spent = 0;
  let mut exhausted = false;

  for (index, action) in actions {
    let action = dedup_action(action);
    let reason = if exhausted {
      Some(SkipReason::BudgetExhausted)
    } else if matches!(&action, CompressionAction::Merge { fragment_ids, .. } if fragment_ids.len() < 2)
    {
      Some(SkipReason::Invalid { message: "merge needs at least two distinct fragment ids".into() })
    } else if let Some(&id) = action.fragment_ids().iter().find(|id| !existing.contains(*id)) {
      Some(SkipReason::UnknownFragment { fragment_id: id })
    } else if let Some(&id) = action.fragment_ids().iter().find(|id| touched.contains(*id)) {
      Some(SkipReason::AlreadyTouched { fragment_id: id })
    } else if spent + action.removal_cost() > budget {
      exhausted = true;
      Some(SkipReason::OverBudget { would_remove: spent + action.removal_cost(), budget })
    } else {
      None
    };

    match reason {
      Some(reason) => skipped.push(SkippedAction { index, action, reason }),
      None => {
        spent += action.removal_cost();
        touched.extend(action.fragment_ids().iter().copied());
        accepted.push((index, action));
      }
    }
  }

  (accepted, skipped)
}

// ─── Engine ──────────────────────────────────────────────────────────────────

impl<S, G> Engine<S, G>
where
  S: KnowledgeStore,
  G: Generator,
{
  async fn analyze(&self, dry_run: bool) -> Result<CompressionOutcome> {
    let fragments = self.store.list_fragments(FragmentFilter::All).await.map_err(store_err)?;
    if fragments.len() < 2 {
      info!(count = fragments.len(), "not enough fragments to compress");
      return Ok(CompressionOutcome::NotEnoughFragments { count: fragments.len() });
    }

    let budget = removal_budget(fragments.len(), self.config.max_removal_percent);
    let prompt = prompt::compression(&fragments, self.config.max_removal_percent);
    let value = self.generate_structured(&prompt, &compression_schema()).await?;
    let response = CompressionResponse::decode(value)?;
    info!(summary = %response.summary, proposed = response.actions.len(), "compression analysis");

    let existing: HashSet<i64> = fragments.iter().map(|f| f.fragment_id).collect();
    let (planned, skipped) = screen_actions(response.actions, &existing, budget);
    for s in &skipped {
      warn!(index = s.index, kind = s.action.kind(), reason = %s.reason, "skipping compression action");
    }

    Ok(CompressionOutcome::Analyzed(CompressionReport {
      fragment_count: fragments.len(),
      budget,
      summary: response.summary,
      planned,
      applied: Vec::new(),
      skipped,
      rejected: response.rejected,
      dry_run,
    }))
  }

  /// Ask for compression actions and report which would run, without
  /// touching any fragment.
  pub async fn plan_compression(&self) -> Result<CompressionOutcome> { self.analyze(true).await }

  /// Analyze and execute. Each accepted action runs in its own transaction;
  /// a failed action is rolled back and reported, and later actions still run.
  pub async fn compress(&self) -> Result<CompressionOutcome> {
    let mut report = match self.analyze(false).await? {
      CompressionOutcome::Analyzed(report) => report,
      other => return Ok(other),
    };

    for (index, action) in report.planned.clone() {
      let reason = Some(action.reason().to_owned()).filter(|r| !r.trim().is_empty());
      let result = match &action {
        CompressionAction::Merge { fragment_ids, new_content, .. } => {
          self
            .store
            .merge_fragments(fragment_ids.clone(), new_content.clone(), reason)
            .await
        }
        CompressionAction::Delete { fragment_ids, .. } => {
          self.store.delete_fragments(fragment_ids.clone(), reason).await
        }
      };

      match result {
        Ok(removals) => {
          info!(index, kind = action.kind(), removed = removals.len(), "applied compression action");
          report.applied.push(AppliedAction { index, action, removals });
        }
        Err(e) => {
          warn!(index, kind = action.kind(), error = %e, "compression action failed");
          report.skipped.push(SkippedAction {
            index,
            action,
            reason: SkipReason::Failed { message: e.to_string() },
          });
        }
      }
    }

    report.skipped.sort_by_key(|s| s.index);
    info!(removed = report.removed(), budget = report.budget, "compression finished");
    Ok(CompressionOutcome::Analyzed(report))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn merge(ids: &[i64]) -> CompressionAction {
    CompressionAction::Merge {
      fragment_ids: ids.to_vec(),
      new_content:  "merged".into(),
      reason:       "overlap".into(),
    }
  }

  fn delete(ids: &[i64]) -> CompressionAction {
    CompressionAction::Delete { fragment_ids: ids.to_vec(), reason: "noise".into() }
  }

  fn existing(n: i64) -> HashSet<i64> { (1..=n).collect() }

  #[test]
  fn budget_rounds_down_with_a_floor_of_one() {
    assert_eq!(removal_budget(10, 30), 3);
    assert_eq!(removal_budget(9, 30), 2);
    assert_eq!(removal_budget(2, 30), 1);
    assert_eq!(removal_budget(2, 0), 0);
  }

  #[test]
  fn overrun_skips_the_rest_of_the_list() {
    // Budget 3: delete(2) fits, merge of 3 costs 2 and overruns, delete(1)
    // would fit but comes after the overrun.
    let actions = vec![(0, delete(&[1, 2])), (1, merge(&[3, 4, 5])), (2, delete(&[6]))];
    let (accepted, skipped) = screen_actions(actions, &existing(10), 3);

    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].0, 0);
    assert_eq!(skipped[0].reason, SkipReason::OverBudget { would_remove: 4, budget: 3 });
    assert_eq!(skipped[1].reason, SkipReason::BudgetExhausted);
  }

  #[test]
  fn invalid_actions_do_not_end_the_prefix() {
    let actions = vec![
      (0, delete(&[99])),
      (1, merge(&[1, 2])),
      (2, delete(&[2])),
      (3, merge(&[3, 3])),
      (4, delete(&[4])),
    ];
    let (accepted, skipped) = screen_actions(actions, &existing(10), 3);

    let indices: Vec<_> = accepted.iter().map(|(i, _)| *i).collect();
    assert_eq!(indices, [1, 4]);
    assert_eq!(skipped[0].reason, SkipReason::UnknownFragment { fragment_id: 99 });
    assert_eq!(skipped[1].reason, SkipReason::AlreadyTouched { fragment_id: 2 });
    assert!(matches!(skipped[2].reason, SkipReason::Invalid { .. }));
  }

  #[test]
  fn accepted_removals_never_exceed_budget() {
    let actions = (0..10).map(|i| (i as usize, delete(&[i + 1]))).collect();
    let (accepted, _) = screen_actions(actions, &existing(10), removal_budget(10, 30));
    let removed: usize = accepted.iter().map(|(_, a)| a.removal_cost()).sum();
    assert_eq!(removed, 3);
  }
}
