//! Prompt text sent to the generator.
//!
//! Prompts are built only from their arguments, so the same fragments always
//! produce the same prompt.

use std::fmt::Write as _;

use insight_core::{document::DocumentDetail, fragment::Fragment};

fn fragment_listing(fragments: &[Fragment]) -> String {
  let mut out = String::new();
  for f in fragments {
    let _ = writeln!(
      out,
      "ID: {}\nCreated: {}\nContent: {}\n",
      f.fragment_id,
      f.created_at.format("%Y-%m-%d %H:%M:%S"),
      f.content
    );
  }
  out
}

pub fn synthesis(fragments: &[Fragment]) -> String {
  format!(
    "Analyze the fragments below and organize them into documents by theme.

=== Fragments ===
{}
=== Guidelines ===
- Group related fragments by theme; a fragment may support more than one document.
- Fill in background or explanation where the fragments leave gaps, without \
inventing facts.
- List in fragment_ids exactly the fragment IDs each document draws on.
- Give each document 2-4 short, searchable tags.
- If something in the fragments is ambiguous or contradictory, add a short \
question for the author to the questions list.

=== Markdown structure for content ===
1. # Main title (same as title)
2. One or two introductory lines
3. ## Subheadings, each followed by paragraphs

Explain in analysis how you grouped the fragments.",
    fragment_listing(fragments)
  )
}

pub fn revision(detail: &DocumentDetail) -> String {
  format!(
    "Rewrite the document below so that it reflects its source fragments.

=== Current document ===
Title: {}
Summary: {}

{}

=== Source fragments ===
{}
=== Guidelines ===
- Keep the document focused on the same theme.
- Use the same markdown structure: # title, short introduction, ## subheadings.
- Return the new title, summary and content.",
    detail.document.title,
    detail.document.summary,
    detail.document.content,
    fragment_listing(&detail.fragments)
  )
}

pub fn compression(fragments: &[Fragment], max_removal_percent: u32) -> String {
  format!(
    "Analyze the fragments below and propose actions that make the collection \
more compact.

=== Fragments ===
{}
=== Criteria ===
1. Merge fragments whose content duplicates or overlaps.
2. Delete fragments that carry almost no information.
3. Prefer merged text that is more specific and useful than its parts.

=== Actions ===
- merge: combine the listed fragment_ids; new_content replaces the first one.
- delete: remove the listed fragment_ids.

=== Constraints ===
- Remove at most {max_removal_percent}% of the fragments in total.
- Never lose information when merging.
- Keep anything important.

Summarize the proposed changes in summary.",
    fragment_listing(fragments)
  )
}

pub fn answer(question: &str, context: &str, use_web_search: bool) -> String {
  let mut prompt = format!(
    "You are an expert on the documents below. Answer the user's question \
accurately and usefully, based on the provided documents.

=== Documents ===
{context}
=== Question ===
{question}

=== Guidelines ===
- Rely on the documents first.
- If you add information the documents do not contain, say so."
  );
  if use_web_search {
    prompt.push_str(
      "
- Use web search for recent information where it helps, and say when you did.
- Combine the documents and the search results into one complete answer.",
    );
  }
  prompt.push_str(
    "
- Be concrete and practical; include examples or steps where useful.",
  );
  prompt
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone as _, Utc};

  use super::*;

  fn fragment(id: i64, content: &str) -> Fragment {
    let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
    Fragment { fragment_id: id, content: content.into(), created_at: at, updated_at: at }
  }

  #[test]
  fn synthesis_prompt_lists_every_fragment_in_order() {
    let prompt = synthesis(&[fragment(1, "first"), fragment(2, "second")]);
    let first = prompt.find("ID: 1").unwrap();
    let second = prompt.find("ID: 2").unwrap();
    assert!(first < second);
    assert!(prompt.contains("Created: 2025-01-02 03:04:05"));
    assert!(prompt.contains("Content: second"));
  }

  #[test]
  fn web_search_guidance_only_when_enabled() {
    assert!(!answer("q", "ctx", false).contains("web search"));
    assert!(answer("q", "ctx", true).contains("web search"));
  }
}
