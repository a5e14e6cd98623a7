//! Command implementations. Each prints its result to stdout.

use std::{path::Path, sync::Arc};

use anyhow::{Context as _, Result, bail};
use chrono::{DateTime, Utc};
use insight_api::AppState;
use insight_core::{
  VersionStamp,
  document::{Document, DocumentRef},
  fragment::{FragmentFilter, NewFragment},
  store::KnowledgeStore,
};
use insight_engine::{AskScope, CompressionOutcome, Engine, RefreshOutcome, SynthesisReport};
use insight_llm::OpenAiGenerator;
use insight_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{export, settings::AppConfig};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct App {
  store:  Arc<SqliteStore>,
  engine: Engine<SqliteStore, OpenAiGenerator>,
  config: AppConfig,
}

fn print_documents(documents: &[Document]) {
  println!("ID\tTitle\tVersion\tLast Updated");
  println!("--\t-----\t-------\t------------");
  for doc in documents {
    println!(
      "{}\t{}\t{}\t{}",
      doc.document_id,
      doc.title,
      doc.version,
      doc.updated_at.format(DATE_FORMAT)
    );
  }
}

fn print_synthesis(report: &SynthesisReport) {
  let Some(version) = report.version else {
    println!("No unprocessed fragments.");
    return;
  };
  println!("Version {version}: {} fragment(s) processed.", report.fragments);
  for created in &report.created {
    println!(
      "- Created #{} {:?} from fragments {:?} [{}]",
      created.document_id,
      created.title,
      created.fragment_ids,
      created.tags.join(", ")
    );
  }
  for rejected in &report.rejected {
    println!("- Skipped candidate {} of group {}: {}", rejected.index, rejected.group, rejected.reason);
  }
  for failed in &report.failed_groups {
    println!("- Group {} failed ({:?}): {}", failed.group, failed.fragment_ids, failed.error);
  }
  for question in &report.questions {
    println!("- Question #{}: {}", question.question_id, question.question_text);
  }
}

fn require_confirmation(confirm: bool, command: &str, effect: &str) -> Result<()> {
  if !confirm {
    bail!("`{command}` {effect}; run `insight {command} --confirm` to proceed");
  }
  Ok(())
}

impl App {
  pub async fn open(config: AppConfig) -> Result<Self> {
    let store = SqliteStore::open(&config.db_path)
      .await
      .with_context(|| format!("failed to open store at {:?}", config.db_path))?;
    let store = Arc::new(store);
    let generator = OpenAiGenerator::new(config.openai_config())
      .context("failed to set up the generator client")?;
    let engine = Engine::new(store.clone(), Arc::new(generator), config.engine_config());
    Ok(Self { store, engine, config })
  }

  // ── Fragments ───────────────────────────────────────────────────────────

  pub async fn add(&self, content: &str, tags: Vec<String>) -> Result<()> {
    let fragment = self
      .store
      .add_fragment(NewFragment { content: content.to_owned(), tags })
      .await
      .context("failed to add fragment")?;
    println!("Fragment added with ID: {}", fragment.fragment_id);
    Ok(())
  }

  pub async fn fragment_list(&self, unprocessed: bool) -> Result<()> {
    let filter = if unprocessed { FragmentFilter::Unlinked } else { FragmentFilter::All };
    let fragments = self.store.list_fragments(filter).await?;
    if fragments.is_empty() {
      println!("No fragments found.");
      return Ok(());
    }
    println!("ID\tContent\tCreated At");
    println!("--\t-------\t----------");
    for f in fragments {
      println!("{}\t{}\t{}", f.fragment_id, f.content, f.created_at.format(DATE_FORMAT));
    }
    Ok(())
  }

  pub async fn fragment_delete(&self, id: i64, reason: Option<String>) -> Result<()> {
    let removals = self
      .store
      .delete_fragments(vec![id], reason)
      .await
      .with_context(|| format!("failed to delete fragment {id}"))?;
    println!("Deleted {} fragment(s).", removals.len());
    Ok(())
  }

  // ── Synthesis & compression ─────────────────────────────────────────────

  pub async fn process(&self, dry_run: bool, doc: Option<&str>, ai: bool) -> Result<()> {
    if let Some(reference) = doc {
      return self.refresh(DocumentRef::parse(reference), dry_run, ai).await;
    }

    if !ai {
      let pending = self.engine.unprocessed_fragments().await?;
      println!("{} unprocessed fragment(s).", pending.len());
      if !pending.is_empty() {
        println!("Run `insight process --ai` to synthesize them.");
      }
      return Ok(());
    }

    if dry_run {
      let plan = self.engine.plan_synthesis().await?;
      println!("Dry run: {} unprocessed fragment(s).", plan.fragments);
      for (i, group) in plan.groups.iter().enumerate() {
        println!("Group {i} ({} fragments): {}", group.fragment_ids.len(), group.analysis);
        for candidate in &group.candidates {
          println!("- Would create {:?} from {:?}", candidate.title, candidate.fragment_ids);
        }
        for rejected in &group.rejected {
          println!("- Would skip candidate {}: {}", rejected.index, rejected.reason);
        }
      }
      return Ok(());
    }

    let report = self.engine.synthesize().await?;
    print_synthesis(&report);
    Ok(())
  }

  async fn refresh(&self, reference: DocumentRef, preview: bool, ai: bool) -> Result<()> {
    if !ai {
      let document = self
        .store
        .find_document(reference.clone())
        .await?
        .with_context(|| format!("document not found: {reference}"))?;
      println!(
        "Would regenerate #{} {:?}; add --ai to call the generator.",
        document.document_id, document.title
      );
      return Ok(());
    }

    match self.engine.refresh_document(reference, preview).await? {
      RefreshOutcome::Updated { document } => {
        println!("Updated #{} {:?}.", document.document_id, document.title);
      }
      RefreshOutcome::NoFragments { document } => {
        println!("#{} {:?} has no fragments; left unchanged.", document.document_id, document.title);
      }
      RefreshOutcome::Preview { document, revision } => {
        println!("Preview for #{}:\n", document.document_id);
        println!("# {}\n\n{}\n\n{}", revision.title, revision.summary, revision.content);
      }
    }
    Ok(())
  }

  pub async fn compress(&self, dry_run: bool) -> Result<()> {
    let outcome = if dry_run {
      self.engine.plan_compression().await?
    } else {
      self.engine.compress().await?
    };
    let report = match outcome {
      CompressionOutcome::NotEnoughFragments { count } => {
        println!("Only {count} fragment(s); nothing to compress.");
        return Ok(());
      }
      CompressionOutcome::Analyzed(report) => report,
    };

    println!("{}", report.summary);
    println!(
      "{} fragment(s), removal budget {} ({}%).",
      report.fragment_count, report.budget, self.config.compression.max_removal_percent
    );
    if report.dry_run {
      for (index, action) in &report.planned {
        println!(
          "- Would apply action {index} ({}) to {:?}: {}",
          action.kind(),
          action.fragment_ids(),
          action.reason()
        );
      }
    } else {
      for applied in &report.applied {
        println!(
          "- Applied {} {:?}: {} removed",
          applied.action.kind(),
          applied.action.fragment_ids(),
          applied.removals.len()
        );
      }
      println!("Removed {} fragment(s).", report.removed());
    }
    for skipped in &report.skipped {
      println!("- Skipped action {} ({}): {}", skipped.index, skipped.action.kind(), skipped.reason);
    }
    Ok(())
  }

  // ── Documents & tags ────────────────────────────────────────────────────

  pub async fn doc_list(&self) -> Result<()> {
    let documents = self.store.list_documents().await?;
    if documents.is_empty() {
      println!("No documents found.");
      return Ok(());
    }
    print_documents(&documents);
    Ok(())
  }

  pub async fn doc_show(&self, reference: &str) -> Result<()> {
    let reference = DocumentRef::parse(reference);
    let document = self
      .store
      .find_document(reference.clone())
      .await?
      .with_context(|| format!("document not found: {reference}"))?;
    let detail = self
      .store
      .document_detail(document.document_id)
      .await?
      .with_context(|| format!("document not found: {reference}"))?;
    print!("{}", export::render_markdown(&detail));
    Ok(())
  }

  pub async fn doc_versions(&self, version: Option<&str>) -> Result<()> {
    let Some(raw) = version else {
      let versions = self.store.list_versions().await?;
      if versions.is_empty() {
        println!("No versions yet.");
      }
      for v in versions {
        println!("{v}");
      }
      return Ok(());
    };

    let at = DateTime::parse_from_rfc3339(raw)
      .with_context(|| format!("not an RFC 3339 timestamp: {raw}"))?;
    let version = VersionStamp::from_datetime(at.with_timezone(&Utc));
    let details = self.store.documents_in_version(version).await?;
    if details.is_empty() {
      println!("No documents in version {version}.");
      return Ok(());
    }
    let documents: Vec<Document> = details.into_iter().map(|d| d.document).collect();
    print_documents(&documents);
    Ok(())
  }

  pub async fn tag_list(&self) -> Result<()> {
    let tags = self.store.list_tags().await?;
    if tags.is_empty() {
      println!("No tags found.");
      return Ok(());
    }
    println!("ID\tTag\tCount");
    println!("--\t---\t-----");
    for t in tags {
      println!("{}\t{}\t{}", t.tag.tag_id, t.tag.name, t.document_count);
    }
    Ok(())
  }

  pub async fn find_by_tag(&self, tag: String) -> Result<()> {
    let documents = self.store.documents_by_tag(tag.clone()).await?;
    if documents.is_empty() {
      println!("No documents found with tag: {tag}");
      return Ok(());
    }
    println!("Found {} document(s) with tag '{tag}':\n", documents.len());
    print_documents(&documents);
    Ok(())
  }

  pub async fn find_by_query(&self, query: String) -> Result<()> {
    if query.trim().is_empty() {
      bail!("search query must not be empty");
    }
    let documents = self.store.search_documents(query.clone()).await?;
    if documents.is_empty() {
      println!("No documents found matching query: {query}");
      return Ok(());
    }
    println!("Found {} document(s) matching '{query}':\n", documents.len());
    print_documents(&documents);
    Ok(())
  }

  pub async fn status(&self) -> Result<()> {
    let status = self.store.status().await?;
    println!("Documents: {}", status.documents);
    println!("Total Fragments: {}", status.fragments);
    println!("Unprocessed Fragments: {}", status.unlinked_fragments);
    println!("Tags: {}", status.tags);
    println!("Pending Questions: {}", status.pending_questions);
    println!("Versions: {}", status.versions);
    Ok(())
  }

  // ── Bulk ────────────────────────────────────────────────────────────────

  pub async fn clear(&self, confirm: bool) -> Result<()> {
    require_confirmation(confirm, "clear", "deletes all fragments, documents and questions")?;
    let summary = self.store.clear_all().await?;
    println!(
      "Cleared {} document(s), {} fragment(s), {} tag(s), {} question(s).",
      summary.documents, summary.fragments, summary.tags, summary.questions
    );
    Ok(())
  }

  pub async fn reset(&self, confirm: bool, rebuild: bool) -> Result<()> {
    require_confirmation(confirm, "reset", "deletes all documents")?;
    let summary = self.store.reset_documents().await?;
    println!("Deleted {} document(s) and {} tag(s).", summary.documents, summary.tags);
    if rebuild {
      let report = self.engine.synthesize().await?;
      print_synthesis(&report);
    }
    Ok(())
  }

  pub async fn export(&self, dir: &Path) -> Result<()> {
    let written = export::export_documents(self.store.as_ref(), dir).await?;
    if written.is_empty() {
      println!("No documents to export.");
      return Ok(());
    }
    for path in &written {
      println!("- Exported: {}", path.display());
    }
    println!("Export completed! {} file(s) created in {}", written.len(), dir.display());
    Ok(())
  }

  // ── Questions & QA ──────────────────────────────────────────────────────

  pub async fn question_list(&self, pending: bool) -> Result<()> {
    let questions = self.store.list_questions(pending).await?;
    if questions.is_empty() {
      println!("{}", if pending { "No pending questions found." } else { "No questions found." });
      return Ok(());
    }
    println!("ID\tStatus\tQuestion\tCreated At");
    println!("--\t------\t--------\t----------");
    for q in questions {
      println!(
        "{}\t{}\t{}\t{}",
        q.question_id,
        q.status.as_str(),
        q.question_text,
        q.created_at.format(DATE_FORMAT)
      );
    }
    Ok(())
  }

  pub async fn question_archive(&self, id: i64) -> Result<()> {
    self.engine.archive_question(id).await?;
    println!("Question {id} archived.");
    Ok(())
  }

  pub async fn answer(&self, question_id: i64, text: &str) -> Result<()> {
    let (_, fragment) = self.engine.answer_question(question_id, text).await?;
    println!(
      "Question {question_id} answered successfully with fragment ID {}",
      fragment.fragment_id
    );
    Ok(())
  }

  pub async fn ask(&self, question: &str, scope: AskScope, web_search: bool) -> Result<()> {
    if let AskScope::Matching(term) = &scope {
      println!("Searching documents for {term:?}.\n");
    }
    let response = self.engine.ask(question, scope, web_search).await?;
    println!("{}", response.answer);
    if !response.sources.is_empty() {
      println!("\nSources:");
      for source in &response.sources {
        println!("- {source}");
      }
    }
    Ok(())
  }

  // ── Server ──────────────────────────────────────────────────────────────

  pub async fn serve(self, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| self.config.server.host.clone());
    let port = port.unwrap_or(self.config.server.port);

    let app = axum::Router::new()
      .nest("/api", insight_api::api_router(AppState::new(self.engine)))
      .layer(TraceLayer::new_for_http());
    let address = format!("{host}:{port}");

    tracing::info!("Listening on http://{address}/api");
    let listener = TcpListener::bind(&address)
      .await
      .with_context(|| format!("failed to bind {address}"))?;

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
  }
}
