//! `insight`: capture fragments, synthesize them into documents, ask
//! questions about what you know.
//!
//! # Usage
//!
//! ```
//! insight add "Tokio tasks are cheap to spawn" --tag rust
//! insight process --ai
//! insight ask "What do I know about async Rust?"
//! insight ask "How do moves work?" --query ownership
//! insight --config ~/.config/insight/insight.toml serve --port 8080
//! ```
//!
//! Exit status is 0 on success, 1 when a command fails and 2 when the
//! arguments do not parse.

mod app;
mod export;
mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use insight_engine::AskScope;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::{app::App, settings::AppConfig};

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "insight", version, about = "Personal knowledge base built from fragments")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, global = true, default_value = "insight.toml")]
  config: PathBuf,

  /// Database file; overrides `db_path` from the configuration.
  #[arg(long, global = true)]
  db: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Capture a new fragment.
  Add {
    /// Fragment text; several words are joined with spaces.
    #[arg(required = true, num_args = 1..)]
    content: Vec<String>,
    /// Tag to attach; repeatable.
    #[arg(short, long = "tag")]
    tags:    Vec<String>,
  },

  /// Synthesize unprocessed fragments into documents.
  Process {
    /// Ask the generator but write nothing.
    #[arg(long)]
    dry_run: bool,
    /// Regenerate one existing document (id or exact title) instead.
    #[arg(long, value_name = "ID_OR_TITLE")]
    doc:     Option<String>,
    /// Call the text-generation service. Without it, only report what would
    /// be processed.
    #[arg(long)]
    ai:      bool,
  },

  /// Merge or delete redundant fragments.
  Compress {
    #[arg(long)]
    dry_run: bool,
  },

  /// Browse documents.
  #[command(subcommand)]
  Doc(DocCommand),

  /// Browse tags.
  #[command(subcommand)]
  Tag(TagCommand),

  /// Find documents by tag or text.
  Find(FindArgs),

  /// Show row counts.
  Status,

  /// Inspect or remove fragments.
  #[command(subcommand)]
  Fragment(FragmentCommand),

  /// Delete everything: fragments, documents, tags and questions.
  Clear {
    #[arg(long)]
    confirm: bool,
  },

  /// Delete all documents; fragments stay and become unprocessed again.
  Reset {
    #[arg(long)]
    confirm: bool,
    /// Run synthesis again right after the reset.
    #[arg(long)]
    rebuild: bool,
  },

  /// Write every document as Markdown.
  Export {
    #[arg(long, default_value = "./exports")]
    dir: PathBuf,
  },

  /// Questions raised during synthesis.
  #[command(subcommand)]
  Question(QuestionCommand),

  /// Answer a pending question; the answer becomes a new fragment.
  Answer {
    question_id: i64,
    #[arg(required = true, num_args = 1..)]
    text:        Vec<String>,
  },

  /// Ask a question about the knowledge base.
  Ask {
    question: String,
    /// Allow the generator to search the web.
    #[arg(long)]
    search:   bool,
    /// Answer from one document instead of the latest generation.
    #[arg(long, value_name = "ID", conflicts_with = "query")]
    doc:      Option<i64>,
    /// Answer from the documents matching a search term.
    #[arg(long, value_name = "TERM")]
    query:    Option<String>,
  },

  /// Serve the JSON API.
  Serve {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
  },
}

#[derive(Subcommand, Debug)]
enum DocCommand {
  List,
  Show {
    #[arg(value_name = "ID_OR_TITLE")]
    reference: String,
  },
  /// List version batches, or the documents of one batch.
  Versions {
    /// RFC 3339 stamp as printed by `doc versions`.
    #[arg(long)]
    stamp: Option<String>,
  },
}

#[derive(Subcommand, Debug)]
enum TagCommand {
  List,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct FindArgs {
  #[arg(long)]
  tag:   Option<String>,
  #[arg(long)]
  query: Option<String>,
}

#[derive(Subcommand, Debug)]
enum FragmentCommand {
  List {
    /// Only fragments no document links to yet.
    #[arg(long)]
    unprocessed: bool,
  },
  Delete {
    id:     i64,
    #[arg(long)]
    reason: Option<String>,
  },
}

#[derive(Subcommand, Debug)]
enum QuestionCommand {
  List {
    #[arg(long)]
    pending: bool,
  },
  Archive {
    id: i64,
  },
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr; stdout carries command output.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let mut cfg = AppConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
  if let Some(db) = cli.db {
    cfg.db_path = settings::expand_tilde(&db);
  }

  let app = App::open(cfg).await?;

  match cli.command {
    Command::Add { content, tags } => app.add(&content.join(" "), tags).await,
    Command::Process { dry_run, doc, ai } => app.process(dry_run, doc.as_deref(), ai).await,
    Command::Compress { dry_run } => app.compress(dry_run).await,
    Command::Doc(DocCommand::List) => app.doc_list().await,
    Command::Doc(DocCommand::Show { reference }) => app.doc_show(&reference).await,
    Command::Doc(DocCommand::Versions { stamp }) => app.doc_versions(stamp.as_deref()).await,
    Command::Tag(TagCommand::List) => app.tag_list().await,
    Command::Find(FindArgs { tag: Some(tag), .. }) => app.find_by_tag(tag).await,
    Command::Find(FindArgs { query, .. }) => app.find_by_query(query.unwrap_or_default()).await,
    Command::Status => app.status().await,
    Command::Fragment(FragmentCommand::List { unprocessed }) => app.fragment_list(unprocessed).await,
    Command::Fragment(FragmentCommand::Delete { id, reason }) => {
      app.fragment_delete(id, reason).await
    }
    Command::Clear { confirm } => app.clear(confirm).await,
    Command::Reset { confirm, rebuild } => app.reset(confirm, rebuild).await,
    Command::Export { dir } => app.export(&dir).await,
    Command::Question(QuestionCommand::List { pending }) => app.question_list(pending).await,
    Command::Question(QuestionCommand::Archive { id }) => app.question_archive(id).await,
    Command::Answer { question_id, text } => app.answer(question_id, &text.join(" ")).await,
    Command::Ask { question, search, doc, query } => {
      let scope = match (doc, query) {
        (Some(id), _) => AskScope::Document(id),
        (None, Some(term)) => AskScope::Matching(term),
        (None, None) => AskScope::Latest,
      };
      app.ask(&question, scope, search).await
    }
    Command::Serve { host, port } => app.serve(host, port).await,
  }
}

#[cfg(test)]
mod tests {
  use clap::CommandFactory as _;

  use super::*;

  #[test]
  fn cli_definition_is_consistent() { Cli::command().debug_assert(); }

  #[test]
  fn find_requires_exactly_one_filter() {
    assert!(Cli::try_parse_from(["insight", "find"]).is_err());
    assert!(Cli::try_parse_from(["insight", "find", "--tag", "a", "--query", "b"]).is_err());
    assert!(Cli::try_parse_from(["insight", "find", "--query", "rust"]).is_ok());
  }

  #[test]
  fn add_joins_words_and_collects_tags() {
    let cli = Cli::try_parse_from(["insight", "add", "cats", "purr", "-t", "pets", "--tag", "cats"])
      .unwrap();
    match cli.command {
      Command::Add { content, tags } => {
        assert_eq!(content.join(" "), "cats purr");
        assert_eq!(tags, ["pets", "cats"]);
      }
      other => panic!("unexpected command: {other:?}"),
    }
  }

  #[test]
  fn ask_takes_a_document_or_a_query() {
    let cli = Cli::try_parse_from(["insight", "ask", "What moves?", "--query", "ownership"])
      .unwrap();
    match cli.command {
      Command::Ask { query, doc, .. } => {
        assert_eq!(query.as_deref(), Some("ownership"));
        assert_eq!(doc, None);
      }
      other => panic!("unexpected command: {other:?}"),
    }
    assert!(
      Cli::try_parse_from(["insight", "ask", "q", "--doc", "1", "--query", "x"]).is_err()
    );
  }

  #[test]
  fn flag_errors_exit_with_status_two() {
    let err = Cli::try_parse_from(["insight", "process", "--bogus"]).unwrap_err();
    assert_eq!(err.exit_code(), 2);
  }
}
