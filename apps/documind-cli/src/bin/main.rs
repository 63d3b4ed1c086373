use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use documind_core::config::Config;
use documind_core::types::{AnswerResult, Document, RetrievedContext};
use documind_pipeline::Pipeline;

/// Extensions picked up when walking a directory. Files named explicitly are
/// always read.
const INGESTIBLE: &[&str] = &["pdf", "txt", "md", "markdown"];

/// Characters of each passage shown under "Sources:".
const SNIPPET_CHARS: usize = 160;

#[derive(Parser)]
#[command(name = "documind", version, about = "Ask questions about your documents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a new index from files or directories, replacing the current one.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Answer a question from the indexed documents.
    Ask {
        question: String,
        /// Print the full result, including retrieved context, as JSON.
        #[arg(long)]
        json: bool,
        /// Print only the answer, without the passages it was drawn from.
        #[arg(long)]
        no_sources: bool,
    },
    /// Show the persisted index.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;
    let settings = config.settings()?;
    let pipeline = Pipeline::from_settings(&settings)?;

    match cli.command {
        Command::Ingest { paths } => ingest(&pipeline, &paths).await,
        Command::Ask { question, json, no_sources } => ask(&pipeline, &question, json, !no_sources).await,
        Command::Status => {
            match pipeline.status() {
                Some(status) => println!("{}", serde_json::to_string_pretty(&status)?),
                None => println!("No index at {}", pipeline.store().location().display()),
            }
            Ok(())
        }
    }
}

async fn ingest(pipeline: &Pipeline, paths: &[PathBuf]) -> Result<()> {
    let files = collect_files(paths)?;
    if files.is_empty() {
        bail!("no ingestible files found");
    }
    let mut documents = Vec::with_capacity(files.len());
    for path in &files {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        documents.push(Document::new(path.display().to_string(), bytes));
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")?);
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message(format!("Processing {} document(s)", documents.len()));
    let result = pipeline.ingest(documents).await;
    spinner.finish_and_clear();

    let report = result?;
    println!(
        "✅ Indexed {} document(s): {} page(s), {} chunk(s), generation {}",
        report.documents, report.pages, report.chunks, report.generation
    );
    if report.empty_pages > 0 {
        println!("⚠️  {} page(s) had no extractable text", report.empty_pages);
    }
    Ok(())
}

async fn ask(pipeline: &Pipeline, question: &str, json: bool, sources: bool) -> Result<()> {
    let result = pipeline.answer(question).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    println!("{}", result.display_text());
    if let Some(context) = result.context().filter(|_| sources) {
        print!("{}", render_sources(context));
    }
    if let AnswerResult::Failed { .. } = result {
        std::process::exit(1);
    }
    Ok(())
}

/// Numbered passages with their similarity scores, one per line.
fn render_sources(context: &RetrievedContext) -> String {
    if context.passages.is_empty() {
        return String::new();
    }
    let mut out = String::from("\nSources:\n");
    for (rank, passage) in context.passages.iter().enumerate() {
        let flat = passage.text.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut snippet: String = flat.chars().take(SNIPPET_CHARS).collect();
        if flat.chars().count() > SNIPPET_CHARS {
            snippet.push('…');
        }
        out.push_str(&format!("  [{}] chunk {} (score {:.3}): {}\n", rank + 1, passage.position, passage.score, snippet));
    }
    out
}

fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            bail!("{} does not exist", path.display());
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if entry.file_type().is_file() && is_ingestible(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }
    debug!(count = files.len(), "collected files");
    Ok(files)
}

fn is_ingestible(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| INGESTIBLE.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}
