//! Report analyst command line
//!
//! Reads plain-text reports, runs the full analysis pipeline and prints the
//! structured outcome as JSON on stdout. Logs go to stderr.

use analysis_engine::{AnalysisConfig, AnalysisEngine, AnalysisRequest, Deadline, DocumentInput};
use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use shared_types::GuardianshipOption;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Page separator in extracted text files
const PAGE_BREAK: char = '\u{000C}';

#[derive(Parser, Debug)]
#[command(name = "report-analyst")]
#[command(
    version,
    about = "Bias, contradiction and goal-alignment analysis for guardianship reports"
)]
struct Args {
    /// Document to analyse as LABEL=PATH (repeatable); pages split on form feeds
    #[arg(short, long = "doc", value_name = "LABEL=PATH", required = true)]
    docs: Vec<String>,

    /// Rule file to use instead of the built-in rules
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Guardianship option(s) to score goals for
    #[arg(short, long, value_enum, default_value = "both")]
    option: OptionArg,

    /// Stop scanning after this many milliseconds and return partial results
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OptionArg {
    Family,
    PublicGuardian,
    Both,
}

impl OptionArg {
    fn options(self) -> Vec<GuardianshipOption> {
        match self {
            OptionArg::Family => vec![GuardianshipOption::Family],
            OptionArg::PublicGuardian => vec![GuardianshipOption::PublicGuardian],
            OptionArg::Both => vec![GuardianshipOption::Family, GuardianshipOption::PublicGuardian],
        }
    }
}

/// Split "LABEL=PATH" at the first '='
fn parse_doc_arg(arg: &str) -> Result<(String, PathBuf)> {
    let Some((label, path)) = arg.split_once('=') else {
        bail!("expected LABEL=PATH, got '{}'", arg);
    };
    let label = label.trim();
    if label.is_empty() || path.trim().is_empty() {
        bail!("expected LABEL=PATH, got '{}'", arg);
    }
    Ok((label.to_string(), PathBuf::from(path.trim())))
}

/// Build a document from extracted text, one page per form-feed section
fn document_from_text(label: &str, text: &str) -> DocumentInput {
    let pages: Vec<&str> = text.split(PAGE_BREAK).collect();
    if pages.len() > 1 {
        DocumentInput::from_pages(label, &pages)
    } else {
        DocumentInput::new(label, text)
    }
}

/// Parse every `--doc` argument; labels become document ids and must be unique
fn parse_doc_args(args: &[String]) -> Result<Vec<(String, PathBuf)>> {
    let mut seen = HashSet::new();
    let mut parsed = Vec::with_capacity(args.len());
    for arg in args {
        let (label, path) = parse_doc_arg(arg)?;
        if !seen.insert(label.clone()) {
            bail!("document label '{}' is given more than once", label);
        }
        parsed.push((label, path));
    }
    Ok(parsed)
}

async fn load_documents(args: &[String]) -> Result<Vec<DocumentInput>> {
    let mut handles = Vec::with_capacity(args.len());
    for (label, path) in parse_doc_args(args)? {
        handles.push(tokio::spawn(async move {
            let text = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            tracing::info!(label = %label, path = %path.display(), chars = text.chars().count(), "Loaded document");
            Ok::<_, anyhow::Error>(document_from_text(&label, &text))
        }));
    }

    let mut documents = Vec::with_capacity(handles.len());
    for handle in handles {
        documents.push(handle.await??);
    }
    Ok(documents)
}

fn load_config(rules: Option<&PathBuf>) -> Result<AnalysisConfig> {
    let config = match rules {
        Some(path) => AnalysisConfig::from_file(path),
        None => AnalysisConfig::from_env(),
    };
    config.context("failed to load rule configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the JSON result, so logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting report analyst v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(args.rules.as_ref())?;
    tracing::info!(version = %config.version, "Rules loaded");
    let engine = AnalysisEngine::new(Arc::new(config));

    let documents = load_documents(&args.docs).await?;
    let deadline = args
        .deadline_ms
        .map(|ms| Deadline::after(Duration::from_millis(ms)))
        .unwrap_or_default();
    let request = AnalysisRequest::new(documents)
        .with_options(args.option.options())
        .with_deadline(deadline);

    // Pattern scanning is CPU-bound
    let outcome = tokio::task::spawn_blocking(move || engine.analyze(&request)).await?;

    for failure in &outcome.failures {
        tracing::warn!(document = %failure.label, error = %failure.error, "Document skipped");
    }

    let json = if args.pretty {
        serde_json::to_string_pretty(&outcome)?
    } else {
        serde_json::to_string(&outcome)?
    };
    println!("{}", json);

    Ok(())
}
