//! Tutor CLI - offline tooling for the curriculum index
//!
//! Subcommands:
//! - `build`: segment and embed a source document into an index bundle
//! - `query`: run a retrieval against a bundle
//! - `inspect`: print bundle and embedding statistics
//! - `ask`: retrieve and generate a tutor reply (or print the prompt)

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use retrieval_core::{
    provider_from_config, validate_k, IndexBuilder, IndexBundle, OpenAiCompletion,
    PromptTemplate, Retriever, Tutor, TutorConfig,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "tutor-cli")]
#[command(about = "Build, inspect and query the EduGen curriculum index")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "TUTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build an index bundle from a PDF or text document
    Build {
        /// Source document (.pdf or plain text)
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory (defaults to retrieval.artifacts_dir)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Retrieve the passages nearest to a query
    Query {
        /// Bundle directory (defaults to retrieval.artifacts_dir)
        #[arg(short, long)]
        artifacts: Option<PathBuf>,

        #[arg(short, long)]
        query: String,

        /// Passages to return (defaults to retrieval.top_k)
        #[arg(short = 'k', long, allow_negative_numbers = true)]
        top_k: Option<i64>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print bundle metadata and embedding statistics
    Inspect {
        #[arg(short, long)]
        artifacts: Option<PathBuf>,

        /// Also list every passage
        #[arg(long)]
        passages: bool,
    },

    /// Ask the tutor a question (or for a topic overview)
    Ask {
        #[arg(short, long)]
        artifacts: Option<PathBuf>,

        /// The student's question
        #[arg(short, long, required_unless_present = "overview")]
        question: Option<String>,

        /// Topic the question belongs to
        #[arg(short, long)]
        topic: Option<String>,

        /// Generate an overview of --topic instead of answering
        #[arg(long, requires = "topic")]
        overview: bool,

        /// Only print the assembled prompt (skip the completion call)
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Serialize)]
struct InspectReport<'a> {
    model: &'a str,
    passages: usize,
    stats: retrieval_core::IndexStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = TutorConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Build { input, out } => {
            let out = out.unwrap_or_else(|| config.retrieval.artifacts_dir.clone());
            build(&config, &input, &out).await
        }
        Command::Query {
            artifacts,
            query,
            top_k,
            json,
        } => {
            let dir = artifacts.unwrap_or_else(|| config.retrieval.artifacts_dir.clone());
            let top_k = match top_k {
                Some(k) => validate_k(k)?,
                None => config.retrieval.top_k,
            };
            run_query(&config, &dir, &query, top_k, json).await
        }
        Command::Inspect {
            artifacts,
            passages,
        } => {
            let dir = artifacts.unwrap_or_else(|| config.retrieval.artifacts_dir.clone());
            inspect(&dir, passages)
        }
        Command::Ask {
            artifacts,
            question,
            topic,
            overview,
            dry_run,
        } => {
            let dir = artifacts.unwrap_or_else(|| config.retrieval.artifacts_dir.clone());
            ask(&config, &dir, question, topic, overview, dry_run).await
        }
    }
}

async fn build(config: &TutorConfig, input: &Path, out: &Path) -> Result<()> {
    let embedder = provider_from_config(&config.embedding)
        .await
        .context("failed to initialise embedding provider")?;
    let builder = IndexBuilder::new(embedder, config.embedding.batch_size);

    let summary = builder
        .build_from_file(input, out)
        .await
        .with_context(|| format!("failed to build index from {}", input.display()))?;

    info!(
        "Built {} passages (dim {}, model {}) into {}",
        summary.passages,
        summary.dimension,
        summary.model,
        summary.out_dir.display()
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn load_retriever(config: &TutorConfig, dir: &Path) -> Result<Retriever> {
    let bundle = IndexBundle::load(dir)
        .with_context(|| format!("failed to load index bundle from {}", dir.display()))?;
    let embedder = provider_from_config(&config.embedding)
        .await
        .context("failed to initialise embedding provider")?;
    Ok(Retriever::from_bundle(
        bundle,
        embedder,
        config.retrieval.allow_model_mismatch,
    )?)
}

async fn run_query(
    config: &TutorConfig,
    dir: &Path,
    query: &str,
    top_k: usize,
    json: bool,
) -> Result<()> {
    let retriever = load_retriever(config, dir).await?;
    let results = retriever.retrieve(query, top_k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. [id {}] score={:.4} distance={:.4}\n   {}",
            rank + 1,
            result.passage.id,
            result.score,
            result.distance,
            preview(&result.passage.text, 160)
        );
    }
    Ok(())
}

fn inspect(dir: &Path, list_passages: bool) -> Result<()> {
    let bundle = IndexBundle::load(dir)
        .with_context(|| format!("failed to load index bundle from {}", dir.display()))?;

    let report = InspectReport {
        model: &bundle.model,
        passages: bundle.corpus.len(),
        stats: bundle.index.stats(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if list_passages {
        for passage in bundle.corpus.passages() {
            println!("{:>5}  {}", passage.id, preview(&passage.text, 100));
        }
    }
    Ok(())
}

async fn ask(
    config: &TutorConfig,
    dir: &Path,
    question: Option<String>,
    topic: Option<String>,
    overview: bool,
    dry_run: bool,
) -> Result<()> {
    let retriever = load_retriever(config, dir).await?;
    let completion = Arc::new(OpenAiCompletion::from_config(&config.completion)?);
    let tutor = Tutor::new(retriever, completion, config.retrieval.top_k);

    let (query, template) = match (overview, topic, question) {
        (true, Some(topic), _) => (Tutor::overview_query(&topic), PromptTemplate::overview(topic)),
        (false, topic, Some(question)) => (question, PromptTemplate::qa(topic)),
        _ => bail!("either --question or --overview with --topic is required"),
    };

    if dry_run {
        let (prompt, _) = tutor.prepare(&query, &template).await?;
        println!("{}", prompt);
        return Ok(());
    }

    let reply = match template.mode {
        retrieval_core::PromptMode::Overview => {
            tutor.overview(template.topic.as_deref().unwrap_or_default()).await?
        }
        retrieval_core::PromptMode::Qa => tutor.answer(&query, template.topic.as_deref()).await?,
    };

    println!("{}", reply.text);
    info!(
        "Grounded on passages {:?}",
        reply.passages.iter().map(|r| r.passage.id).collect::<Vec<_>>()
    );
    Ok(())
}

/// First `max` characters of `text`, on a char boundary
fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("ééééé", 2), "éé...");
    }

    #[test]
    fn test_ask_overview_requires_topic() {
        let parsed = Cli::try_parse_from(["tutor-cli", "ask", "--overview"]);
        assert!(parsed.is_err());

        let parsed =
            Cli::try_parse_from(["tutor-cli", "ask", "--overview", "--topic", "Magnets"]);
        assert!(parsed.is_ok());
    }

    #[test]
    fn test_query_accepts_negative_k_for_validation() {
        let cli = Cli::try_parse_from(["tutor-cli", "query", "-q", "light", "-k", "-2"]).unwrap();
        match cli.command {
            Command::Query { top_k, .. } => {
                assert_eq!(top_k, Some(-2));
                assert!(validate_k(-2).is_err());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
