//! Interactive question loop against one indexed document
//!
//! Run with: cargo run -p codex-rag --features cli --bin codex-ask -- --ingest notes.txt

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use console::style;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use codex_rag::{
    providers::ollama_providers, retrieval::VectorIndex, CitationQueryEngine, CitationSummary,
    CitedResponse, Error, QueryOutcome, RagConfig, StreamEvent, SynthesisMode,
};

#[derive(Parser)]
#[command(
    name = "codex-ask",
    version,
    about = "Ask questions about a document and get cited answers"
)]
struct Cli {
    #[arg(long, help = "Configuration file path (defaults to $CODEX_CONFIG)")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Document id to ask about")]
    document: Option<String>,

    #[arg(long, value_name = "FILE", help = "Index a text file first and ask about it")]
    ingest: Option<PathBuf>,

    #[arg(long, help = "Wait for the whole answer instead of streaming it")]
    buffered: bool,

    #[arg(short, long, help = "Enable verbose logging")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "codex_rag=debug" } else { "codex_rag=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => RagConfig::load(path)?,
        None => RagConfig::from_env()?,
    };

    let (llm, embedder) = ollama_providers(&config.llm)?;
    let storage = &config.index.storage_path;

    let index = if cli.ingest.is_some() {
        VectorIndex::open_or_create(storage, embedder, &config.retrieval)?
    } else {
        match VectorIndex::load(storage, embedder, &config.retrieval) {
            Err(Error::IndexUnavailable(_)) => {
                bail!("Index not found at {}. Run with --ingest <FILE> first.", storage.display())
            }
            other => other?,
        }
    };

    let document_id = match &cli.ingest {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            let document = index.add_document(&name, &text).await?;
            println!(
                "{} {} ({} passages) as {}",
                style("Indexed").green().bold(),
                document.name,
                document.passage_count,
                style(&document.id).dim()
            );
            document.id
        }
        None => pick_document(&index, cli.document.as_deref())?,
    };

    let engine = CitationQueryEngine::new(Arc::new(index), llm, &config)?;
    let mode = if cli.buffered {
        SynthesisMode::Buffered
    } else {
        SynthesisMode::Streaming
    };

    println!("\n{}", style(&config.voice.greeting).cyan());
    println!("{}", style("Type 'exit' to quit.").dim());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n{} ", style(">").bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        if let Err(e) = ask(&engine, question, &document_id, mode).await {
            eprintln!("{} {}", style("error:").red().bold(), e);
        }
    }

    Ok(())
}

fn pick_document(index: &VectorIndex, requested: Option<&str>) -> anyhow::Result<String> {
    if let Some(id) = requested {
        return Ok(index.get_document(id)?.id);
    }

    let documents = index.list_documents();
    match documents.as_slice() {
        [only] => Ok(only.id.clone()),
        [] => bail!("The index is empty. Run with --ingest <FILE> first."),
        many => {
            eprintln!("Several documents are indexed; pick one with --document:");
            for doc in many {
                eprintln!("  {}  {}", doc.id, doc.name);
            }
            bail!("No document selected")
        }
    }
}

async fn ask(
    engine: &CitationQueryEngine,
    question: &str,
    document_id: &str,
    mode: SynthesisMode,
) -> anyhow::Result<()> {
    match engine.query(question, document_id, mode).await? {
        QueryOutcome::Buffered(response) => print_response(&response),
        QueryOutcome::Streaming(mut answer) => {
            let mut stdout = std::io::stdout();
            while let Some(event) = answer.next().await {
                match event? {
                    StreamEvent::Text(text) => {
                        print!("{}", text);
                        stdout.flush()?;
                    }
                    StreamEvent::Separator => println!(),
                    StreamEvent::Completed(summary) => print_sources(&summary),
                }
            }
        }
    }
    Ok(())
}

fn print_response(response: &CitedResponse) {
    println!("{}", response.answer);
    print_sources(&response.summary);
    println!(
        "{}",
        style(format!(
            "{} sources, {}ms",
            response.chunks_retrieved, response.processing_time_ms
        ))
        .dim()
    );
}

fn print_sources(summary: &CitationSummary) {
    if let Some(err) = &summary.citation_error {
        println!("{} {}", style("citations rejected:").yellow(), err);
    }

    for source in &summary.sources {
        let location = source.location.as_deref().unwrap_or("");
        println!(
            "  {} {}",
            style(format!("[{}]", source.index)).cyan().bold(),
            style(location).dim()
        );
        println!("      {}", source.text.replace('\n', " "));
    }

    if !summary.rejected.is_empty() {
        println!("{} {:?}", style("dropped citations:").yellow(), summary.rejected);
    }
}
