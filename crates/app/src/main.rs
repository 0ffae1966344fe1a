use chrono::Utc;
use clap::{Parser, Subcommand};
use report_qa_core::{
    ingest_report, ChunkIndex, ChunkingOptions, HttpEmbedder, HttpReranker, OllamaGenerator,
    QueryPipeline, RetrievalOptions, SqliteChunkIndex,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "report-qa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Report PDF to ingest.
    #[arg(long, env = "REPORT_QA_SOURCE", default_value = "data/annual_report.pdf")]
    source: PathBuf,

    /// Directory holding the persistent chunk index.
    #[arg(long, env = "REPORT_QA_INDEX_DIR", default_value = ".report-index")]
    index_dir: PathBuf,

    /// Embedding service base URL.
    #[arg(long, default_value = "http://localhost:8080")]
    embedding_url: String,

    /// Cross-encoder rerank service base URL.
    #[arg(long, default_value = "http://localhost:8081")]
    rerank_url: String,

    /// Ollama-compatible generation service base URL.
    #[arg(long, default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Generation model name.
    #[arg(long, default_value = "mistral")]
    generator_model: String,

    /// Candidates fetched by similarity search before reranking.
    #[arg(long, default_value = "25")]
    candidates: usize,

    /// Chunks kept after reranking and cited as sources.
    #[arg(long, default_value = "5")]
    top_n: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Convert, chunk and index the report. Re-runs add only missing chunks.
    Ingest {
        /// Wipe the whole index before ingesting. Destructive.
        #[arg(long, default_value_t = false)]
        reset: bool,
    },
    /// Ask a question against the indexed report.
    Query {
        /// The question text.
        question: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "report-qa boot"
    );

    let embedder = HttpEmbedder::new(&cli.embedding_url)?;

    match cli.command {
        Command::Ingest { reset } => {
            let index = SqliteChunkIndex::open(&cli.index_dir, embedder).await?;

            if reset {
                println!("Clearing index");
                index.reset().await?;
            }

            println!(
                "Loading and converting {} ... (this may take a while)",
                cli.source.display()
            );

            match ingest_report(&cli.source, &index, &ChunkingOptions::default()).await? {
                None => {
                    println!("Error: report not found at {}", cli.source.display());
                }
                Some(report) => {
                    println!("Split the report into {} chunks", report.total_chunks);
                    println!(
                        "Number of existing documents in index: {}",
                        report.existing
                    );
                    if report.added > 0 {
                        println!("Adding {} new documents...", report.added);
                    } else {
                        println!("No new documents to add");
                    }
                }
            }
        }
        Command::Query { question } => {
            let index = SqliteChunkIndex::open(&cli.index_dir, embedder.clone()).await?;
            let reranker = HttpReranker::new(&cli.rerank_url)?;
            let generator = OllamaGenerator::new(&cli.ollama_url, &cli.generator_model)?;
            let options = RetrievalOptions {
                candidate_k: cli.candidates,
                top_n: cli.top_n,
            };

            let pipeline = QueryPipeline::new(embedder, index, reranker, generator, options);
            let answer = pipeline.answer(&question).await?;

            println!("Response: {}", answer.text);
            println!("Sources: {:?}", answer.sources);
        }
    }

    Ok(())
}
