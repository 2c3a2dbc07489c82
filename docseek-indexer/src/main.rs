use clap::{Parser, Subcommand};
use docseek_embed::{EmbedConfig, EmbeddingProvider, FallbackEmbedder, FastEmbedProvider};
use docseek_indexer::indexing::{
    DocumentIndex, IndexingOrchestrator, OrchestratorConfig, PlainTextExtractor,
};
use docseek_indexer::search::{QueryEngine, SearchFilters};
use docseek_indexer::storage::sqlite_store::SqliteVectorStore;
use docseek_indexer::storage::VectorStore;
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// Index a local document collection and search it semantically.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base directory containing the .docseek.db database file
    #[arg(short, long, default_value = ".")]
    base_dir: PathBuf,

    /// Use the deterministic hash embedder instead of the ONNX model
    /// (no model download; retrieval quality is degraded)
    #[arg(long)]
    fallback_embeddings: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import a file or folder into the index
    Import {
        /// File or folder to import
        path: PathBuf,
        /// Reindex even when fingerprints are unchanged
        #[arg(short, long)]
        force: bool,
        /// Maximum concurrent document pipelines
        #[arg(short, long, default_value_t = 4)]
        workers: usize,
    },
    /// Search the index
    Search {
        /// Query text
        query: String,
        /// Maximum number of results
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        /// Metadata filters as key=value pairs
        /// (filetype, folder, imported_after, imported_before)
        #[arg(long = "filter")]
        filters: Vec<String>,
        /// Output format
        #[arg(long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Delete all vector-store entries and index state
    Reset,
    /// Show index statistics
    Stats {
        /// Output format
        #[arg(long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

/// Dimension of the fallback embedder; matches the default ONNX model so
/// switching back does not force a rebuild.
const FALLBACK_DIMENSION: usize = 384;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let documents = DocumentIndex::open(&args.base_dir).await?;
    let store: Arc<dyn VectorStore> =
        Arc::new(SqliteVectorStore::new(documents.pool().clone()).await?);
    let provider: Arc<dyn EmbeddingProvider> = if args.fallback_embeddings {
        Arc::new(FallbackEmbedder::new(FALLBACK_DIMENSION))
    } else {
        Arc::new(FastEmbedProvider::create(EmbedConfig::default()).await?)
    };

    match args.command {
        Commands::Import {
            path,
            force,
            workers,
        } => {
            let orchestrator = IndexingOrchestrator::new(
                documents,
                Arc::clone(&store),
                provider,
                Arc::new(PlainTextExtractor),
                OrchestratorConfig::default().with_max_workers(workers),
            );

            if orchestrator.ensure_embedding_space().await? {
                let sweep = orchestrator.reindex_registered().await?;
                println!(
                    "Rebuilt index for new embedding space: {} reindexed, {} failed",
                    sweep.indexed, sweep.failed
                );
            }

            let metadata = tokio::fs::metadata(&path).await?;
            let report = if metadata.is_dir() {
                orchestrator.import_folder(&path, force).await?
            } else {
                let outcome = orchestrator.import_single(&path, force).await?;
                let mut report = docseek_indexer::indexing::ImportReport::default();
                report.record(outcome);
                report
            };

            println!(
                "Processed {} files: {} indexed, {} skipped, {} failed",
                report.processed, report.indexed, report.skipped, report.failed
            );
            Ok(())
        }
        Commands::Search {
            query,
            limit,
            filters,
            format,
        } => {
            let filters = SearchFilters::parse(&filters);
            let engine = QueryEngine::new(store, provider);
            let hits = engine.search(&query, limit, &filters).await?;

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&hits)?);
                }
                OutputFormat::Summary => {
                    println!("Found {} results:", hits.len());
                    for hit in hits {
                        let page = hit
                            .page
                            .map(|page| format!(" p.{page}"))
                            .unwrap_or_default();
                        println!(
                            "  {:.3} (raw {:.3} x{:.1}) {}{} | {}",
                            hit.final_score, hit.raw_score, hit.boost, hit.filename, page, hit.path
                        );
                        let preview = hit.text.chars().take(120).collect::<String>();
                        println!("      {}", preview.replace('\n', " "));
                    }
                }
            }
            Ok(())
        }
        Commands::Reset => {
            store.reset().await?;
            documents.clear_index_state().await?;
            println!("Index reset: all vectors and index state cleared");
            Ok(())
        }
        Commands::Stats { format } => {
            #[derive(Serialize)]
            struct StatsOutput {
                documents: usize,
                chunks: usize,
                embedding_dimension: Option<usize>,
            }

            let stats = StatsOutput {
                documents: documents.count().await?,
                chunks: store.count().await?,
                embedding_dimension: store.stored_dimension().await?,
            };

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                }
                OutputFormat::Summary => {
                    println!("Index statistics:");
                    println!("  Documents: {}", stats.documents);
                    println!("  Chunks: {}", stats.chunks);
                    match stats.embedding_dimension {
                        Some(dimension) => println!("  Embedding dimension: {dimension}"),
                        None => println!("  Embedding dimension: not recorded"),
                    }
                }
            }
            Ok(())
        }
    }
}
