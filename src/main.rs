//! # DocForge CLI
//!
//! The `docforge` binary drives the ingestion pipeline and the query side.
//!
//! ## Usage
//!
//! ```bash
//! docforge --config ./config/docforge.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docforge ingest` | Load, chunk, embed and store all configured documents |
//! | `docforge search "<query>"` | Embed the query and print the nearest chunks |
//! | `docforge status` | Print the collection's point count |

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use docforge::config::{allowed_extensions, EmbeddingConfig, Settings, StoreConfig};
use docforge::embedding::{Embedder, OpenAiEmbedder};
use docforge::ingest::{IngestionPipeline, RunOutcome};
use docforge::loader::Loader;
use docforge::loader_fs::FilesystemLoader;
use docforge::loader_s3::S3Loader;
use docforge::search::search_store;
use docforge::store::{QdrantStore, VectorStore};

/// DocForge — document ingestion and chunking for vector knowledge bases.
#[derive(Parser)]
#[command(
    name = "docforge",
    about = "Document ingestion and chunking pipeline for vector knowledge bases",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docforge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingestion pipeline.
    ///
    /// Skipped when the collection already holds points, unless `--force`
    /// is given.
    Ingest {
        /// Ingest even if the collection is already populated.
        #[arg(long)]
        force: bool,
    },

    /// Semantic search over the stored chunks.
    Search {
        /// The query string.
        query: String,

        /// Maximum number of results.
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Show the collection's current point count.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;

    match cli.command {
        Commands::Ingest { force } => run_ingest(&settings, force).await,
        Commands::Search { query, limit } => run_search(&settings, &query, limit).await,
        Commands::Status => run_status(&settings).await,
    }
}

/// Build the configured document loader from `[data_source]`.
fn build_loader(settings: &Settings) -> Result<Box<dyn Loader>> {
    let allowed = allowed_extensions(settings);
    let kind = settings.get_str("data_source.kind", "local");
    match kind.as_str() {
        "local" => {
            let directory = settings.get_str("data_source.local.directory", "./data");
            Ok(Box::new(FilesystemLoader::new(directory, allowed)))
        }
        "s3" => {
            let bucket = settings.get_str("data_source.s3.bucket", "");
            if bucket.is_empty() {
                bail!("data_source.s3.bucket must be configured");
            }
            Ok(Box::new(S3Loader::new(
                bucket,
                settings.get_str("data_source.s3.prefix", ""),
                settings.get_str("data_source.s3.region", "us-east-1"),
                settings
                    .get("data_source.s3.endpoint_url")
                    .and_then(toml::Value::as_str)
                    .map(str::to_string),
                allowed,
            )?))
        }
        other => bail!("Unknown data source kind: {}", other),
    }
}

async fn run_ingest(settings: &Settings, force: bool) -> Result<()> {
    let loader = build_loader(settings)?;
    let embedder: Arc<dyn Embedder> =
        Arc::new(OpenAiEmbedder::new(EmbeddingConfig::from_settings(settings)?)?);
    let store = QdrantStore::connect(StoreConfig::from_settings(settings)?).await?;

    let pipeline = IngestionPipeline {
        loader,
        embedder,
        store: Box::new(store),
        settings: settings.clone(),
        module: settings.get_str("chunking.module", "nolib"),
        batch_size: settings.get_usize("ingestion.batch_size", 50),
        force_refresh: force,
    };

    println!("ingest");
    match pipeline.run().await? {
        RunOutcome::Skipped { existing } => {
            println!("  skipped: collection already holds {} points (use --force)", existing);
        }
        RunOutcome::Completed(report) => {
            println!("  files processed: {}", report.files_processed);
            println!("  files skipped:   {}", report.files_skipped);
            println!("  chunks loaded:   {}", report.chunks_loaded);
            println!("  batches flushed: {}", report.batches_flushed);
            if report.flush_failures > 0 {
                println!("  flush failures:  {}", report.flush_failures);
            }
        }
    }
    println!("ok");
    Ok(())
}

async fn run_search(settings: &Settings, query: &str, limit: usize) -> Result<()> {
    let embedder = OpenAiEmbedder::new(EmbeddingConfig::from_settings(settings)?)?;
    let store = QdrantStore::connect(StoreConfig::from_settings(settings)?).await?;

    let hits = search_store(&embedder, &store, query, limit).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        let source = hit
            .metadata
            .get("source")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown");
        println!("{}. [{:.4}] {}", i + 1, hit.score, source);
        println!("   {}", hit.text.replace('\n', " "));
    }
    Ok(())
}

async fn run_status(settings: &Settings) -> Result<()> {
    let config = StoreConfig::from_settings(settings)?;
    let collection = config.collection_name.clone();
    let store = QdrantStore::connect(config).await?;
    let count = store.count().await?;
    println!("collection: {}", collection);
    println!("points:     {}", count);
    Ok(())
}
